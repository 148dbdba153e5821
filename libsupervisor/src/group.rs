//! Priority-ordered start and stop of a bag of controllers.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{info, warn};

use crate::child::ChildController;

pub struct ProcessGroup {
    name: String,
    priority: i32,
    /// Declaration order; it breaks priority ties.
    members: Vec<Arc<ChildController>>,
}

impl ProcessGroup {
    pub fn new(name: String, priority: i32, members: Vec<Arc<ChildController>>) -> ProcessGroup {
        ProcessGroup {
            name,
            priority,
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Member names in start order: ascending (priority, declaration index).
    pub fn start_order(&self) -> Vec<String> {
        self.buckets()
            .into_iter()
            .flatten()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Member names in stop order: exact reverse of `start_order`.
    pub fn stop_order(&self) -> Vec<String> {
        let mut order = self.start_order();
        order.reverse();
        order
    }

    /// Start members in ascending priority. Members sharing a priority
    /// start concurrently; buckets run sequentially. A member failure is
    /// logged and skipped unless the member is `required`, which aborts
    /// the rest of the group start.
    pub async fn start_all(&self, autostart_only: bool) -> Result<()> {
        for bucket in self.buckets() {
            let targets: Vec<_> = bucket
                .into_iter()
                .filter(|c| !autostart_only || c.spec().autostart)
                .collect();
            let results = join_all(targets.iter().map(|c| c.start())).await;
            for (controller, result) in targets.iter().zip(results) {
                if let Err(e) = result {
                    if controller.spec().required {
                        return Err(e).with_context(|| {
                            format!(
                                "required member {} of group {} failed to start",
                                controller.name(),
                                self.name
                            )
                        });
                    }
                    warn!(
                        group = %self.name,
                        child = %controller.name(),
                        error = %e,
                        "group member failed to start, continuing"
                    );
                }
            }
        }
        Ok(())
    }

    /// Stop members in descending priority, the exact reverse of
    /// `start_all`. Individual failures are logged, never propagated.
    pub async fn stop_all(&self) {
        let mut buckets = self.buckets();
        buckets.reverse();
        for bucket in buckets {
            let results = join_all(bucket.iter().map(|c| c.stop())).await;
            for (controller, result) in bucket.iter().zip(results) {
                match result {
                    Ok(()) => info!(group = %self.name, child = %controller.name(), "stopped"),
                    // usually "not running", which is fine during shutdown
                    Err(e) => {
                        tracing::debug!(
                            group = %self.name,
                            child = %controller.name(),
                            reason = %e,
                            "stop skipped"
                        );
                    }
                }
            }
        }
    }

    /// Members bucketed by priority, ascending; ties keep declaration order.
    fn buckets(&self) -> Vec<Vec<Arc<ChildController>>> {
        let mut indexed: Vec<(i32, usize, Arc<ChildController>)> = self
            .members
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.spec().priority, idx, c.clone()))
            .collect();
        indexed.sort_by_key(|(priority, idx, _)| (*priority, *idx));

        let mut buckets: Vec<Vec<Arc<ChildController>>> = Vec::new();
        let mut current_priority = None;
        for (priority, _, controller) in indexed {
            if current_priority != Some(priority) {
                buckets.push(Vec::new());
                current_priority = Some(priority);
            }
            buckets
                .last_mut()
                .expect("bucket pushed above")
                .push(controller);
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessSpec;
    use std::sync::Arc as StdArc;

    fn controller(name: &str, priority: i32) -> StdArc<ChildController> {
        let mut spec = ProcessSpec::new(name, vec!["true".into()]);
        spec.priority = priority;
        ChildController::new(StdArc::new(spec), name.to_string())
    }

    #[test]
    fn start_order_sorts_by_priority_then_declaration() {
        let group = ProcessGroup::new("g".into(), 1, vec![
            controller("late", 50),
            controller("first", 1),
            controller("tied-a", 10),
            controller("tied-b", 10),
        ]);
        assert_eq!(group.start_order(), vec!["first", "tied-a", "tied-b", "late"]);
        assert_eq!(group.stop_order(), vec!["late", "tied-b", "tied-a", "first"]);
    }
}

//! The live process table: one controller per spec entry, bagged into
//! priority-ordered groups. Built once from the config and shared by
//! handle; there are no ambient singletons.

use std::collections::HashMap;
use std::sync::Arc;

use common::ProcessSnapshot;
use tracing::info;

use crate::child::ChildController;
use crate::config::Config;
use crate::error::ControlError;
use crate::group::ProcessGroup;

pub struct Registry {
    children: HashMap<String, Arc<ChildController>>,
    /// Program declaration order, for stable status output.
    order: Vec<String>,
    /// Sorted by (group priority, declaration order). Programs not named
    /// by any [group:*] section live in implicit single-member groups.
    groups: Vec<ProcessGroup>,
}

impl Registry {
    pub fn from_config(config: &Config) -> Registry {
        let mut children = HashMap::new();
        let mut order = Vec::new();
        for spec in &config.programs {
            let group = config
                .group_of(&spec.name)
                .unwrap_or(&spec.name)
                .to_string();
            let controller = ChildController::new(spec.clone(), group);
            order.push(spec.name.clone());
            children.insert(spec.name.clone(), controller);
        }

        let mut groups: Vec<ProcessGroup> = Vec::new();
        for group in &config.groups {
            let members = group
                .members
                .iter()
                .map(|name| children[name].clone())
                .collect();
            groups.push(ProcessGroup::new(group.name.clone(), group.priority, members));
        }
        for spec in &config.programs {
            if config.group_of(&spec.name).is_some() {
                continue;
            }
            let controller = children[&spec.name].clone();
            groups.push(ProcessGroup::new(
                spec.name.clone(),
                spec.priority,
                vec![controller],
            ));
        }
        // stable sort: declaration order breaks priority ties
        groups.sort_by_key(|g| g.priority());

        Registry {
            children,
            order,
            groups,
        }
    }

    pub fn child(&self, name: &str) -> Result<&Arc<ChildController>, ControlError> {
        self.children
            .get(name)
            .ok_or_else(|| ControlError::UnknownProcess(name.to_string()))
    }

    pub async fn snapshot(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<ProcessSnapshot>, ControlError> {
        match name {
            Some(name) => Ok(vec![self.child(name)?.snapshot().await]),
            None => {
                let mut snapshots = Vec::with_capacity(self.order.len());
                for name in &self.order {
                    snapshots.push(self.children[name].snapshot().await);
                }
                Ok(snapshots)
            }
        }
    }

    /// Start groups in ascending priority; within a group the members'
    /// own priorities apply. Used at boot with `autostart_only`.
    pub async fn start_all(&self, autostart_only: bool) {
        for group in &self.groups {
            info!(group = %group.name(), "starting group");
            if let Err(e) = group.start_all(autostart_only).await {
                tracing::error!(group = %group.name(), error = %e, "group start aborted");
            }
        }
    }

    /// Stop every group in reverse priority order.
    pub async fn stop_all(&self) {
        for group in self.groups.iter().rev() {
            info!(group = %group.name(), "stopping group");
            group.stop_all().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_order_by_priority_then_declaration() {
        let config = Config::parse(
            "\
[program:late]
command=x
priority=50

[program:solo]
command=x
priority=7

[program:gateway]
command=x

[group:web]
programs=gateway
priority=7
",
        )
        .unwrap();
        let registry = Registry::from_config(&config);
        let names: Vec<&str> = registry.groups.iter().map(|g| g.name()).collect();
        // explicit groups come first among equal priorities
        assert_eq!(names, vec!["web", "solo", "late"]);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one supervised child.
///
/// Transitions are driven by the controller in libsupervisor:
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`, with
/// `Running -> Exited` on an unexpected termination and
/// `Exited -> Starting` when the restart policy allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Exited,
}

impl ProcessState {
    /// True while the child has a live OS process behind it.
    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessState::Stopped => "STOPPED",
            ProcessState::Starting => "STARTING",
            ProcessState::Running => "RUNNING",
            ProcessState::Stopping => "STOPPING",
            ProcessState::Exited => "EXITED",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of one child, as returned by the status operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub name: String,
    pub group: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// Restarts performed, automatic or explicit, for the supervisor's
    /// lifetime. Spawn retries within one start do not count.
    pub restarts: u32,
}

impl ProcessSnapshot {
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.state.is_alive() {
            return None;
        }
        self.started_at.map(|t| (now - t).num_seconds().max(0))
    }
}

/// Request sent by rsupctl over the control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlRequest {
    /// Snapshot of one child, or of every child when `name` is None.
    Status { name: Option<String> },
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    /// Stop every child in reverse priority order and exit the daemon.
    Shutdown,
}

/// Response to a single control request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlResponse {
    Status(Vec<ProcessSnapshot>),
    Ok { detail: String },
    Err { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn state_display_matches_status_words() {
        assert_eq!(ProcessState::Running.to_string(), "RUNNING");
        assert_eq!(ProcessState::Exited.to_string(), "EXITED");
    }

    #[test]
    fn uptime_only_reported_while_alive() {
        let now = Utc::now();
        let mut snap = ProcessSnapshot {
            name: "web".into(),
            group: "web".into(),
            state: ProcessState::Running,
            pid: Some(42),
            started_at: Some(now - Duration::seconds(30)),
            exit_code: None,
            restarts: 0,
        };
        assert_eq!(snap.uptime_secs(now), Some(30));
        snap.state = ProcessState::Exited;
        assert_eq!(snap.uptime_secs(now), None);
    }
}

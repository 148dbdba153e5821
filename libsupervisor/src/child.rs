//! Per-child process controller.
//!
//! Each controller owns the full lifecycle of one spec table entry:
//! `stopped -> starting -> running -> stopping -> stopped`, with
//! `running -> exited` on unexpected termination and `exited -> starting`
//! when the restart policy allows it. Control operations serialize on a
//! per-child operation lock; state reads never take it.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use common::{ProcessSnapshot, ProcessState};

use crate::config::{ProcessSpec, RestartPolicy, SinkSpec};
use crate::sink::StreamRouter;

/// Runtime record per spec entry. Exactly one exists for the supervisor's
/// lifetime; fields are replaced on restart, the record never is.
#[derive(Debug)]
struct ChildState {
    lifecycle: ProcessState,
    pid: Option<u32>,
    started_at: Option<chrono::DateTime<Utc>>,
    exit_code: Option<i32>,
    /// Restarts performed, automatic or explicit, monotonic for the
    /// supervisor's lifetime. Spawn retries within one start do not count.
    restarts: u32,
    /// Automatic restarts consumed since the last explicit start.
    budget_used: u32,
    /// Spawn counter; monitor tasks from superseded spawns bail on mismatch.
    generation: u64,
    stop_requested: bool,
}

pub struct ChildController {
    spec: Arc<ProcessSpec>,
    group: String,
    state: Mutex<ChildState>,
    /// Serializes start/stop/restart against each other and against the
    /// autorestart path. Snapshots bypass it.
    op: Mutex<()>,
    transitions: watch::Sender<ProcessState>,
}

impl ChildController {
    pub fn new(spec: Arc<ProcessSpec>, group: String) -> Arc<ChildController> {
        let (transitions, _) = watch::channel(ProcessState::Stopped);
        Arc::new(ChildController {
            spec,
            group,
            state: Mutex::new(ChildState {
                lifecycle: ProcessState::Stopped,
                pid: None,
                started_at: None,
                exit_code: None,
                restarts: 0,
                budget_used: 0,
                generation: 0,
                stop_requested: false,
            }),
            op: Mutex::new(()),
            transitions,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub async fn snapshot(&self) -> ProcessSnapshot {
        let st = self.state.lock().await;
        ProcessSnapshot {
            name: self.spec.name.clone(),
            group: self.group.clone(),
            state: st.lifecycle,
            pid: st.pid,
            started_at: st.started_at,
            exit_code: st.exit_code,
            restarts: st.restarts,
        }
    }

    /// Explicit start. Valid from `stopped` and `exited`; resets the
    /// restart budget, then runs the bounded spawn-attempt loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.launch(false).await
    }

    /// Stop with the configured signal; escalate to SIGKILL exactly once
    /// if the child outlives the stop timeout. Signals are delivered under
    /// the state lock so a pid the monitor already reaped is never hit.
    pub async fn stop(&self) -> Result<()> {
        let _op = self.op.lock().await;
        {
            let mut st = self.state.lock().await;
            if !matches!(
                st.lifecycle,
                ProcessState::Starting | ProcessState::Running
            ) {
                bail!("{} is not running", self.spec.name);
            }
            st.stop_requested = true;
            self.transition(&mut st, ProcessState::Stopping);
            if let Some(pid) = st.pid {
                if let Err(e) = kill(Pid::from_raw(pid as i32), self.spec.stop_signal) {
                    debug!(child = %self.spec.name, pid, error = %e, "signal delivery failed");
                }
            }
        }

        let stopped = |s: ProcessState| s == ProcessState::Stopped;
        if self
            .wait_for_state(self.spec.stop_timeout, stopped)
            .await
            .is_err()
        {
            warn!(
                child = %self.spec.name,
                timeout = ?self.spec.stop_timeout,
                "did not exit in time, sending SIGKILL"
            );
            {
                let st = self.state.lock().await;
                if let Some(pid) = st.pid {
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
            }
            self.wait_for_state(Duration::from_secs(5), stopped)
                .await
                .with_context(|| format!("{} survived SIGKILL", self.spec.name))?;
        }

        self.state.lock().await.stop_requested = false;
        Ok(())
    }

    pub async fn restart(self: &Arc<Self>) -> Result<()> {
        if self.snapshot().await.state.is_alive() {
            self.stop().await?;
        }
        self.launch(true).await
    }

    async fn launch(self: &Arc<Self>, count_restart: bool) -> Result<()> {
        let _op = self.op.lock().await;
        {
            let mut st = self.state.lock().await;
            if st.lifecycle.is_alive() {
                bail!("{} is already {}", self.spec.name, st.lifecycle);
            }
            st.budget_used = 0;
        }
        self.start_attempts(count_restart).await
    }

    /// Wait until the lifecycle satisfies `pred`, or time out.
    pub async fn wait_for_state(
        &self,
        timeout: Duration,
        pred: impl Fn(ProcessState) -> bool,
    ) -> Result<ProcessState> {
        let mut rx = self.transitions.subscribe();
        let wait = async {
            loop {
                let current = *rx.borrow_and_update();
                if pred(current) {
                    return current;
                }
                if rx.changed().await.is_err() {
                    return current;
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting on {}", self.spec.name))
    }

    /// Spawn-attempt loop, bounded by `startretries`. Caller must hold the
    /// operation lock. With `count_restart` the first successful spawn
    /// bumps the restart counter once.
    async fn start_attempts(self: &Arc<Self>, count_restart: bool) -> Result<()> {
        let spec = &self.spec;
        let retries = spec.start_retries.max(1);
        let mut attempt = 0u32;
        let mut counted = false;
        loop {
            attempt += 1;
            let mut child = match self.spawn_once() {
                Ok(child) => child,
                Err(e) => {
                    warn!(
                        child = %spec.name,
                        attempt,
                        error = %e,
                        "spawn failed"
                    );
                    if attempt >= retries {
                        let mut st = self.state.lock().await;
                        self.transition(&mut st, ProcessState::Stopped);
                        return Err(e).with_context(|| {
                            format!("failed to spawn {} after {attempt} attempts", spec.name)
                        });
                    }
                    sleep(spec.backoff).await;
                    continue;
                }
            };

            let pid = child.id();
            {
                let mut st = self.state.lock().await;
                if count_restart && !counted {
                    st.restarts += 1;
                    counted = true;
                }
                st.generation += 1;
                st.pid = pid;
                st.started_at = Some(Utc::now());
                st.exit_code = None;
                self.transition(&mut st, ProcessState::Starting);
            }

            // liveness threshold: surviving it confirms the start
            let early_exit = if spec.start_secs.is_zero() {
                None
            } else {
                tokio::select! {
                    status = child.wait() => Some(status),
                    _ = sleep(spec.start_secs) => None,
                }
            };

            match early_exit {
                None => {
                    let generation = {
                        let mut st = self.state.lock().await;
                        self.transition(&mut st, ProcessState::Running);
                        st.generation
                    };
                    let this = self.clone();
                    tokio::spawn(this.monitor(child, generation));
                    return Ok(());
                }
                Some(status) => {
                    let code = status.as_ref().ok().and_then(|s| s.code());
                    let mut st = self.state.lock().await;
                    st.pid = None;
                    st.exit_code = code;
                    warn!(
                        child = %spec.name,
                        attempt,
                        code,
                        "exited before reaching the start threshold"
                    );
                    if attempt >= retries {
                        self.transition(&mut st, ProcessState::Stopped);
                        bail!(
                            "{} exited {attempt} times before the start threshold, giving up",
                            spec.name
                        );
                    }
                    drop(st);
                    sleep(spec.backoff).await;
                }
            }
        }
    }

    fn spawn_once(&self) -> std::io::Result<Child> {
        let spec = &self.spec;
        let mut cmd = Command::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..]);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(stdio_for(&spec.stdout));
        let stderr_sink = if spec.redirect_stderr {
            &spec.stdout
        } else {
            &spec.stderr
        };
        cmd.stderr(stdio_for(stderr_sink));

        let mut child = cmd.spawn()?;

        if let Some(out) = child.stdout.take() {
            let mut router =
                StreamRouter::new(&spec.name, "stdout", &spec.stdout, spec.overflow);
            router.attach(out);
            if spec.redirect_stderr {
                if let Some(err) = child.stderr.take() {
                    router.attach(err);
                }
            }
            tokio::spawn(router.join());
        }
        if let Some(err) = child.stderr.take() {
            let mut router = StreamRouter::new(&spec.name, "stderr", stderr_sink, spec.overflow);
            router.attach(err);
            tokio::spawn(router.join());
        }
        Ok(child)
    }

    /// Runs after a confirmed start; observes the exit and applies the
    /// restart policy.
    // boxed so the monitor/start_attempts future cycle has a concrete
    // `Send` type
    fn monitor(
        self: Arc<Self>,
        mut child: Child,
        generation: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
        let status = child.wait().await;
        let code = status.as_ref().ok().and_then(|s| s.code());

        let mut st = self.state.lock().await;
        if st.generation != generation {
            // a newer spawn owns the record now
            return;
        }
        st.pid = None;
        st.exit_code = code;

        if st.lifecycle == ProcessState::Stopping || st.stop_requested {
            self.transition(&mut st, ProcessState::Stopped);
            info!(child = %self.spec.name, code, "stopped");
            return;
        }

        self.transition(&mut st, ProcessState::Exited);
        warn!(child = %self.spec.name, code, "exited unexpectedly");

        let restart = match self.spec.autorestart {
            RestartPolicy::Never => false,
            RestartPolicy::Always => true,
            RestartPolicy::OnUnexpectedExit => match code {
                Some(code) => !self.spec.exit_codes.contains(&code),
                // killed by a signal: always unexpected
                None => true,
            },
        };
        if !restart {
            return;
        }

        if st.budget_used >= self.spec.max_restarts {
            error!(
                child = %self.spec.name,
                budget = self.spec.max_restarts,
                "restart budget exhausted, holding in stopped"
            );
            self.transition(&mut st, ProcessState::Stopped);
            return;
        }
        st.budget_used += 1;
        let delay = backoff_delay(&self.spec, st.budget_used);
        drop(st);

        info!(child = %self.spec.name, ?delay, "restarting after backoff");
        sleep(delay).await;

        let _op = self.op.lock().await;
        {
            let st = self.state.lock().await;
            // a control operation got here first
            if st.lifecycle != ProcessState::Exited || st.stop_requested {
                return;
            }
        }
        if let Err(e) = self.start_attempts(true).await {
            error!(child = %self.spec.name, error = %e, "automatic restart failed");
        }
        })
    }

    fn transition(&self, st: &mut ChildState, to: ProcessState) {
        let from = st.lifecycle;
        st.lifecycle = to;
        self.transitions.send_replace(to);
        info!(child = %self.spec.name, pid = st.pid, %from, %to, "state change");
    }
}

fn stdio_for(sink: &SinkSpec) -> Stdio {
    match sink {
        SinkSpec::Discard => Stdio::null(),
        _ => Stdio::piped(),
    }
}

/// Doubling backoff from the configured base, capped.
fn backoff_delay(spec: &ProcessSpec, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    spec.backoff
        .saturating_mul(1u32 << exp)
        .min(spec.max_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_backoff(base_ms: u64, cap_ms: u64) -> ProcessSpec {
        let mut spec = ProcessSpec::new("t", vec!["true".into()]);
        spec.backoff = Duration::from_millis(base_ms);
        spec.max_backoff = Duration::from_millis(cap_ms);
        spec
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let spec = spec_with_backoff(100, 450);
        assert_eq!(backoff_delay(&spec, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&spec, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&spec, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&spec, 4), Duration::from_millis(450));
        assert_eq!(backoff_delay(&spec, 30), Duration::from_millis(450));
    }
}

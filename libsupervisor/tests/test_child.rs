//! Lifecycle tests against real child processes. Everything here runs
//! /bin/sh with short-lived scripts, so the tests stay in the tens of
//! milliseconds range.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::ProcessState;
use libsupervisor::child::ChildController;
use libsupervisor::config::{ProcessSpec, RestartPolicy, SinkSpec};

fn sh(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

fn quick_spec(name: &str, script: &str) -> ProcessSpec {
    let mut spec = ProcessSpec::new(name, sh(script));
    spec.start_secs = Duration::ZERO;
    spec.backoff = Duration::from_millis(20);
    spec.max_backoff = Duration::from_millis(100);
    spec
}

fn controller(spec: ProcessSpec) -> Arc<ChildController> {
    let group = spec.name.clone();
    ChildController::new(Arc::new(spec), group)
}

async fn wait_for(
    controller: &Arc<ChildController>,
    state: ProcessState,
    timeout: Duration,
) -> ProcessState {
    controller
        .wait_for_state(timeout, |s| s == state)
        .await
        .unwrap_or_else(|e| panic!("{e}"))
}

#[tokio::test]
async fn start_reaches_running_and_stop_is_clean() {
    let c = controller(quick_spec("sleeper", "sleep 30"));
    c.start().await.unwrap();

    let snap = c.snapshot().await;
    assert_eq!(snap.state, ProcessState::Running);
    assert!(snap.pid.is_some());
    assert!(snap.started_at.is_some());

    c.stop().await.unwrap();
    let snap = c.snapshot().await;
    assert_eq!(snap.state, ProcessState::Stopped);
    assert!(snap.pid.is_none());
    assert_eq!(snap.restarts, 0);
}

#[tokio::test]
async fn starting_twice_reports_the_current_state() {
    let c = controller(quick_spec("dupe", "sleep 30"));
    c.start().await.unwrap();
    let err = c.start().await.unwrap_err();
    assert!(err.to_string().contains("already"));
    c.stop().await.unwrap();
}

#[tokio::test]
async fn early_exit_consumes_start_retries_then_parks_stopped() {
    let mut spec = quick_spec("flappy", "exit 7");
    spec.start_secs = Duration::from_millis(300);
    spec.start_retries = 2;
    let c = controller(spec);

    let err = c.start().await.unwrap_err();
    assert!(err.to_string().contains("giving up"), "{err}");

    let snap = c.snapshot().await;
    assert_eq!(snap.state, ProcessState::Stopped);
    assert_eq!(snap.exit_code, Some(7));

    // no further attempts happen on their own
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(c.snapshot().await.state, ProcessState::Stopped);
}

#[tokio::test]
async fn spawn_retries_within_one_start_do_not_count_as_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("warmed-up");
    // first attempt exits early, the retry sticks around
    let script = format!(
        "if [ -e {m} ]; then sleep 30; else touch {m}; exit 1; fi",
        m = marker.display()
    );
    let mut spec = quick_spec("warmup", &script);
    spec.start_secs = Duration::from_millis(200);
    spec.start_retries = 3;
    let c = controller(spec);

    c.start().await.unwrap();
    let snap = c.snapshot().await;
    assert_eq!(snap.state, ProcessState::Running);
    assert_eq!(snap.restarts, 0);
    c.stop().await.unwrap();
}

#[tokio::test]
async fn unspawnable_command_fails_without_crashing_siblings() {
    let mut spec = quick_spec("ghost", "");
    spec.argv = vec!["/nonexistent/rsup-test-binary".to_string()];
    spec.start_retries = 2;
    let c = controller(spec);

    let sibling = controller(quick_spec("sibling", "sleep 30"));
    sibling.start().await.unwrap();

    assert!(c.start().await.is_err());
    assert_eq!(c.snapshot().await.state, ProcessState::Stopped);
    assert_eq!(sibling.snapshot().await.state, ProcessState::Running);
    sibling.stop().await.unwrap();
}

#[tokio::test]
async fn expected_exit_surfaces_code_without_restart() {
    let mut spec = quick_spec("oneshot", "exit 0");
    spec.autorestart = RestartPolicy::OnUnexpectedExit;
    spec.exit_codes = vec![0];
    let c = controller(spec);

    c.start().await.unwrap();
    wait_for(&c, ProcessState::Exited, Duration::from_secs(5)).await;

    let snap = c.snapshot().await;
    assert_eq!(snap.exit_code, Some(0));
    assert_eq!(snap.restarts, 0);
}

#[tokio::test]
async fn unexpected_exit_restarts_within_backoff_and_counts() {
    let mut spec = quick_spec("crasher", "sleep 0.1; exit 1");
    spec.autorestart = RestartPolicy::OnUnexpectedExit;
    spec.exit_codes = vec![0];
    spec.max_restarts = 1;
    let c = controller(spec);

    c.start().await.unwrap();
    // first crash consumes the single budget slot and respawns; the second
    // crash exhausts it and the child parks in stopped
    wait_for(&c, ProcessState::Stopped, Duration::from_secs(10)).await;

    let snap = c.snapshot().await;
    assert_eq!(snap.restarts, 1);
    assert_eq!(snap.exit_code, Some(1));
}

#[tokio::test]
async fn exhausted_budget_recovers_with_an_explicit_start() {
    let mut spec = quick_spec("lazarus", "sleep 0.05; exit 1");
    spec.autorestart = RestartPolicy::Always;
    spec.max_restarts = 0;
    let c = controller(spec);

    c.start().await.unwrap();
    wait_for(&c, ProcessState::Stopped, Duration::from_secs(5)).await;
    assert_eq!(c.snapshot().await.restarts, 0);

    // explicit start resets the budget and spawns again
    c.start().await.unwrap();
    assert!(c.snapshot().await.state.is_alive());
    wait_for(&c, ProcessState::Stopped, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn never_policy_leaves_the_exit_visible() {
    let mut spec = quick_spec("fatalist", "exit 3");
    spec.autorestart = RestartPolicy::Never;
    let c = controller(spec);

    c.start().await.unwrap();
    wait_for(&c, ProcessState::Exited, Duration::from_secs(5)).await;

    let snap = c.snapshot().await;
    assert_eq!(snap.exit_code, Some(3));
    assert_eq!(snap.restarts, 0);
}

#[tokio::test]
async fn stubborn_child_is_force_killed_once() {
    let mut spec = quick_spec("stubborn", r#"trap "" TERM; sleep 30"#);
    spec.stop_timeout = Duration::from_millis(300);
    let c = controller(spec);

    c.start().await.unwrap();
    // give the shell a moment to install the trap
    tokio::time::sleep(Duration::from_millis(150)).await;

    let begin = Instant::now();
    c.stop().await.unwrap();
    assert!(begin.elapsed() < Duration::from_secs(5));
    assert_eq!(c.snapshot().await.state, ProcessState::Stopped);
}

#[tokio::test]
async fn stop_overlapping_a_natural_exit_still_lands_dead() {
    let mut spec = quick_spec("ephemeral", "sleep 0.15");
    spec.autorestart = RestartPolicy::Never;
    let c = controller(spec);

    c.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    // the child may exit while the stop is in flight; whoever wins, no
    // signal goes to a pid the monitor already reaped
    let _ = c.stop().await;

    let snap = c.snapshot().await;
    assert!(!snap.state.is_alive(), "got {}", snap.state);
    assert!(snap.pid.is_none());
}

#[tokio::test]
async fn restart_respawns_with_a_new_pid() {
    let c = controller(quick_spec("phoenix", "sleep 30"));
    c.start().await.unwrap();
    let first_pid = c.snapshot().await.pid.unwrap();

    c.restart().await.unwrap();
    let snap = c.snapshot().await;
    assert_eq!(snap.state, ProcessState::Running);
    assert_ne!(snap.pid.unwrap(), first_pid);
    assert_eq!(snap.restarts, 1);
    c.stop().await.unwrap();
}

#[tokio::test]
async fn redirect_stderr_merges_both_streams_into_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("merged.log");
    let mut spec = quick_spec("chatty", "echo out; echo err 1>&2");
    spec.autorestart = RestartPolicy::Never;
    spec.stdout = SinkSpec::File {
        path: path.clone(),
        max_bytes: 0,
        backups: 0,
    };
    spec.redirect_stderr = true;
    let c = controller(spec);

    c.start().await.unwrap();
    wait_for(&c, ProcessState::Exited, Duration::from_secs(5)).await;

    // the router flushes shortly after the pipes hit EOF
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let text = std::fs::read_to_string(&path).unwrap_or_default();
        if text.contains("out") && text.contains("err") {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "merged log never filled, got {text:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn slow_stop_on_one_child_does_not_block_another() {
    let mut stubborn = quick_spec("blocker", r#"trap "" TERM; sleep 30"#);
    stubborn.stop_timeout = Duration::from_millis(500);
    let a = controller(stubborn);
    let b = controller(quick_spec("bystander", "sleep 30"));

    a.start().await.unwrap();
    b.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let slow = tokio::spawn({
        let a = a.clone();
        async move { a.stop().await }
    });

    // while the slow stop is in its timeout window, the sibling answers
    let begin = Instant::now();
    let snap = b.snapshot().await;
    assert_eq!(snap.state, ProcessState::Running);
    b.stop().await.unwrap();
    assert!(begin.elapsed() < Duration::from_millis(400));

    slow.await.unwrap().unwrap();
    assert_eq!(a.snapshot().await.state, ProcessState::Stopped);
}

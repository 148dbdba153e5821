//! Group ordering and soft-failure semantics with real children.

use std::sync::Arc;
use std::time::Duration;

use common::ProcessState;
use libsupervisor::child::ChildController;
use libsupervisor::config::ProcessSpec;
use libsupervisor::group::ProcessGroup;

fn sleeper(name: &str, priority: i32) -> Arc<ChildController> {
    let mut spec = ProcessSpec::new(name, vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        "sleep 30".to_string(),
    ]);
    spec.start_secs = Duration::ZERO;
    spec.priority = priority;
    ChildController::new(Arc::new(spec), "g".to_string())
}

fn broken(name: &str, priority: i32, required: bool) -> Arc<ChildController> {
    let mut spec = ProcessSpec::new(name, vec!["/nonexistent/rsup-group-test".to_string()]);
    spec.start_secs = Duration::ZERO;
    spec.priority = priority;
    spec.required = required;
    spec.start_retries = 1;
    spec.backoff = Duration::from_millis(10);
    ChildController::new(Arc::new(spec), "g".to_string())
}

#[tokio::test]
async fn start_ascending_stop_descending() {
    let a = sleeper("a", 1);
    let b = sleeper("b", 5);
    let group = ProcessGroup::new("g".into(), 1, vec![b.clone(), a.clone()]);

    assert_eq!(group.start_order(), vec!["a", "b"]);
    assert_eq!(group.stop_order(), vec!["b", "a"]);

    group.start_all(false).await.unwrap();
    let started_a = a.snapshot().await.started_at.unwrap();
    let started_b = b.snapshot().await.started_at.unwrap();
    assert!(started_a < started_b, "a must start before b");

    group.stop_all().await;
    assert_eq!(a.snapshot().await.state, ProcessState::Stopped);
    assert_eq!(b.snapshot().await.state, ProcessState::Stopped);
}

#[tokio::test]
async fn optional_member_failure_does_not_stop_the_group() {
    let bad = broken("bad", 1, false);
    let good = sleeper("good", 2);
    let group = ProcessGroup::new("g".into(), 1, vec![bad.clone(), good.clone()]);

    group.start_all(false).await.unwrap();
    assert_eq!(bad.snapshot().await.state, ProcessState::Stopped);
    assert_eq!(good.snapshot().await.state, ProcessState::Running);

    group.stop_all().await;
}

#[tokio::test]
async fn required_member_failure_aborts_the_rest() {
    let bad = broken("bad", 1, true);
    let late = sleeper("late", 2);
    let group = ProcessGroup::new("g".into(), 1, vec![bad.clone(), late.clone()]);

    assert!(group.start_all(false).await.is_err());
    assert_eq!(late.snapshot().await.state, ProcessState::Stopped);
}

#[tokio::test]
async fn autostart_only_skips_manual_members() {
    let auto = sleeper("auto", 1);
    let mut manual_spec = ProcessSpec::new("manual", vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        "sleep 30".to_string(),
    ]);
    manual_spec.start_secs = Duration::ZERO;
    manual_spec.priority = 2;
    manual_spec.autostart = false;
    let manual = ChildController::new(Arc::new(manual_spec), "g".to_string());

    let group = ProcessGroup::new("g".into(), 1, vec![auto.clone(), manual.clone()]);
    group.start_all(true).await.unwrap();

    assert_eq!(auto.snapshot().await.state, ProcessState::Running);
    assert_eq!(manual.snapshot().await.state, ProcessState::Stopped);
    group.stop_all().await;
}

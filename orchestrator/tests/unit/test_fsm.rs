//! FSM unit tests

use std::time::Duration;

use kindops::tasks::{TaskEvent, TaskFsm, TaskState};

fn deploying() -> TaskFsm {
    let mut fsm = TaskFsm::new();
    fsm.process(TaskEvent::Start).unwrap();
    fsm.process(TaskEvent::Validated).unwrap();
    fsm.process(TaskEvent::Rendered).unwrap();
    fsm
}

#[test]
fn test_fsm_initial_state() {
    let fsm = TaskFsm::new();
    assert_eq!(fsm.state(), TaskState::Pending);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.retry_count(), 0);
    assert_eq!(fsm.progress(), 0);
}

#[test]
fn test_fsm_success_flow() {
    let mut fsm = TaskFsm::new();

    // Pending -> Validating
    fsm.process(TaskEvent::Start).unwrap();
    assert_eq!(fsm.state(), TaskState::Validating);
    assert_eq!(fsm.progress(), 10);

    // Validating -> Rendering
    fsm.process(TaskEvent::Validated).unwrap();
    assert_eq!(fsm.state(), TaskState::Rendering);
    assert_eq!(fsm.progress(), 25);

    // Rendering -> Deploying
    fsm.process(TaskEvent::Rendered).unwrap();
    assert_eq!(fsm.state(), TaskState::Deploying);

    // Deploying -> Verifying -> Completed
    fsm.process(TaskEvent::Deployed).unwrap();
    assert_eq!(fsm.state(), TaskState::Verifying);
    assert_eq!(fsm.progress(), 90);
    fsm.process(TaskEvent::Confirmed).unwrap();
    assert_eq!(fsm.state(), TaskState::Completed);
    assert_eq!(fsm.progress(), 100);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_failures_from_each_stage() {
    let mut fsm = TaskFsm::new();
    fsm.process(TaskEvent::Start).unwrap();
    fsm.process(TaskEvent::ValidationFailed("bad values".into())).unwrap();
    assert_eq!(fsm.state(), TaskState::Failed);
    assert_eq!(fsm.error(), Some("bad values"));

    let mut fsm = TaskFsm::new();
    fsm.process(TaskEvent::Start).unwrap();
    fsm.process(TaskEvent::Validated).unwrap();
    fsm.process(TaskEvent::RenderFailed("undefined".into())).unwrap();
    assert_eq!(fsm.state(), TaskState::Failed);

    let mut fsm = deploying();
    fsm.process(TaskEvent::DeployFailed("forbidden".into())).unwrap();
    assert_eq!(fsm.state(), TaskState::Failed);
    assert_eq!(fsm.error(), Some("forbidden"));
}

#[test]
fn test_fsm_deploy_ticks_advance_progress() {
    let mut fsm = deploying();
    assert_eq!(fsm.progress(), 30);

    let budget = Duration::from_secs(100);
    fsm.process(TaskEvent::DeployTick {
        elapsed: Duration::from_secs(50),
        budget,
    })
    .unwrap();
    assert_eq!(fsm.state(), TaskState::Deploying);
    assert!(fsm.progress() > 30 && fsm.progress() < 89);

    fsm.process(TaskEvent::DeployTick {
        elapsed: Duration::from_secs(500),
        budget,
    })
    .unwrap();
    assert_eq!(fsm.progress(), 89);
}

#[test]
fn test_fsm_ambiguous_deploy_verifies() {
    let mut fsm = deploying();
    fsm.process(TaskEvent::DeployAmbiguous("timed out".into())).unwrap();
    assert_eq!(fsm.state(), TaskState::Verifying);
    assert!(fsm.deploy_timed_out());

    for expected in 1..=3 {
        fsm.process(TaskEvent::Unconfirmed).unwrap();
        assert_eq!(fsm.state(), TaskState::Verifying);
        assert_eq!(fsm.retry_count(), expected);
    }
    assert_eq!(fsm.progress(), 93);

    fsm.process(TaskEvent::VerifyExhausted("never live".into())).unwrap();
    assert_eq!(fsm.state(), TaskState::Failed);
}

#[test]
fn test_fsm_verify_progress_caps_below_complete() {
    let mut fsm = deploying();
    fsm.process(TaskEvent::Deployed).unwrap();
    for _ in 0..50 {
        fsm.process(TaskEvent::Unconfirmed).unwrap();
    }
    assert_eq!(fsm.progress(), 99);
}

#[test]
fn test_fsm_cancel_from_any_live_state() {
    let mut fsm = TaskFsm::new();
    fsm.process(TaskEvent::Cancel).unwrap();
    assert_eq!(fsm.state(), TaskState::Cancelled);

    let mut fsm = deploying();
    fsm.process(TaskEvent::Deployed).unwrap();
    fsm.process(TaskEvent::Cancel).unwrap();
    assert_eq!(fsm.state(), TaskState::Cancelled);
    assert!(fsm.process(TaskEvent::Cancel).is_err());
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = TaskFsm::new();

    // Cannot render before validating
    assert!(fsm.process(TaskEvent::Rendered).is_err());
    assert_eq!(fsm.state(), TaskState::Pending);

    // No way back from a terminal state
    let mut fsm = deploying();
    fsm.process(TaskEvent::Deployed).unwrap();
    fsm.process(TaskEvent::Confirmed).unwrap();
    assert!(fsm.process(TaskEvent::Start).is_err());
    assert!(fsm.process(TaskEvent::Unconfirmed).is_err());
}

//! Tests for the long-running operation poller.

use ironlro::clock::{Clock, ManualClock};
use ironlro::poller::{OperationPoller, PollConfig, PollError, PollState};
use ironlro::rpc::{ErrorKind, OperationHandle, RpcError};
use std::time::Duration;

fn poller(config: PollConfig, clock: &ManualClock) -> OperationPoller {
    OperationPoller::new(config).with_clock(clock.clone().into_shared())
}

fn fixed(interval_ms: u64, timeout_ms: u64) -> PollConfig {
    PollConfig::fixed(Duration::from_millis(interval_ms), Duration::from_millis(timeout_ms))
}

#[test]
fn test_three_pending_then_done_takes_four_polls() {
    let clock = ManualClock::new();
    let mut polls = 0;
    let outcome = poller(fixed(100, 10_000), &clock)
        .wait(OperationHandle::pending("operations/op-1"), |h| {
            polls += 1;
            Ok::<_, RpcError>(if polls < 4 {
                OperationHandle::pending(h.name())
            } else {
                OperationHandle::succeeded(h.name(), "RUNNING")
            })
        })
        .unwrap();

    assert_eq!(polls, 4);
    assert_eq!(outcome.polls, 4);
    assert_eq!(outcome.value, "RUNNING");
    assert_eq!(outcome.operation, "operations/op-1");
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(100); 4]);
    assert_eq!(outcome.elapsed, Duration::from_millis(400));
}

#[test]
fn test_deadline_stops_polling() {
    let clock = ManualClock::new();
    let mut polls = 0;
    let err = poller(fixed(300, 1000), &clock)
        .wait(OperationHandle::<()>::pending("operations/slow"), |h| {
            polls += 1;
            Ok::<_, RpcError>(OperationHandle::pending(h.name()))
        })
        .unwrap_err();

    // Polls at 300, 600 and 900 ms; the fourth sleep is clipped to the deadline.
    assert_eq!(polls, 3);
    assert_eq!(err.polls(), 3);
    assert_eq!(err.state(), Some(PollState::TimedOut));
    assert_eq!(clock.elapsed(), Duration::from_millis(1000));
    assert_eq!(clock.sleeps().last(), Some(&Duration::from_millis(100)));
    match err {
        PollError::TimedOut { elapsed, deadline, .. } => {
            assert_eq!(elapsed, Duration::from_millis(1000));
            assert_eq!(deadline, Duration::from_millis(1000));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn test_deadline_already_passed_issues_no_poll() {
    let clock = ManualClock::new();
    let submitted_at = clock.now();
    clock.advance(Duration::from_secs(5));

    let mut polls = 0;
    let err = poller(fixed(100, 1000), &clock)
        .wait_since(OperationHandle::<()>::pending("operations/late"), submitted_at, |h| {
            polls += 1;
            Ok::<_, RpcError>(OperationHandle::pending(h.name()))
        })
        .unwrap_err();

    assert_eq!(polls, 0);
    assert!(matches!(err, PollError::TimedOut { polls: 0, .. }));
    assert!(clock.sleeps().is_empty());
}

#[test]
fn test_done_on_receipt_needs_no_poll() {
    let clock = ManualClock::new();
    let outcome = poller(fixed(100, 1000), &clock)
        .wait(OperationHandle::succeeded("operations/fast", 5), |_| {
            Err::<OperationHandle<i32>, _>("must not poll")
        })
        .unwrap();
    assert_eq!(outcome.polls, 0);
    assert_eq!(outcome.value, 5);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn test_remote_failure_is_done_error_not_timeout() {
    let clock = ManualClock::new();
    let err = poller(fixed(100, 1000), &clock)
        .wait(OperationHandle::<()>::pending("operations/bad"), |h| {
            Ok::<_, RpcError>(OperationHandle::failed(
                h.name(),
                RpcError::new(ErrorKind::FailedPrecondition, "instance is stopping"),
            ))
        })
        .unwrap_err();

    assert_eq!(err.state(), Some(PollState::DoneError));
    match err {
        PollError::Failed { error, polls, .. } => {
            assert_eq!(error.kind, ErrorKind::FailedPrecondition);
            assert_eq!(polls, 1);
        }
        other => panic!("expected remote failure, got {other:?}"),
    }
}

#[test]
fn test_transport_error_is_not_retried_by_poller() {
    let clock = ManualClock::new();
    let mut polls = 0;
    let err = poller(fixed(100, 1000), &clock)
        .wait(OperationHandle::<()>::pending("operations/op"), |_| {
            polls += 1;
            Err::<OperationHandle<()>, _>(RpcError::new(ErrorKind::Network, "reset"))
        })
        .unwrap_err();

    assert_eq!(polls, 1);
    assert_eq!(err.state(), None);
    assert!(matches!(err, PollError::Transport { polls: 1, .. }));
}

#[test]
fn test_growing_interval_respects_cap() {
    let clock = ManualClock::new();
    let config = PollConfig {
        interval_ms: 100,
        max_interval_ms: 300,
        multiplier: 2.0,
        timeout_ms: 60_000,
    };
    let mut polls = 0;
    poller(config, &clock)
        .wait(OperationHandle::pending("operations/grow"), |h| {
            polls += 1;
            Ok::<_, RpcError>(if polls < 5 {
                OperationHandle::pending(h.name())
            } else {
                OperationHandle::succeeded(h.name(), ())
            })
        })
        .unwrap();

    let ms: Vec<u128> = clock.sleeps().iter().map(Duration::as_millis).collect();
    assert_eq!(ms, vec![100, 200, 300, 300, 300]);
}

//! Tests for the retry controller.

use ironlro::clock::{Clock, ManualClock};
use ironlro::retry::{
    CancellationToken, ConstantDelay, LinearDelay, RetryController, RetryError, RetryPolicy,
    TransientOnly,
};
use ironlro::rpc::{ErrorKind, RpcError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn controller(max_attempts: u32, clock: &ManualClock) -> RetryController<ConstantDelay> {
    RetryController::new(max_attempts, ConstantDelay(Duration::from_millis(50))).with_clock(clock.clone().into_shared())
}

#[test]
fn test_always_retryable_failure_runs_exactly_max_attempts() {
    let clock = ManualClock::new();
    let mut calls = 0;
    let result: Result<(), _> = controller(4, &clock).run(
        || {
            calls += 1;
            Err(format!("failure {calls}"))
        },
        &|_: &String| true,
    );

    assert_eq!(calls, 4);
    match result.unwrap_err() {
        RetryError::Exhausted { error, attempts } => {
            assert_eq!(attempts, 4);
            assert_eq!(error, "failure 4");
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(50); 3]);
}

#[test]
fn test_fatal_first_failure_stops_immediately() {
    let clock = ManualClock::new();
    let mut calls = 0;
    let result: Result<(), _> = controller(5, &clock).run(
        || {
            calls += 1;
            Err("bad request")
        },
        &|_: &&str| false,
    );

    assert_eq!(calls, 1);
    assert!(matches!(result, Err(RetryError::Fatal { attempts: 1, .. })));
    assert!(clock.sleeps().is_empty());
}

#[test]
fn test_single_attempt_surfaces_error() {
    let clock = ManualClock::new();
    let result: Result<(), _> = controller(1, &clock).run(|| Err("boom"), &|_: &&str| true);
    let err = result.unwrap_err();
    assert!(err.is_exhausted());
    assert_eq!(err.attempts(), 1);
    assert_eq!(err.last_error(), Some(&"boom"));
}

#[test]
fn test_delay_policy_sees_attempt_indices() {
    let clock = ManualClock::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let policy = move |attempt: u32| {
        record.lock().unwrap().push(attempt);
        Duration::from_millis(u64::from(attempt) * 10)
    };
    let controller = RetryController::new(4, policy).with_clock(clock.clone().into_shared());

    let _ = controller.run(|| Err::<(), _>("transient"), &|_: &&str| true);

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(clock.elapsed(), Duration::from_millis(10 + 20 + 30));
}

#[test]
fn test_success_after_failures_returns_value() {
    let clock = ManualClock::new();
    let mut calls = 0;
    let value = controller(3, &clock)
        .run(
            || {
                calls += 1;
                if calls < 3 { Err("flaky") } else { Ok("done") }
            },
            &|_: &&str| true,
        )
        .unwrap();
    assert_eq!(value, "done");
    assert_eq!(clock.elapsed(), Duration::from_millis(100));
}

#[test]
fn test_cancellation_before_second_attempt() {
    let clock = ManualClock::new();
    let token = CancellationToken::new();
    let controller = controller(5, &clock).with_cancellation(token.clone());

    let mut calls = 0;
    let result: Result<(), _> = controller.run(
        || {
            calls += 1;
            token.cancel();
            Err("unavailable")
        },
        &|_: &&str| true,
    );

    assert_eq!(calls, 1);
    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 1);
    assert_eq!(err.last_error(), Some(&"unavailable"));
}

#[test]
fn test_deadline_clips_sleep_and_stops_further_attempts() {
    let clock = ManualClock::new();
    let deadline = clock.now() + Duration::from_millis(120);
    let mut calls = 0;
    let result: Result<(), _> = controller(10, &clock).with_deadline(deadline).run(
        || {
            calls += 1;
            Err("unavailable")
        },
        &|_: &&str| true,
    );

    // attempts at 0, 50 and 100ms; the third sleep is clipped to 20ms
    assert_eq!(calls, 3);
    assert_eq!(clock.elapsed(), Duration::from_millis(120));
    let err = result.unwrap_err();
    assert!(err.is_deadline_exceeded());
    assert_eq!(err.attempts(), 3);
    assert_eq!(err.last_error(), Some(&"unavailable"));
}

#[test]
fn test_past_deadline_runs_nothing() {
    let clock = ManualClock::new();
    let deadline = clock.now();
    let mut calls = 0;
    let result: Result<(), _> = controller(3, &clock).with_deadline(deadline).run(
        || {
            calls += 1;
            Ok(())
        },
        &|_: &&str| true,
    );
    assert_eq!(calls, 0);
    assert!(matches!(result, Err(RetryError::DeadlineExceeded { attempts: 0, last_error: None })));
}

#[test]
fn test_cancelled_before_first_attempt_runs_nothing() {
    let clock = ManualClock::new();
    let token = CancellationToken::new();
    token.cancel();
    let mut calls = 0;
    let result: Result<(), _> = controller(3, &clock).with_cancellation(token).run(
        || {
            calls += 1;
            Ok(())
        },
        &|_: &&str| true,
    );
    assert_eq!(calls, 0);
    assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0, last_error: None })));
}

#[test]
fn test_linear_delay() {
    let policy = LinearDelay {
        base: Duration::from_millis(100),
        step: Duration::from_millis(50),
        max: Duration::from_millis(220),
    };
    let clock = ManualClock::new();
    let controller = RetryController::new(5, policy).with_clock(clock.clone().into_shared());
    let _ = controller.run(|| Err::<(), _>("busy"), &|_: &&str| true);
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(150),
            Duration::from_millis(200),
            Duration::from_millis(220),
        ]
    );
}

#[test]
fn test_policy_controller_retries_transient_rpc_errors_only() {
    let clock = ManualClock::new();
    let controller = RetryController::from_policy(RetryPolicy::default()).with_clock(clock.clone().into_shared());

    let mut calls = 0;
    let result: Result<(), _> = controller.run(
        || {
            calls += 1;
            Err(RpcError::new(ErrorKind::RateLimited, "quota"))
        },
        &TransientOnly,
    );
    assert_eq!(calls, 3);
    assert!(result.unwrap_err().is_exhausted());
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );

    let mut calls = 0;
    let result: Result<(), _> = controller.run(
        || {
            calls += 1;
            Err(RpcError::new(ErrorKind::AlreadyExists, "secret exists"))
        },
        &TransientOnly,
    );
    assert_eq!(calls, 1);
    assert!(matches!(result, Err(RetryError::Fatal { .. })));
}

#[test]
fn test_retry_with_backoff_passes_through_success() {
    let value = ironlro::retry_with_backoff(&RetryPolicy::no_retry(), || Ok::<_, RpcError>(7)).unwrap();
    assert_eq!(value, 7);
}

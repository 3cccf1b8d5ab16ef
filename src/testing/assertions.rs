//! Assertions for orchestration results.

use crate::clock::ManualClock;
use crate::orchestrator::{OrchestrationError, Step};
use std::fmt::Debug;
use std::time::Duration;

/// Assert that `result` failed at `step` and return the error.
///
/// # Panics
///
/// Panics if `result` is `Ok` or failed at a different step.
pub fn assert_failed_at<T: Debug>(result: Result<T, OrchestrationError>, step: Step) -> OrchestrationError {
    match result {
        Ok(value) => panic!("expected failure at {step}, got Ok({value:?})"),
        Err(e) => {
            assert_eq!(e.step(), step, "failed at the wrong step: {e}");
            e
        }
    }
}

/// Assert that the clock's recorded sleeps add up to `expected`.
///
/// # Panics
///
/// Panics if the total differs.
pub fn assert_clock_slept(clock: &ManualClock, expected: Duration) {
    let sleeps = clock.sleeps();
    let total: Duration = sleeps.iter().sum();
    assert_eq!(total, expected, "unexpected total sleep, individual sleeps: {sleeps:?}");
}

/// Assert the exact sequence of sleeps recorded by the clock.
///
/// # Panics
///
/// Panics if the sequences differ.
pub fn assert_sleeps(clock: &ManualClock, expected: &[Duration]) {
    assert_eq!(clock.sleeps(), expected, "unexpected sleep sequence");
}

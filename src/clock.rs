//! Time source and sleeper used by the retry controller and the poller.
//!
//! Both suspension points of the orchestration layer go through [`Clock`], so a
//! test can swap in [`ManualClock`] and observe every wait without sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic clock with a blocking sleep.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `std::time` and `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Shared handle to the default clock.
#[must_use]
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Virtual clock: `sleep` advances time instantly and records the duration.
///
/// Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualClockInner>>,
}

#[derive(Debug)]
struct ManualClockInner {
    origin: Instant,
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualClockInner {
                origin: Instant::now(),
                offset: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move time forward without recording a sleep.
    ///
    /// # Panics
    ///
    /// Panics if the clock mutex is poisoned.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock().expect("clock mutex poisoned");
        inner.offset += by;
    }

    /// Virtual time elapsed since the clock was created.
    ///
    /// # Panics
    ///
    /// Panics if the clock mutex is poisoned.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().expect("clock mutex poisoned").offset
    }

    /// Every duration passed to `sleep`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the clock mutex is poisoned.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().expect("clock mutex poisoned").sleeps.clone()
    }

    #[must_use]
    pub fn into_shared(self) -> Arc<dyn Clock> {
        Arc::new(self)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let inner = self.inner.lock().expect("clock mutex poisoned");
        inner.origin + inner.offset
    }

    fn sleep(&self, duration: Duration) {
        let mut inner = self.inner.lock().expect("clock mutex poisoned");
        inner.offset += duration;
        inner.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(250));
        clock.advance(Duration::from_millis(50));
        assert_eq!(clock.now() - start, Duration::from_millis(300));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        b.sleep(Duration::from_secs(2));
        assert_eq!(a.elapsed(), Duration::from_secs(2));
    }
}

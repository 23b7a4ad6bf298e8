//! Time abstraction, allowing for mockable clocks in testing.
//!
//! The engine consults the clock for idle detection and for the
//! stay-in-column flush interval; nothing here schedules anything.

use std::fmt::Debug;
use std::time::Instant;

/// A trait abstracting the concept of "now" to allow for time mocking in tests.
pub trait Clock: Send + Sync + Debug {
    /// Current `Instant`.
    fn now(&self) -> Instant;
}

/// The default system clock implementation using `std::time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Test utilities for mocking time.
pub mod mock_clock {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// A mock clock that allows for manual control over the current time in tests.
    #[derive(Debug)]
    pub struct MockClock {
        current_time: Mutex<Instant>,
    }

    impl MockClock {
        /// Creates a new `MockClock` starting at the given `start_time`.
        pub fn new(start_time: Instant) -> Self {
            Self {
                current_time: Mutex::new(start_time),
            }
        }

        /// Advances the mock clock's current time by the specified duration.
        pub fn advance(&self, duration: Duration) {
            let mut current = self.current_time.lock().unwrap();
            *current += duration;
        }
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self::new(Instant::now())
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current_time.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock_clock::MockClock;
    use super::*;
    use std::time::Duration;

    #[test]
    fn system_clock_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn mock_clock_advances_manually() {
        let clock = MockClock::default();
        let start = clock.now();
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now() - start, Duration::from_secs(3));
    }
}

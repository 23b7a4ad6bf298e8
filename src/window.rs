//! Sliding success/fail history windows.
//!
//! Every (rate, column) pair and every power-reduction level keeps a
//! fixed-capacity window over the most recent transmission attempts. The
//! window stores outcomes as a bitmask so that evicting the oldest attempt
//! can repair the success count exactly, and derives two estimates:
//!
//! - **success ratio**: percent of acknowledged attempts, scaled by 128 for
//!   fixed-point headroom (12800 = 100%);
//! - **average throughput**: the success ratio applied to the expected
//!   throughput of the rate, gated behind a minimum sample count so a short
//!   noisy window cannot produce an estimate.

use crate::config::RateScaleConfig;

/// Fixed-point scale of the success ratio (128 * percent).
pub const SUCCESS_RATIO_SCALE: u32 = 128;

/// Sliding outcome history for a single rate or power level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxHistoryWindow {
    /// Outcome bitmask; bit 0 is the most recent attempt.
    data: u64,
    /// Attempts currently represented in `data`.
    attempts: u32,
    /// Successful attempts currently represented in `data`.
    successes: u32,
    /// `128 * 100 * successes / attempts`, `None` while empty.
    success_ratio: Option<u32>,
    /// Estimated throughput at this rate, `None` until enough samples.
    average_tpt: Option<u32>,
}

impl TxHistoryWindow {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts currently held.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Successes currently held.
    #[inline]
    pub fn successes(&self) -> u32 {
        self.successes
    }

    /// Failures currently held.
    #[inline]
    pub fn failures(&self) -> u32 {
        self.attempts - self.successes
    }

    /// Scaled success ratio, `None` while the window is empty.
    #[inline]
    pub fn success_ratio(&self) -> Option<u32> {
        self.success_ratio
    }

    /// Estimated average throughput, `None` until the sample gate is met.
    #[inline]
    pub fn average_tpt(&self) -> Option<u32> {
        self.average_tpt
    }

    /// Forgets all history, as on a column reset or mode change.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Folds a batch of outcomes for one rate into the window.
    ///
    /// Attempts enter one at a time, successes first, evicting the oldest
    /// attempt once the configured capacity is reached. The derived
    /// estimates are refreshed afterwards.
    ///
    /// # Parameters
    /// - `attempts`: Transmission attempts in the batch.
    /// - `successes`: Acknowledged attempts in the batch; at most `attempts`.
    /// - `expected_tpt`: Expected throughput of the rate this window tracks.
    /// - `config`: Supplies window capacity and the estimate sample gate.
    pub fn record(
        &mut self,
        mut attempts: u32,
        mut successes: u32,
        expected_tpt: u16,
        config: &RateScaleConfig,
    ) {
        debug_assert!(successes <= attempts, "more successes than attempts");
        successes = successes.min(attempts);

        let capacity = config.window_capacity;
        let oldest_bit = 1u64 << (capacity - 1);

        while attempts > 0 {
            if self.attempts >= capacity {
                // Window full: drop the oldest attempt, repairing the
                // success count when that attempt had succeeded.
                self.attempts = capacity - 1;
                if self.data & oldest_bit != 0 {
                    self.data &= !oldest_bit;
                    self.successes -= 1;
                }
            }

            self.attempts += 1;
            self.data <<= 1;

            if successes > 0 {
                self.successes += 1;
                self.data |= 0x1;
                successes -= 1;
            }

            attempts -= 1;
        }

        self.success_ratio = (self.attempts > 0)
            .then(|| SUCCESS_RATIO_SCALE * (100 * self.successes) / self.attempts);

        self.refresh_average(expected_tpt, config);
    }

    /// Re-derives the average throughput from the current ratio.
    ///
    /// Kept separate from [`record`](Self::record) because the expected
    /// throughput of a rate changes when the aggregation state flips the
    /// table row underneath an unchanged history.
    pub fn refresh_average(&mut self, expected_tpt: u16, config: &RateScaleConfig) {
        let sufficient = self.failures() >= config.min_failures_to_estimate
            || self.successes >= config.min_successes_to_estimate;

        self.average_tpt = match (sufficient, self.success_ratio) {
            (true, Some(ratio)) => {
                Some((ratio * expected_tpt as u32 + SUCCESS_RATIO_SCALE / 2) / SUCCESS_RATIO_SCALE)
            }
            _ => None,
        };
    }

    /// Drops the throughput estimate while keeping the history, used when a
    /// window is consulted before the sample gate is met.
    pub fn invalidate_average(&mut self) {
        self.average_tpt = None;
    }
}

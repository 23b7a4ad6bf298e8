//! Engine configuration.
//!
//! Every threshold, limit, and timeout the decision paths consult lives
//! here as a tunable with the field defaults the algorithm was tuned with.
//! The engine validates a configuration once at construction; the decision
//! paths then read it without further checks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::constants::{
    DEFAULT_AGG_DISABLE_START, DEFAULT_AGG_FRAME_LIMIT, DEFAULT_AGG_TIME_LIMIT_USEC,
    DEFAULT_AGG_TPT_THRESHOLD, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LEGACY_FAILURE_LIMIT,
    DEFAULT_LEGACY_SUCCESS_LIMIT, DEFAULT_LEGACY_TABLE_COUNT_LIMIT, DEFAULT_MAX_MISSED_RATE_EVENTS,
    DEFAULT_MAX_POWER_REDUCTION, DEFAULT_MIN_FAILURES_TO_ESTIMATE,
    DEFAULT_MIN_SUCCESSES_TO_ESTIMATE, DEFAULT_NON_LEGACY_FAILURE_LIMIT,
    DEFAULT_NON_LEGACY_SUCCESS_LIMIT, DEFAULT_NON_LEGACY_TABLE_COUNT_LIMIT, DEFAULT_POWER_SR_FORCE_INCREASE,
    DEFAULT_POWER_SR_NO_INCREASE, DEFAULT_POWER_STEP, DEFAULT_SR_FORCE_DECREASE,
    DEFAULT_SR_NO_DECREASE, DEFAULT_STAY_IN_COLUMN_TIMEOUT_SECS, DEFAULT_WINDOW_CAPACITY,
    POWER_WINDOW_COUNT,
};
use crate::error::ConfigError;

/// Tunable parameters of the rate-scaling engine.
///
/// Defaults reproduce the behavior the algorithm was tuned with; they are
/// domain-tuned values, not derivable from first principles, which is why
/// all of them are exposed rather than hardcoded.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateScaleConfig {
    /// Tx attempts remembered per rate window (1..=64).
    pub window_capacity: u32,
    /// Failures required before a window yields a throughput estimate.
    pub min_failures_to_estimate: u32,
    /// Successes required before a window yields a throughput estimate.
    pub min_successes_to_estimate: u32,

    /// Success ratio at or below which the rate is force-decreased.
    pub sr_force_decrease: u32,
    /// Success ratio at or above which a decrease is suppressed.
    pub sr_no_decrease: u32,

    /// Evaluations before a legacy column's stats are aged out.
    pub legacy_table_count_limit: u32,
    /// Accumulated failures ending a legacy stay-in-column period.
    pub legacy_failure_limit: u32,
    /// Accumulated successes ending a legacy stay-in-column period.
    pub legacy_success_limit: u32,
    /// Evaluations before an HT/VHT column's stats are aged out.
    pub non_legacy_table_count_limit: u32,
    /// Accumulated failures ending an HT/VHT stay-in-column period.
    pub non_legacy_failure_limit: u32,
    /// Accumulated successes ending an HT/VHT stay-in-column period.
    pub non_legacy_success_limit: u32,

    /// Time in a column before a search is allowed on age alone.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stay_in_column_timeout: Duration,
    /// Tx silence after which a station is re-initialized.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub idle_timeout: Duration,
    /// Consecutive mismatched status reports before a table re-push.
    pub max_missed_rate_events: u32,

    /// Success ratio at or below which power restriction is lifted.
    pub power_sr_force_increase: u32,
    /// Success ratio at or above which more power is never requested.
    pub power_sr_no_increase: u32,
    /// Reduction distance between adjacent power levels.
    pub power_step: u8,
    /// Largest allowed power reduction.
    pub max_power_reduction: u8,

    /// Measured throughput above which aggregation is requested.
    pub agg_tpt_threshold: u32,
    /// Aggregate duration budget pushed to hardware, microseconds.
    pub agg_time_limit_usec: u16,
    /// Frames per aggregate pushed to hardware.
    pub agg_frame_limit: u8,
    /// Retry-chain depth at which hardware stops aggregating.
    pub agg_disable_start: u8,
}

impl Default for RateScaleConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            min_failures_to_estimate: DEFAULT_MIN_FAILURES_TO_ESTIMATE,
            min_successes_to_estimate: DEFAULT_MIN_SUCCESSES_TO_ESTIMATE,
            sr_force_decrease: DEFAULT_SR_FORCE_DECREASE,
            sr_no_decrease: DEFAULT_SR_NO_DECREASE,
            legacy_table_count_limit: DEFAULT_LEGACY_TABLE_COUNT_LIMIT,
            legacy_failure_limit: DEFAULT_LEGACY_FAILURE_LIMIT,
            legacy_success_limit: DEFAULT_LEGACY_SUCCESS_LIMIT,
            non_legacy_table_count_limit: DEFAULT_NON_LEGACY_TABLE_COUNT_LIMIT,
            non_legacy_failure_limit: DEFAULT_NON_LEGACY_FAILURE_LIMIT,
            non_legacy_success_limit: DEFAULT_NON_LEGACY_SUCCESS_LIMIT,
            stay_in_column_timeout: Duration::from_secs(DEFAULT_STAY_IN_COLUMN_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_missed_rate_events: DEFAULT_MAX_MISSED_RATE_EVENTS,
            power_sr_force_increase: DEFAULT_POWER_SR_FORCE_INCREASE,
            power_sr_no_increase: DEFAULT_POWER_SR_NO_INCREASE,
            power_step: DEFAULT_POWER_STEP,
            max_power_reduction: DEFAULT_MAX_POWER_REDUCTION,
            agg_tpt_threshold: DEFAULT_AGG_TPT_THRESHOLD,
            agg_time_limit_usec: DEFAULT_AGG_TIME_LIMIT_USEC,
            agg_frame_limit: DEFAULT_AGG_FRAME_LIMIT,
            agg_disable_start: DEFAULT_AGG_DISABLE_START,
        }
    }
}

impl RateScaleConfig {
    /// Checks structural soundness of the configuration.
    ///
    /// # Errors
    /// - [`ConfigError::WindowCapacityOutOfRange`] - capacity 0 or above 64
    /// - [`ConfigError::PowerReductionOutOfRange`] - reduction exceeds the
    ///   per-level window array
    /// - [`ConfigError::ZeroPowerStep`] - power step of zero
    /// - [`ConfigError::InvertedThresholds`] - a floor above its ceiling
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_capacity == 0 || self.window_capacity > 64 {
            return Err(ConfigError::WindowCapacityOutOfRange {
                got: self.window_capacity,
                max: 64,
            });
        }
        if self.max_power_reduction as usize >= POWER_WINDOW_COUNT {
            return Err(ConfigError::PowerReductionOutOfRange {
                got: self.max_power_reduction,
                max: (POWER_WINDOW_COUNT - 1) as u8,
            });
        }
        if self.power_step == 0 {
            return Err(ConfigError::ZeroPowerStep);
        }
        if self.sr_force_decrease > self.sr_no_decrease {
            return Err(ConfigError::InvertedThresholds {
                name: "sr_force_decrease",
            });
        }
        if self.power_sr_force_increase > self.power_sr_no_increase {
            return Err(ConfigError::InvertedThresholds {
                name: "power_sr_force_increase",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(RateScaleConfig::default().validate(), Ok(()));
    }

    #[test]
    fn oversized_window_rejected() {
        let config = RateScaleConfig {
            window_capacity: 65,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WindowCapacityOutOfRange { got: 65, .. })
        ));
    }

    #[test]
    fn zero_power_step_rejected() {
        let config = RateScaleConfig {
            power_step: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPowerStep));
    }

    #[test]
    fn inverted_decrease_thresholds_rejected() {
        let config = RateScaleConfig {
            sr_force_decrease: 12000,
            sr_no_decrease: 11000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedThresholds { .. })
        ));
    }
}

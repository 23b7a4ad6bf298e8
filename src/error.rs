//! Error types for the rate-scaling engine.
//!
//! Distinguishes configuration errors (rejected at engine construction)
//! from per-event input errors (a single update is dropped, state is left
//! unchanged). Conditions the algorithm recovers from on its own — an
//! exhausted column search, an aborted column switch, a desynchronized
//! hardware table — are state transitions, not errors, and never surface
//! here. The `thiserror` crate is used for ergonomic error definitions.

use thiserror::Error;

use crate::types::{RateWord, StationId};

/// Errors raised while validating a [`crate::config::RateScaleConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// History window capacity outside the representable range.
    #[error("window capacity {got} outside supported range 1..={max}")]
    WindowCapacityOutOfRange { got: u32, max: u32 },

    /// Power-reduction bound exceeds what the per-level window array holds.
    #[error("max power reduction {got} exceeds supported maximum {max}")]
    PowerReductionOutOfRange { got: u8, max: u8 },

    /// Power step of zero would make the power loop walk in place.
    #[error("power step must be non-zero")]
    ZeroPowerStep,

    /// A threshold pair is ordered backwards.
    #[error("threshold '{name}' must not exceed its ceiling counterpart")]
    InvertedThresholds { name: &'static str },
}

/// Main error type for rate-scaling operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateScaleError {
    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No state exists for the given station.
    #[error("unknown station: {0}")]
    StationNotFound(StationId),

    /// A hardware rate word did not decode to any catalog rate.
    #[error("malformed rate word {0}")]
    MalformedRateWord(RateWord),

    /// A rate index fell outside the catalog.
    #[error("rate index {0} outside catalog")]
    RateIndexOutOfRange(u8),
}

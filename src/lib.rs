//! `ratescale`: adaptive transmission-rate and transmit-power control for a
//! wireless link layer.
//!
//! For every connected peer station the engine continuously picks, from the
//! space of modulation/antenna/bandwidth/guard-interval combinations, the
//! rate expected to maximize throughput under the observed channel, and
//! trims transmit power to the minimum that sustains it. The primary entry
//! point is the [`RateScaleEngine`].
//!
//! ## Core Concepts
//!
//! - **[`RateScaleEngine`]**: consumes transmission-status events and
//!   drives all decisions. One engine per radio; one state per station.
//! - **Columns**: fixed combinations of modulation family, antenna set,
//!   and guard interval. The engine adjusts the rate inside a column and
//!   periodically searches neighboring columns for a better fit.
//! - **[`LinkController`]**: the fire-and-forget boundary through which
//!   finalized rate tables and aggregation requests leave the engine.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ratescale::{
//!     Antenna, Band, HardwareCapabilities, LinkController, RateScaleConfig, RateScaleEngine,
//!     RateTableCmd, StationCapabilities, StationId, Tid, TxStatus,
//! };
//! use ratescale::time::SystemClock;
//!
//! #[derive(Debug)]
//! struct PrintLink;
//!
//! impl LinkController for PrintLink {
//!     fn program_rate_table(&self, station: StationId, cmd: &RateTableCmd) {
//!         println!("{station}: program chain starting {}", cmd.chain[0]);
//!     }
//!     fn request_aggregation_start(&self, station: StationId, tid: Tid) {
//!         println!("{station}: start aggregation on {tid}");
//!     }
//!     fn request_aggregation_stop(&self, station: StationId, tid: Tid) {
//!         println!("{station}: stop aggregation on {tid}");
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hw = HardwareCapabilities {
//!         valid_tx_ant: Antenna::AB,
//!         ldpc: true,
//!         coex_mimo_allowed: true,
//!         coex_tpc_allowed: true,
//!     };
//!     let mut engine = RateScaleEngine::new(
//!         RateScaleConfig::default(),
//!         hw,
//!         Arc::new(SystemClock),
//!         Arc::new(PrintLink),
//!     )?;
//!
//!     // A legacy-only peer associates on 2.4 GHz.
//!     let id = StationId::new(1);
//!     engine.on_peer_associated(id, StationCapabilities::legacy_only(), Band::TwoGhz);
//!
//!     // Report the outcome of a transmission at the programmed rate.
//!     let programmed = engine.current_rate(id).expect("station is registered");
//!     engine.on_tx_status(
//!         id,
//!         &TxStatus {
//!             initial_rate: programmed.to_word(),
//!             tid: Some(Tid::new(0)),
//!             attempts: 1,
//!             successes: 1,
//!             aggregated: false,
//!         },
//!     )?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Scope
//!
//! The engine is pure control logic: it performs no I/O, holds no locks,
//! and never blocks. Frame transmission, status reporting, capability
//! discovery, and the aggregation negotiation protocol live behind the
//! host boundary.

pub mod columns;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod rates;
pub mod station;
pub mod throughput;
pub mod time;
pub mod traits;
pub mod types;
pub mod window;

mod table_builder;
mod txpower;

#[cfg(any(test, feature = "test_utils"))]
pub mod fuzz_harnesses;

pub use columns::{ColumnId, ColumnMode};
pub use config::RateScaleConfig;
pub use engine::{RateScaleEngine, TxStatus};
pub use error::{ConfigError, RateScaleError};
pub use rates::{Antenna, Band, Bandwidth, LinkMode, Rate};
pub use station::{HardwareCapabilities, StationCapabilities, VhtMcsSupport};
pub use traits::{LinkController, RateTableCmd};
pub use types::{RateWord, StationId, Tid};

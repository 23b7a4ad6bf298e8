//! Fuzz testing harnesses for the rate-scaling engine.
//!
//! Deterministic entry points for external fuzzing drivers: each harness
//! builds a pre-conditioned engine and feeds it fuzzer-shaped input,
//! relying on the debug-build invariants inside the engine to catch state
//! corruption. No harness panics on malformed input by design.

use std::sync::Arc;
use std::time::Instant;

use crate::config::RateScaleConfig;
use crate::engine::{RateScaleEngine, TxStatus};
use crate::rates::{Antenna, Band};
use crate::station::{HardwareCapabilities, StationCapabilities};
use crate::time::mock_clock::MockClock;
use crate::traits::{LinkController, RateTableCmd};
use crate::types::{RateWord, StationId, Tid};

#[derive(Debug, Default)]
struct SinkLink;

impl LinkController for SinkLink {
    fn program_rate_table(&self, _station: StationId, _cmd: &RateTableCmd) {}
    fn request_aggregation_start(&self, _station: StationId, _tid: Tid) {}
    fn request_aggregation_stop(&self, _station: StationId, _tid: Tid) {}
}

/// Fuzz tests status-event ingestion.
///
/// Interprets fuzzer bytes as a stream of raw rate words and outcome
/// counts, and feeds them to an engine holding one associated legacy
/// station. Malformed words must be dropped, counted, and never corrupt
/// the station state or panic.
///
/// # Parameters
/// - `data`: Fuzzer-generated input, consumed in 8-byte records.
pub fn rate_scale_tx_status_harness(data: &[u8]) {
    let hw = HardwareCapabilities {
        valid_tx_ant: Antenna::AB,
        ldpc: true,
        coex_mimo_allowed: true,
        coex_tpc_allowed: true,
    };
    let clock = Arc::new(MockClock::new(Instant::now()));
    let Ok(mut engine) = RateScaleEngine::new(
        RateScaleConfig::default(),
        hw,
        clock,
        Arc::new(SinkLink),
    ) else {
        return;
    };

    let id = StationId::new(0);
    engine.on_peer_associated(id, StationCapabilities::legacy_only(), Band::TwoGhz);

    for record in data.chunks_exact(8) {
        let word = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let attempts = u32::from(record[4] % 64);
        let successes = u32::from(record[5]) % (attempts + 1);
        let aggregated = record[6] & 1 != 0;
        let tid = (record[7] < 8).then(|| Tid::new(record[7]));

        let status = TxStatus {
            initial_rate: RateWord::new(word),
            tid,
            attempts,
            successes,
            aggregated,
        };
        let _ = engine.on_tx_status(id, &status);
    }
}

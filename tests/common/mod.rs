//! Shared fixtures for the integration suites: a recording link
//! controller, a mock-clock engine builder, and capability presets.

#![allow(dead_code)] // Each suite uses its own subset of the helpers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ratescale::time::mock_clock::MockClock;
use ratescale::{
    Antenna, Band, Bandwidth, HardwareCapabilities, LinkController, Rate, RateScaleConfig,
    RateScaleEngine, RateTableCmd, StationCapabilities, StationId, Tid, TxStatus, VhtMcsSupport,
};

/// Records every outbound call so tests can assert on what reached the
/// hardware boundary.
#[derive(Debug, Default)]
pub struct RecordingLink {
    pub programmed: Mutex<Vec<(StationId, RateTableCmd)>>,
    pub agg_starts: Mutex<Vec<(StationId, Tid)>>,
    pub agg_stops: Mutex<Vec<(StationId, Tid)>>,
}

impl RecordingLink {
    pub fn last_cmd(&self) -> Option<RateTableCmd> {
        self.programmed.lock().unwrap().last().map(|(_, cmd)| *cmd)
    }

    pub fn programmed_count(&self) -> usize {
        self.programmed.lock().unwrap().len()
    }
}

impl LinkController for RecordingLink {
    fn program_rate_table(&self, station: StationId, cmd: &RateTableCmd) {
        self.programmed.lock().unwrap().push((station, *cmd));
    }

    fn request_aggregation_start(&self, station: StationId, tid: Tid) {
        self.agg_starts.lock().unwrap().push((station, tid));
    }

    fn request_aggregation_stop(&self, station: StationId, tid: Tid) {
        self.agg_stops.lock().unwrap().push((station, tid));
    }
}

/// An engine wired to a mock clock and a recording controller.
pub struct TestRig {
    pub engine: RateScaleEngine,
    pub clock: Arc<MockClock>,
    pub link: Arc<RecordingLink>,
}

pub fn default_hw() -> HardwareCapabilities {
    HardwareCapabilities {
        valid_tx_ant: Antenna::AB,
        ldpc: true,
        coex_mimo_allowed: true,
        coex_tpc_allowed: true,
    }
}

pub fn rig() -> TestRig {
    rig_with(RateScaleConfig::default(), default_hw())
}

pub fn rig_with(config: RateScaleConfig, hw: HardwareCapabilities) -> TestRig {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let link = Arc::new(RecordingLink::default());
    let engine = RateScaleEngine::new(config, hw, clock.clone(), link.clone())
        .expect("test configuration must validate");
    TestRig {
        engine,
        clock,
        link,
    }
}

pub fn ht_peer() -> StationCapabilities {
    let mut caps = StationCapabilities::legacy_only();
    caps.ht_supported = true;
    caps.ht_mcs_rx_mask = [0xFF, 0xFF];
    caps.rx_nss = 2;
    caps
}

pub fn vht_peer_80mhz() -> StationCapabilities {
    let mut caps = StationCapabilities::legacy_only();
    caps.legacy_rates = 0x0FF0; // OFDM only
    caps.ht_supported = true;
    caps.vht_supported = true;
    caps.vht_mcs_per_nss = [VhtMcsSupport::Mcs0To9, VhtMcsSupport::Mcs0To9];
    caps.rx_nss = 2;
    caps.bandwidth = Bandwidth::Mhz80;
    caps.sgi_80 = true;
    caps
}

/// Feeds `count` single-frame events at the currently programmed head
/// rate, each acknowledged or not, advancing the clock a little per event.
pub fn drive_frames(rig: &mut TestRig, id: StationId, count: u32, acked: bool) {
    for _ in 0..count {
        rig.clock.advance(Duration::from_millis(5));
        let head = rig
            .link
            .last_cmd()
            .expect("a table must have been programmed")
            .chain[0];
        let status = TxStatus {
            initial_rate: head,
            tid: Some(Tid::new(0)),
            attempts: if acked { 1 } else { 3 },
            successes: u32::from(acked),
            aggregated: false,
        };
        rig.engine
            .on_tx_status(id, &status)
            .expect("station must be registered");
    }
}

/// The head rate of the last programmed command, decoded.
pub fn programmed_rate(rig: &TestRig, band: Band) -> Rate {
    let cmd = rig.link.last_cmd().expect("nothing programmed yet");
    Rate::from_word(cmd.chain[0], band).expect("programmed words must decode")
}

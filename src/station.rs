//! Per-station rate-scaling state and peer capability handling.
//!
//! A [`StationRateState`] is created when a peer associates and lives until
//! it is removed. It owns the two scale-table slots (active and search),
//! the accumulated stay-in-column counters, and everything derived from the
//! peer's capabilities: the per-modulation support masks and the ceiling
//! rate of each modulation. All mutation happens on the engine's event
//! path; nothing here is shared.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::columns::{ColumnId, ColumnMode};
use crate::config::RateScaleConfig;
use crate::constants::{POWER_WINDOW_COUNT, RATE_COUNT};
use crate::rates::{
    Antenna, Band, Bandwidth, FIRST_HT_RATE, FIRST_OFDM_RATE, LinkMode, RATE_1M_IDX, RATE_2M_IDX,
    RATE_5M_IDX, RATE_6M_IDX, RATE_9M_IDX, RATE_11M_IDX, RATE_12M_IDX, RATE_18M_IDX, RATE_24M_IDX,
    RATE_36M_IDX, RATE_48M_IDX, RATE_54M_IDX, RATE_MCS_7_IDX, RATE_MCS_8_IDX, RATE_MCS_9_IDX, Rate,
    ht_to_legacy,
};
use crate::throughput::{EXPECTED_TPT_LEGACY, TptTable};
use crate::traits::RateTableCmd;
use crate::window::TxHistoryWindow;

/// Highest VHT MCS a peer advertises per spatial stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VhtMcsSupport {
    #[default]
    NotSupported,
    Mcs0To7,
    Mcs0To8,
    Mcs0To9,
}

impl VhtMcsSupport {
    fn highest_index(self) -> Option<u8> {
        match self {
            VhtMcsSupport::NotSupported => None,
            VhtMcsSupport::Mcs0To7 => Some(RATE_MCS_7_IDX),
            VhtMcsSupport::Mcs0To8 => Some(RATE_MCS_8_IDX),
            VhtMcsSupport::Mcs0To9 => Some(RATE_MCS_9_IDX),
        }
    }
}

/// Peer capabilities captured at association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationCapabilities {
    /// Supported legacy rates as a catalog-index bitmask.
    pub legacy_rates: u16,
    pub ht_supported: bool,
    pub vht_supported: bool,
    /// HT MCS receive bitmask per stream (MCS 0..=7 each).
    pub ht_mcs_rx_mask: [u8; 2],
    /// Highest VHT MCS per stream count.
    pub vht_mcs_per_nss: [VhtMcsSupport; 2],
    /// Spatial streams the peer can receive.
    pub rx_nss: u8,
    /// Widest channel the peer can receive.
    pub bandwidth: Bandwidth,
    pub sgi_20: bool,
    pub sgi_40: bool,
    pub sgi_80: bool,
    /// Peer accepts LDPC-coded frames.
    pub ldpc: bool,
    /// Peer pinned to a single active chain by power management.
    pub static_smps: bool,
    /// Peer power save is active.
    pub power_save_enabled: bool,
    /// TIDs on which aggregation may be negotiated.
    pub agg_enabled_tids: u8,
}

impl StationCapabilities {
    /// A legacy-only peer supporting the whole 2.4 GHz ladder.
    pub fn legacy_only() -> Self {
        Self {
            legacy_rates: 0x0FFF,
            ht_supported: false,
            vht_supported: false,
            ht_mcs_rx_mask: [0, 0],
            vht_mcs_per_nss: [VhtMcsSupport::NotSupported; 2],
            rx_nss: 1,
            bandwidth: Bandwidth::Mhz20,
            sgi_20: false,
            sgi_40: false,
            sgi_80: false,
            ldpc: false,
            static_smps: false,
            power_save_enabled: false,
            agg_enabled_tids: 0xFF,
        }
    }
}

/// Radio-side facts the engine needs about the local hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCapabilities {
    /// Transmit chains the radio can drive.
    pub valid_tx_ant: Antenna,
    /// Radio supports LDPC coding.
    pub ldpc: bool,
    /// Coexistence currently permits dual-stream transmission.
    pub coex_mimo_allowed: bool,
    /// Coexistence currently permits power reduction.
    pub coex_tpc_allowed: bool,
}

/// Search-machine state of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScaleState {
    /// Only rate adjustment within the current column.
    StayInColumn,
    /// Alternative columns are being proposed and measured.
    SearchCycleStarted,
    /// All profitable alternatives exhausted; settling down.
    SearchCycleEnded,
}

/// One scale-table slot: a chosen rate, its column, and the measurement
/// windows for every rate and power level under that configuration.
#[derive(Debug, Clone)]
pub(crate) struct ScaleTable {
    pub rate: Rate,
    /// `None` marks an unused or abandoned slot.
    pub column: Option<ColumnId>,
    pub expected_tpt: &'static TptTable,
    pub win: [TxHistoryWindow; RATE_COUNT],
    pub power_win: [TxHistoryWindow; POWER_WINDOW_COUNT],
}

impl ScaleTable {
    fn unused() -> Self {
        Self {
            rate: Rate {
                mode: LinkMode::None,
                index: RATE_1M_IDX,
                ant: Antenna::NONE,
                bw: Bandwidth::Mhz20,
                sgi: false,
                ldpc: false,
            },
            column: None,
            expected_tpt: &EXPECTED_TPT_LEGACY,
            win: [TxHistoryWindow::new(); RATE_COUNT],
            power_win: [TxHistoryWindow::new(); POWER_WINDOW_COUNT],
        }
    }

    /// Clears every rate and power window.
    pub fn clear_windows(&mut self) {
        for win in &mut self.win {
            win.clear();
        }
        for win in &mut self.power_win {
            win.clear();
        }
    }

    /// Copies the rate/column/model identity of another slot, keeping this
    /// slot's measurement windows untouched.
    pub fn copy_meta_from(&mut self, other: &ScaleTable) {
        self.rate = other.rate;
        self.column = other.column;
        self.expected_tpt = other.expected_tpt;
    }
}

/// Entry of the RSSI-to-initial-rate lookup.
struct InitialRateEntry {
    rssi: i8,
    index: u8,
}

const fn entry(rssi: i8, index: u8) -> InitialRateEntry {
    InitialRateEntry { rssi, index }
}

/// 2.4 GHz initial-rate thresholds, scanned top-down for the first entry
/// whose threshold the observed RSSI meets.
static INITIAL_RATES_2GHZ: [InitialRateEntry; 10] = [
    entry(-60, RATE_54M_IDX),
    entry(-64, RATE_48M_IDX),
    entry(-68, RATE_36M_IDX),
    entry(-80, RATE_24M_IDX),
    entry(-84, RATE_18M_IDX),
    entry(-85, RATE_12M_IDX),
    entry(-86, RATE_11M_IDX),
    entry(-88, RATE_5M_IDX),
    entry(-90, RATE_2M_IDX),
    entry(i8::MIN, RATE_1M_IDX),
];

/// 5 GHz initial-rate thresholds.
static INITIAL_RATES_5GHZ: [InitialRateEntry; 8] = [
    entry(-60, RATE_54M_IDX),
    entry(-64, RATE_48M_IDX),
    entry(-72, RATE_36M_IDX),
    entry(-80, RATE_24M_IDX),
    entry(-84, RATE_18M_IDX),
    entry(-85, RATE_12M_IDX),
    entry(-87, RATE_9M_IDX),
    entry(i8::MIN, RATE_6M_IDX),
];

/// Complete rate-scaling state of one peer station.
#[derive(Debug, Clone)]
pub(crate) struct StationRateState {
    pub caps: StationCapabilities,
    pub band: Band,

    /// The two table slots; roles flip via `active_tbl`, never reallocate.
    pub tables: [ScaleTable; 2],
    pub active_tbl: usize,
    /// A search table is pending measurement in the non-active slot.
    pub search_better_tbl: bool,
    pub state: ScaleState,
    /// Columns already proposed during the current search cycle.
    pub visited_columns: u8,

    pub active_legacy_rate: u16,
    pub active_siso_rate: u16,
    pub active_mimo2_rate: u16,
    pub is_vht: bool,
    pub ldpc: bool,

    pub total_failed: u32,
    pub total_success: u32,
    pub table_count: u32,
    pub table_count_limit: u32,
    pub max_failure_limit: u32,
    pub max_success_limit: u32,
    pub flush_time: Option<Instant>,
    pub last_tx: Instant,

    /// Measured throughput of the active configuration, in the 100x units
    /// the search comparisons use.
    pub last_tpt: u32,
    pub last_rate_idx: u8,
    pub missed_rate_events: u32,

    pub is_agg: bool,
    pub agg_active_tids: u8,

    /// Receive chains last reported and their per-chain RSSI.
    pub chains: Antenna,
    pub chain_signal: [i8; 3],

    /// Last command pushed to hardware.
    pub lq: RateTableCmd,
    /// Dropped malformed status events, kept for diagnostics only.
    pub invalid_events: u64,
}

impl StationRateState {
    /// Builds fresh state from peer capabilities.
    ///
    /// Support masks and ceilings are derived here; the starting rate and
    /// the first programmed table are the engine's responsibility.
    pub fn new(
        caps: StationCapabilities,
        band: Band,
        hw: &HardwareCapabilities,
        config: &RateScaleConfig,
        now: Instant,
    ) -> Self {
        let active_legacy_rate = caps.legacy_rates & 0x0FFF;

        let (active_siso_rate, active_mimo2_rate, is_vht) = if caps.vht_supported {
            let siso = vht_rate_mask(caps.vht_mcs_per_nss[0], caps.bandwidth);
            let mimo2 = if caps.rx_nss >= 2 {
                vht_rate_mask(caps.vht_mcs_per_nss[1], caps.bandwidth)
            } else {
                0
            };
            (siso, mimo2, true)
        } else {
            (
                ht_rate_mask(caps.ht_mcs_rx_mask[0]),
                ht_rate_mask(caps.ht_mcs_rx_mask[1]),
                false,
            )
        };

        let ldpc = hw.ldpc && caps.ldpc;

        let lq = RateTableCmd {
            single_stream_ant: hw.valid_tx_ant.first(),
            dual_stream_ant: Antenna::AB,
            ..Default::default()
        };

        Self {
            agg_active_tids: 0,
            is_agg: false,
            caps,
            band,
            tables: [ScaleTable::unused(), ScaleTable::unused()],
            active_tbl: 0,
            search_better_tbl: false,
            state: ScaleState::StayInColumn,
            visited_columns: 0,
            active_legacy_rate,
            active_siso_rate,
            active_mimo2_rate,
            is_vht,
            ldpc,
            total_failed: 0,
            total_success: 0,
            table_count: 0,
            table_count_limit: config.legacy_table_count_limit,
            max_failure_limit: config.legacy_failure_limit,
            max_success_limit: config.legacy_success_limit,
            flush_time: None,
            last_tx: now,
            last_tpt: 0,
            last_rate_idx: RATE_1M_IDX,
            // Start out of sync so a stale first report cannot loop forever.
            missed_rate_events: config.max_missed_rate_events,
            chains: Antenna::NONE,
            chain_signal: [0; 3],
            lq,
            invalid_events: 0,
        }
    }

    /// Support mask for the given modulation family.
    pub fn supported_rates(&self, mode: LinkMode) -> u16 {
        if mode.is_legacy() {
            self.active_legacy_rate
        } else if mode.is_siso() {
            self.active_siso_rate
        } else if mode.is_mimo2() {
            self.active_mimo2_rate
        } else {
            debug_assert!(false, "no support mask for {mode:?}");
            0
        }
    }

    /// Highest supported rate index for a column mode.
    pub fn max_allowed_rate(&self, mode: ColumnMode) -> Option<u8> {
        let mask = match mode {
            ColumnMode::Legacy => self.active_legacy_rate,
            ColumnMode::Siso => self.active_siso_rate,
            ColumnMode::Mimo2 => self.active_mimo2_rate,
        };
        (mask != 0).then(|| 15 - mask.leading_zeros() as u8)
    }

    /// True when the station supports transmitting `rate`.
    pub fn rate_is_supported(&self, rate: &Rate) -> bool {
        self.supported_rates(rate.mode) & (1 << rate.index) != 0
    }

    /// Table slot index holding the configuration under evaluation.
    pub fn working_tbl(&self) -> usize {
        if self.search_better_tbl {
            1 - self.active_tbl
        } else {
            self.active_tbl
        }
    }

    /// Records the chains and per-chain RSSI of a received frame.
    pub fn update_rssi(&mut self, chains: Antenna, chain_signal: [i8; 3]) {
        self.chains = chains;
        self.chain_signal = chain_signal;
    }

    /// Picks the legacy rate and antenna to start a fresh station at, from
    /// the best per-chain RSSI seen so far.
    pub fn initial_rate(&self, hw: &HardwareCapabilities) -> Rate {
        let mut best_rssi = i8::MIN;
        let mut best_ant = Antenna::NONE;
        for chain in 0..3u8 {
            if self.chains.mask() & (1 << chain) == 0 {
                continue;
            }
            if self.chain_signal[chain as usize] > best_rssi {
                best_rssi = self.chain_signal[chain as usize];
                best_ant = Antenna::from_mask(1 << chain);
            }
        }

        let ant = if best_ant != Antenna::A && best_ant != Antenna::B {
            hw.valid_tx_ant.first()
        } else {
            best_ant
        };

        let (mode, default_index, entries): (_, _, &[InitialRateEntry]) = match self.band {
            Band::FiveGhz => (LinkMode::LegacyA, RATE_6M_IDX, &INITIAL_RATES_5GHZ),
            Band::TwoGhz => (LinkMode::LegacyG, RATE_1M_IDX, &INITIAL_RATES_2GHZ),
        };

        // Fall back to the lowest rate the peer actually supports.
        let mut index = if self.active_legacy_rate != 0 {
            self.active_legacy_rate.trailing_zeros() as u8
        } else {
            default_index
        };

        for entry in entries {
            if best_rssi >= entry.rssi && self.active_legacy_rate & (1 << entry.index) != 0 {
                index = entry.index;
                break;
            }
        }

        log::debug!("initial rate idx {index} ant {:?} rssi {best_rssi}", ant);

        Rate {
            mode,
            index,
            ant,
            bw: Bandwidth::Mhz20,
            sgi: false,
            ldpc: false,
        }
    }

    /// Rewrites `rate` as the configuration to continue a fallback chain
    /// with after leaving its column: dual-stream falls back to
    /// single-stream at the same MCS, single-stream to the legacy ladder,
    /// legacy has nowhere further down.
    pub fn downgrade_column(&self, hw: &HardwareCapabilities, rate: &mut Rate) {
        if rate.mode.is_legacy() {
            return;
        } else if rate.mode.is_siso() {
            rate.mode = LinkMode::legacy_for(self.band);
            rate.bw = Bandwidth::Mhz20;
            debug_assert!(
                rate.index >= FIRST_HT_RATE,
                "downgrading a non-HT index {}",
                rate.index
            );
            rate.index = ht_to_legacy(rate.index);
            rate.ldpc = false;
        } else {
            rate.mode = if rate.mode == LinkMode::VhtMimo2 {
                LinkMode::VhtSiso
            } else {
                LinkMode::HtSiso
            };
        }

        if rate.ant.count() > 1 {
            rate.ant = hw.valid_tx_ant.first();
        }

        rate.sgi = false;

        if !self.rate_is_supported(rate) {
            rate.step_down_in_column(self.supported_rates(rate.mode));
        }
    }
}

/// Expands an HT per-stream MCS bitmask into a catalog-index mask.
///
/// MCS 0 keeps its position while MCS 1..=7 shift past the 9 Mbps catalog
/// hole, then the whole mask moves up to the OFDM base index.
fn ht_rate_mask(mcs_mask: u8) -> u16 {
    let m = mcs_mask as u16;
    let spread = ((m << 1) | (m & 0x1)) & !0x2;
    spread << FIRST_OFDM_RATE
}

/// Builds a catalog-index mask from a VHT highest-MCS declaration.
fn vht_rate_mask(support: VhtMcsSupport, bw: Bandwidth) -> u16 {
    let Some(highest) = support.highest_index() else {
        return 0;
    };

    let mut mask = 0u16;
    for idx in FIRST_HT_RATE..=highest {
        if idx == RATE_9M_IDX {
            continue;
        }
        // MCS 9 does not fit a 20 MHz channel.
        if idx == RATE_MCS_9_IDX && bw == Bandwidth::Mhz20 {
            continue;
        }
        mask |= 1 << idx;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hw() -> HardwareCapabilities {
        HardwareCapabilities {
            valid_tx_ant: Antenna::AB,
            ldpc: true,
            coex_mimo_allowed: true,
            coex_tpc_allowed: true,
        }
    }

    fn state_for(caps: StationCapabilities, band: Band) -> StationRateState {
        StationRateState::new(caps, band, &hw(), &RateScaleConfig::default(), Instant::now())
    }

    #[test]
    fn ht_mask_expansion_places_mcs_on_catalog() {
        // MCS 0..=7 all supported.
        let mask = ht_rate_mask(0xFF);
        assert_eq!(mask & (1 << RATE_6M_IDX), 1 << RATE_6M_IDX); // MCS 0
        assert_eq!(mask & (1 << RATE_9M_IDX), 0); // hole stays empty
        assert_eq!(mask & (1 << RATE_12M_IDX), 1 << RATE_12M_IDX); // MCS 1
        assert_eq!(mask & (1 << RATE_MCS_7_IDX), 1 << RATE_MCS_7_IDX);

        // MCS 0 only.
        assert_eq!(ht_rate_mask(0x01), 1 << RATE_6M_IDX);
    }

    #[test]
    fn vht_mask_excludes_mcs9_at_20mhz() {
        let narrow = vht_rate_mask(VhtMcsSupport::Mcs0To9, Bandwidth::Mhz20);
        assert_eq!(narrow & (1 << RATE_MCS_9_IDX), 0);
        assert_ne!(narrow & (1 << RATE_MCS_8_IDX), 0);

        let wide = vht_rate_mask(VhtMcsSupport::Mcs0To9, Bandwidth::Mhz80);
        assert_ne!(wide & (1 << RATE_MCS_9_IDX), 0);
    }

    #[test]
    fn mimo_mask_empty_for_single_stream_peer() {
        let mut caps = StationCapabilities::legacy_only();
        caps.vht_supported = true;
        caps.vht_mcs_per_nss = [VhtMcsSupport::Mcs0To9, VhtMcsSupport::Mcs0To9];
        caps.rx_nss = 1;
        caps.bandwidth = Bandwidth::Mhz80;

        let state = state_for(caps, Band::FiveGhz);
        assert_eq!(state.active_mimo2_rate, 0);
        assert_ne!(state.active_siso_rate, 0);
    }

    #[test]
    fn initial_rate_follows_best_chain_rssi() {
        let mut state = state_for(StationCapabilities::legacy_only(), Band::TwoGhz);
        state.update_rssi(Antenna::AB, [-70, -58, 0]);

        let rate = state.initial_rate(&hw());
        // -58 meets the -60 threshold of the top entry.
        assert_eq!(rate.index, RATE_54M_IDX);
        assert_eq!(rate.ant, Antenna::B);
        assert_eq!(rate.mode, LinkMode::LegacyG);
    }

    #[test]
    fn initial_rate_skips_unsupported_entries() {
        let mut caps = StationCapabilities::legacy_only();
        caps.legacy_rates &= !(1 << RATE_54M_IDX);
        let mut state = state_for(caps, Band::TwoGhz);
        state.update_rssi(Antenna::A, [-58, 0, 0]);

        // 54M is masked out, so the scan settles on the next entry down.
        assert_eq!(state.initial_rate(&hw()).index, RATE_48M_IDX);
    }

    #[test]
    fn initial_rate_without_rssi_starts_at_the_bottom() {
        let state = state_for(StationCapabilities::legacy_only(), Band::TwoGhz);
        let rate = state.initial_rate(&hw());
        assert_eq!(rate.index, RATE_1M_IDX);
        assert_eq!(rate.ant, Antenna::A); // first valid hardware antenna
    }

    #[test]
    fn weak_signal_lands_on_threshold_floor() {
        let mut state = state_for(StationCapabilities::legacy_only(), Band::TwoGhz);
        state.update_rssi(Antenna::A, [-89, 0, 0]);
        assert_eq!(state.initial_rate(&hw()).index, RATE_2M_IDX);
    }

    #[test]
    fn downgrade_mimo_keeps_index_drops_to_siso() {
        let mut caps = StationCapabilities::legacy_only();
        caps.ht_supported = true;
        caps.ht_mcs_rx_mask = [0xFF, 0xFF];
        caps.rx_nss = 2;
        let state = state_for(caps, Band::TwoGhz);

        let mut rate = Rate {
            mode: LinkMode::HtMimo2,
            index: RATE_36M_IDX,
            ant: Antenna::AB,
            bw: Bandwidth::Mhz40,
            sgi: true,
            ldpc: true,
        };
        state.downgrade_column(&hw(), &mut rate);

        assert_eq!(rate.mode, LinkMode::HtSiso);
        assert_eq!(rate.index, RATE_36M_IDX);
        assert_eq!(rate.ant, Antenna::A);
        assert!(!rate.sgi);
    }

    #[test]
    fn downgrade_siso_maps_onto_legacy_ladder() {
        let mut caps = StationCapabilities::legacy_only();
        caps.ht_supported = true;
        caps.ht_mcs_rx_mask = [0xFF, 0];
        let state = state_for(caps, Band::TwoGhz);

        let mut rate = Rate {
            mode: LinkMode::HtSiso,
            index: RATE_MCS_7_IDX,
            ant: Antenna::A,
            bw: Bandwidth::Mhz20,
            sgi: false,
            ldpc: true,
        };
        state.downgrade_column(&hw(), &mut rate);

        assert_eq!(rate.mode, LinkMode::LegacyG);
        assert_eq!(rate.index, RATE_54M_IDX);
        assert!(!rate.ldpc);
    }

    #[test]
    fn max_allowed_rate_tracks_mask_ceiling() {
        let state = state_for(StationCapabilities::legacy_only(), Band::TwoGhz);
        assert_eq!(state.max_allowed_rate(ColumnMode::Legacy), Some(RATE_54M_IDX));
        assert_eq!(state.max_allowed_rate(ColumnMode::Siso), None);
    }

    #[test]
    fn cck_rates_masked_in_derivation() {
        let mut caps = StationCapabilities::legacy_only();
        caps.legacy_rates = 0xFFFF; // host handed extra bits
        let state = state_for(caps, Band::TwoGhz);
        assert_eq!(state.active_legacy_rate, 0x0FFF);
        assert_eq!(state.active_legacy_rate & (1 << RATE_18M_IDX), 1 << RATE_18M_IDX);
    }

    #[test]
    fn mimo_mask_from_second_ht_stream() {
        let mut caps = StationCapabilities::legacy_only();
        caps.ht_supported = true;
        caps.ht_mcs_rx_mask = [0xFF, 0x0F];
        caps.rx_nss = 2;
        let state = state_for(caps, Band::TwoGhz);
        assert_ne!(state.active_mimo2_rate, 0);
        assert_eq!(state.active_mimo2_rate & (1 << RATE_MCS_7_IDX), 0);
        assert_eq!(state.max_allowed_rate(ColumnMode::Mimo2), Some(RATE_24M_IDX));
    }
}

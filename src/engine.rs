//! The rate-scaling engine.
//!
//! This module provides the [`RateScaleEngine`], the central orchestrator
//! of rate and transmit-power adaptation. It owns the per-station state,
//! consumes transmission-status events, and pushes finalized rate tables
//! through the [`LinkController`] boundary.
//!
//! ## Decision cycle
//!
//! Every status event folds its outcomes into the measurement windows and
//! then runs one decision pass. While settled in a column the pass only
//! nudges the rate between its supported neighbors; when the accumulated
//! success/failure budget of the column is spent, a search cycle proposes
//! alternative columns one at a time, measuring each against the last
//! known throughput of the active configuration. Whichever side of the
//! comparison wins becomes the active table; the loser slot is recycled
//! for the next proposal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::columns::{self, ColumnId};
use crate::config::RateScaleConfig;
use crate::constants::{POWER_WINDOW_COUNT, RATE_COUNT};
use crate::error::RateScaleError;
use crate::rates::{Antenna, Band, LinkMode, Rate, adjacent_rates};
use crate::station::{
    HardwareCapabilities, ScaleState, StationCapabilities, StationRateState,
};
use crate::table_builder::build_rate_table;
use crate::throughput::{TptTable, expected_tpt_table};
use crate::time::Clock;
use crate::traits::LinkController;
use crate::txpower;
use crate::types::{RateWord, StationId, Tid};

/// Maximum retries the hardware reports for a single frame.
const MAX_REPORTED_RETRIES: u32 = 15;

/// Outcome report for one transmitted frame or aggregate.
#[derive(Debug, Clone, Copy)]
pub struct TxStatus {
    /// Hardware encoding of the rate the first attempt used.
    pub initial_rate: RateWord,
    /// Traffic identifier of the frame, when QoS-tagged.
    pub tid: Option<Tid>,
    /// Transmission attempts: frames in an aggregate, tries otherwise.
    pub attempts: u32,
    /// Acknowledged attempts.
    pub successes: u32,
    /// The report covers an aggregate.
    pub aggregated: bool,
}

/// Rate move decided by one within-column evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScaleAction {
    Stay,
    Downscale,
    Upscale,
}

/// The adaptive rate and transmit-power selection engine.
///
/// One engine serves one radio. Stations register at association and are
/// keyed by [`StationId`]; their states are fully independent. All calls
/// for a given station must be serialized by the host — the engine never
/// blocks and never calls back synchronously into anything but the
/// fire-and-forget [`LinkController`].
#[derive(Debug)]
pub struct RateScaleEngine {
    config: RateScaleConfig,
    hw: HardwareCapabilities,
    clock: Arc<dyn Clock>,
    link: Arc<dyn LinkController>,
    stations: HashMap<StationId, StationRateState>,
}

impl RateScaleEngine {
    /// Creates an engine for a radio with the given capabilities.
    ///
    /// # Errors
    /// - [`RateScaleError::Config`] - the configuration fails validation
    pub fn new(
        config: RateScaleConfig,
        hw: HardwareCapabilities,
        clock: Arc<dyn Clock>,
        link: Arc<dyn LinkController>,
    ) -> Result<Self, RateScaleError> {
        config.validate()?;
        Ok(Self {
            config,
            hw,
            clock,
            link,
            stations: HashMap::new(),
        })
    }

    /// Registers a peer and programs its initial rate table.
    ///
    /// The starting rate comes from the per-band RSSI lookup, so any chain
    /// RSSI already reported for this station (it survives
    /// re-association) sharpens the guess; without one the station starts
    /// at the bottom of the legacy ladder.
    pub fn on_peer_associated(
        &mut self,
        id: StationId,
        caps: StationCapabilities,
        band: Band,
    ) {
        let now = self.clock.now();
        let Self {
            stations,
            config,
            hw,
            link,
            ..
        } = self;

        let mut state = StationRateState::new(caps, band, hw, config, now);
        if let Some(previous) = stations.remove(&id) {
            state.chains = previous.chains;
            state.chain_signal = previous.chain_signal;
        }

        debug!("station {id}: rate scale init on band {band:?}");
        initialize_link(config, hw, link.as_ref(), id, &mut state);
        stations.insert(id, state);
    }

    /// Drops all state for a departed peer.
    ///
    /// # Errors
    /// - [`RateScaleError::StationNotFound`] - the peer was never registered
    pub fn on_peer_removed(&mut self, id: StationId) -> Result<(), RateScaleError> {
        self.stations
            .remove(&id)
            .map(|_| ())
            .ok_or(RateScaleError::StationNotFound(id))
    }

    /// Re-initializes a peer whose link configuration changed, tearing
    /// down any aggregation sessions first.
    ///
    /// # Errors
    /// - [`RateScaleError::StationNotFound`] - the peer was never registered
    pub fn on_link_config_changed(
        &mut self,
        id: StationId,
        caps: StationCapabilities,
        band: Band,
    ) -> Result<(), RateScaleError> {
        let now = self.clock.now();
        let Self {
            stations,
            config,
            hw,
            link,
            ..
        } = self;
        let state = stations
            .get_mut(&id)
            .ok_or(RateScaleError::StationNotFound(id))?;

        stop_active_aggregation(link.as_ref(), id, state);
        reinit_station(config, hw, link.as_ref(), id, state, caps, band, now);
        Ok(())
    }

    /// Records the per-chain RSSI of a received frame. Feeds only the
    /// initial-rate heuristic; no decision is made here.
    ///
    /// # Errors
    /// - [`RateScaleError::StationNotFound`] - the peer was never registered
    pub fn on_rx_rssi_update(
        &mut self,
        id: StationId,
        chains: Antenna,
        chain_signal: [i8; 3],
    ) -> Result<(), RateScaleError> {
        let state = self
            .stations
            .get_mut(&id)
            .ok_or(RateScaleError::StationNotFound(id))?;
        state.update_rssi(chains, chain_signal);
        Ok(())
    }

    /// Records the host-reported aggregation state of a TID.
    ///
    /// # Errors
    /// - [`RateScaleError::StationNotFound`] - the peer was never registered
    pub fn on_aggregation_state_changed(
        &mut self,
        id: StationId,
        tid: Tid,
        active: bool,
    ) -> Result<(), RateScaleError> {
        let state = self
            .stations
            .get_mut(&id)
            .ok_or(RateScaleError::StationNotFound(id))?;
        if active {
            state.agg_active_tids |= tid.bit();
        } else {
            state.agg_active_tids &= !tid.bit();
        }
        Ok(())
    }

    /// Consumes one transmission-status event and runs a decision pass.
    ///
    /// Events whose initial rate does not match the head of the programmed
    /// retry chain are dropped; enough consecutive mismatches force a
    /// re-push of the current table instead. A long transmit silence
    /// re-initializes the station before anything else.
    ///
    /// # Errors
    /// - [`RateScaleError::StationNotFound`] - the peer was never registered
    pub fn on_tx_status(
        &mut self,
        id: StationId,
        status: &TxStatus,
    ) -> Result<(), RateScaleError> {
        let now = self.clock.now();
        let Self {
            stations,
            config,
            hw,
            link,
            ..
        } = self;
        let state = stations
            .get_mut(&id)
            .ok_or(RateScaleError::StationNotFound(id))?;
        tx_status(config, hw, link.as_ref(), id, state, status, now);
        Ok(())
    }

    /// The rate currently chosen for a station, if it is registered.
    pub fn current_rate(&self, id: StationId) -> Option<Rate> {
        self.stations
            .get(&id)
            .map(|state| state.tables[state.active_tbl].rate)
    }

    /// Number of registered stations.
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }
}

/// Requests teardown of every aggregation session the host has reported.
fn stop_active_aggregation(link: &dyn LinkController, id: StationId, state: &StationRateState) {
    for tid in 0..Tid::COUNT {
        let tid = Tid::new(tid);
        if state.agg_active_tids & tid.bit() != 0 {
            link.request_aggregation_stop(id, tid);
        }
    }
}

/// Rebuilds a station's state from fresh capabilities, keeping only the
/// RSSI heuristic input, then programs its initial table.
fn reinit_station(
    config: &RateScaleConfig,
    hw: &HardwareCapabilities,
    link: &dyn LinkController,
    id: StationId,
    state: &mut StationRateState,
    caps: StationCapabilities,
    band: Band,
    now: Instant,
) {
    let chains = state.chains;
    let chain_signal = state.chain_signal;

    *state = StationRateState::new(caps, band, hw, config, now);
    state.chains = chains;
    state.chain_signal = chain_signal;

    initialize_link(config, hw, link, id, state);
}

/// Programs the working table with the RSSI-guided starting rate.
fn initialize_link(
    config: &RateScaleConfig,
    hw: &HardwareCapabilities,
    link: &dyn LinkController,
    id: StationId,
    state: &mut StationRateState,
) {
    let tbl_idx = state.working_tbl();
    let rate = state.initial_rate(hw);
    state.last_rate_idx = rate.index;

    let column = if rate.ant == Antenna::A {
        ColumnId::LegacyAntA
    } else {
        ColumnId::LegacyAntB
    };
    state.tables[tbl_idx].rate = rate;
    state.tables[tbl_idx].column = Some(column);
    set_expected_tpt(state, tbl_idx);

    state.lq = build_rate_table(state, hw, config, &rate);
    link.program_rate_table(id, &state.lq);
}

/// Points a table slot at the throughput row matching its configuration.
fn set_expected_tpt(state: &mut StationRateState, tbl_idx: usize) {
    let tbl = &state.tables[tbl_idx];
    let Some(col_id) = tbl.column else {
        debug_assert!(false, "expected tpt requested for an unused slot");
        return;
    };
    let col = columns::column(col_id);
    state.tables[tbl_idx].expected_tpt =
        expected_tpt_table(col.mode, tbl.rate.bw, col.sgi, state.is_agg);
}

/// Ingests one status event: idle detection, rate matching, window
/// bookkeeping, then the decision pass.
fn tx_status(
    config: &RateScaleConfig,
    hw: &HardwareCapabilities,
    link: &dyn LinkController,
    id: StationId,
    state: &mut StationRateState,
    status: &TxStatus,
    now: Instant,
) {
    // A long quiet period invalidates all history: tear down aggregation
    // and restart from the RSSI guess instead of trusting a stale event.
    if now.duration_since(state.last_tx) > config.idle_timeout {
        debug!("station {id}: tx idle for too long, re-initializing");
        stop_active_aggregation(link, id, state);
        let caps = state.caps.clone();
        let band = state.band;
        reinit_station(config, hw, link, id, state, caps, band, now);
        return;
    }
    state.last_tx = now;

    let reported = match Rate::from_word(status.initial_rate, state.band) {
        Ok(rate) => rate,
        Err(err) => {
            state.invalid_events += 1;
            debug!("station {id}: dropping status event: {err}");
            return;
        }
    };

    // Stragglers transmitted before the last table push carry the old
    // rate; they are not evidence about the current table. A long run of
    // them means hardware never took the push, so push again.
    if status.initial_rate != state.lq.chain[0] {
        state.missed_rate_events += 1;
        debug!(
            "station {id}: initial rate {} does not match programmed {}",
            status.initial_rate, state.lq.chain[0]
        );
        if state.missed_rate_events > config.max_missed_rate_events {
            state.missed_rate_events = 0;
            debug!("station {id}: too many rate mismatches, re-syncing table");
            link.program_rate_table(id, &state.lq);
        }
        return;
    }
    state.missed_rate_events = 0;

    let active_idx = state.active_tbl;
    let other_of = |idx: usize| 1 - idx;

    let curr_idx = if reported.same_column(&state.tables[active_idx].rate) {
        Some(active_idx)
    } else if reported.same_column(&state.tables[other_of(active_idx)].rate) {
        Some(other_of(active_idx))
    } else {
        None
    };

    let Some(curr_idx) = curr_idx else {
        // Neither table owns this rate: skip collection, but force a
        // search so the tables converge back onto what hardware is doing.
        debug!("station {id}: neither active nor search table matches tx rate");
        stay_in_table(config, state, true, now);
        rate_scale_perform(config, hw, link, id, state, status.tid, now);
        return;
    };
    let other_idx = other_of(curr_idx);

    let reduced_power = state.lq.reduced_power_level;

    if status.aggregated {
        // Aggregates ride entirely on the chain's first rate.
        collect_tx_data(
            config,
            state,
            curr_idx,
            reported.index,
            status.attempts,
            status.successes,
            reduced_power,
        );

        if state.state == ScaleState::StayInColumn {
            state.total_success += status.successes;
            state.total_failed += status.attempts.saturating_sub(status.successes);
        }
    } else {
        // Single frames walk the retry chain: one attempt per entry, the
        // acknowledgment crediting the final one. Entries from columns
        // other than the two tables are stale and ignored.
        let retries = status.attempts.saturating_sub(1).min(MAX_REPORTED_RETRIES);
        let acked = status.successes > 0;

        for attempt in 0..=retries {
            let Ok(rate) = Rate::from_word(state.lq.chain[attempt as usize], state.band) else {
                continue;
            };
            let tbl_idx = if rate.same_column(&state.tables[curr_idx].rate) {
                curr_idx
            } else if rate.same_column(&state.tables[other_idx].rate) {
                other_idx
            } else {
                continue;
            };
            let success = u32::from(attempt == retries && acked);
            collect_tx_data(config, state, tbl_idx, rate.index, 1, success, reduced_power);
        }

        if state.state == ScaleState::StayInColumn {
            state.total_success += u32::from(acked);
            state.total_failed += retries + u32::from(!acked);
        }
    }

    rate_scale_perform(config, hw, link, id, state, status.tid, now);
}

/// Folds a batch of outcomes into a rate window and the power window of
/// the active reduction level.
fn collect_tx_data(
    config: &RateScaleConfig,
    state: &mut StationRateState,
    tbl_idx: usize,
    scale_index: u8,
    attempts: u32,
    successes: u32,
    reduced_power: u8,
) {
    if scale_index as usize >= RATE_COUNT {
        debug_assert!(false, "scale index {scale_index} outside catalog");
        return;
    }

    let expected = state.tables[tbl_idx].expected_tpt[scale_index as usize];
    state.tables[tbl_idx].win[scale_index as usize].record(attempts, successes, expected, config);

    let level = (reduced_power as usize).min(POWER_WINDOW_COUNT - 1);
    state.tables[tbl_idx].power_win[level].record(attempts, successes, expected, config);
}

/// Checks whether the stay-in-column period is over and a search may
/// begin; also ages out stale statistics while staying.
fn stay_in_table(config: &RateScaleConfig, state: &mut StationRateState, force: bool, now: Instant) {
    if state.state != ScaleState::StayInColumn {
        return;
    }

    let flush_passed = state
        .flush_time
        .is_some_and(|start| now.duration_since(start) > config.stay_in_column_timeout);

    if force
        || state.total_failed > state.max_failure_limit
        || state.total_success > state.max_success_limit
        || (!state.search_better_tbl && state.flush_time.is_some() && flush_passed)
    {
        debug!(
            "stay expired: failed {} success {} flush {}",
            state.total_failed, state.total_success, flush_passed
        );

        state.state = ScaleState::SearchCycleStarted;
        state.total_failed = 0;
        state.total_success = 0;
        state.flush_time = None;
        state.visited_columns = state.tables[state.active_tbl]
            .column
            .map_or(0, |col| col.bit());
    } else {
        state.table_count += 1;
        if state.table_count >= state.table_count_limit {
            state.table_count = 0;
            debug!("staying in column, aging out window stats");
            let active = state.active_tbl;
            state.tables[active].clear_windows();
        }
    }

    // The active table becomes the baseline the search measures against;
    // its history must restart clean.
    if state.state == ScaleState::SearchCycleStarted {
        let active = state.active_tbl;
        state.tables[active].clear_windows();
    }
}

/// Enters stay-in-column with budgets sized for the final column's family.
/// Legacy rates move coarsely, so their budgets are smaller and searches
/// come sooner.
fn set_stay_in_table(config: &RateScaleConfig, state: &mut StationRateState, legacy: bool, now: Instant) {
    debug!("moving to stay-in-column");
    state.state = ScaleState::StayInColumn;
    if legacy {
        state.table_count_limit = config.legacy_table_count_limit;
        state.max_failure_limit = config.legacy_failure_limit;
        state.max_success_limit = config.legacy_success_limit;
    } else {
        state.table_count_limit = config.non_legacy_table_count_limit;
        state.max_failure_limit = config.non_legacy_failure_limit;
        state.max_success_limit = config.non_legacy_success_limit;
    }
    state.table_count = 0;
    state.total_failed = 0;
    state.total_success = 0;
    state.flush_time = Some(now);
    state.visited_columns = 0;
}

/// Rebuilds the retry chain starting at `rate` and pushes it.
fn update_rate_table(
    config: &RateScaleConfig,
    hw: &HardwareCapabilities,
    link: &dyn LinkController,
    id: StationId,
    state: &mut StationRateState,
    rate: &Rate,
) {
    state.lq = build_rate_table(state, hw, config, rate);
    link.program_rate_table(id, &state.lq);
}

/// Prepares the search slot for a different column.
///
/// The slot inherits the active configuration, takes the column's antenna,
/// guard interval, and modulation, and — when the modulation family
/// actually changes — looks for the cheapest rate in the new family
/// expected to beat current performance. Without such a rate the switch
/// is abandoned and the slot nullified.
fn switch_to_column(
    config: &RateScaleConfig,
    state: &mut StationRateState,
    col_id: ColumnId,
) -> Result<(), ()> {
    let active_idx = state.active_tbl;
    let search_idx = 1 - active_idx;
    let col = columns::column(col_id);
    let current_mode = state.tables[active_idx].column.map(|c| columns::column(c).mode);

    let [first, second] = &mut state.tables;
    let (active, search) = if active_idx == 0 {
        (&*first, second)
    } else {
        (&*second, first)
    };
    search.copy_meta_from(active);

    let mut rate = search.rate;
    rate.sgi = col.sgi;
    rate.ant = col.ant;
    rate.mode = col.mode.link_mode(state.is_vht, state.band);
    rate.bw = state.caps.bandwidth;
    rate.ldpc = state.ldpc;
    let rate_mask = state.supported_rates(rate.mode);

    state.tables[search_idx].rate = rate;
    state.tables[search_idx].column = Some(col_id);
    set_expected_tpt(state, search_idx);

    state.visited_columns |= col_id.bit();

    // Same family means the rate index stays meaningful; otherwise find
    // the best entry point into the new family's ladder.
    if current_mode != Some(col.mode) {
        let start = best_starting_rate(config, state, search_idx, rate_mask, rate.index);
        match start {
            Some(idx) if rate_mask & (1 << idx) != 0 => {
                state.tables[search_idx].rate.index = idx;
            }
            _ => {
                debug!("cannot switch to column {col_id:?}: no rate beats the target");
                state.tables[search_idx].rate.mode = LinkMode::None;
                return Err(());
            }
        }
    }

    debug!(
        "switched to column {col_id:?} at index {}",
        state.tables[search_idx].rate.index
    );
    Ok(())
}

/// Lowest rate of the search table's family expected to outperform the
/// active configuration.
///
/// The target is optimistic (the active rate's full expected throughput)
/// while the active success ratio is healthy, and the actually measured
/// throughput otherwise.
fn best_starting_rate(
    config: &RateScaleConfig,
    state: &StationRateState,
    search_idx: usize,
    rate_mask: u16,
    index: u8,
) -> Option<u8> {
    let active = &state.tables[state.active_tbl];
    let success_ratio = active.win[index as usize].success_ratio();
    let expected_current = active.expected_tpt[index as usize] as u32;
    let tpt_tbl: &TptTable = state.tables[search_idx].expected_tpt;
    let mode = state.tables[search_idx].rate.mode;

    let target = if success_ratio.is_some_and(|sr| sr > config.sr_no_decrease) {
        debug!("healthy ratio, aim above expected current {expected_current}");
        100 * expected_current
    } else {
        debug!("shaky ratio, aim above measured {}", state.last_tpt);
        state.last_tpt
    };

    let mut candidate = (rate_mask != 0).then(|| rate_mask.trailing_zeros() as u8);
    while let Some(idx) = candidate {
        if target < 100 * tpt_tbl[idx as usize] as u32 {
            break;
        }
        let (_, higher) = adjacent_rates(idx, rate_mask, mode);
        candidate = higher;
    }

    candidate
}

/// The within-column decision ladder: compare the current rate's measured
/// throughput with its supported neighbors and pick a move.
#[allow(clippy::too_many_arguments)]
fn decide_scale_action(
    config: &RateScaleConfig,
    expected_tpt: &TptTable,
    success_ratio: Option<u32>,
    low: Option<u8>,
    high: Option<u8>,
    current_tpt: Option<u32>,
    low_tpt: Option<u32>,
    high_tpt: Option<u32>,
) -> ScaleAction {
    let Some(current) = current_tpt else {
        return ScaleAction::Stay;
    };

    if success_ratio.is_some_and(|sr| sr <= config.sr_force_decrease) || current == 0 {
        debug!("decrease rate because of low success ratio");
        return ScaleAction::Downscale;
    }

    if low_tpt.is_none() && high_tpt.is_none() && high.is_some() {
        debug!("no data about neighbors, increase rate");
        return ScaleAction::Upscale;
    }

    if high_tpt.is_none()
        && high.is_some()
        && low_tpt.is_some_and(|tpt| tpt < current)
    {
        debug!("no data about higher rate and lower is worse, increase rate");
        return ScaleAction::Upscale;
    }

    if high_tpt.is_some_and(|tpt| tpt > current) {
        debug!("higher rate measures better, increase rate");
        return ScaleAction::Upscale;
    }

    let mut action = ScaleAction::Stay;

    if low_tpt.is_some_and(|l| l < current) && high_tpt.is_some_and(|h| h < current) {
        debug!("both neighbors worse, maintain rate");
        return ScaleAction::Stay;
    }

    if low_tpt.is_some_and(|tpt| tpt > current) {
        debug!("lower rate measures better, decrease rate");
        action = ScaleAction::Downscale;
    } else if low_tpt.is_none() && low.is_some() {
        debug!("no data about lower rate, decrease rate");
        action = ScaleAction::Downscale;
    }

    // A decrease is withdrawn while the link holds up, or when even the
    // lower rate's theoretical ceiling cannot match current throughput.
    if action == ScaleAction::Downscale {
        if let Some(lower) = low {
            if success_ratio.is_some_and(|sr| sr >= config.sr_no_decrease) {
                debug!("ratio above no-decrease ceiling, avoid downscale");
                action = ScaleAction::Stay;
            } else if current > 100 * expected_tpt[lower as usize] as u32 {
                debug!("current beats the lower rate's ceiling, avoid downscale");
                action = ScaleAction::Stay;
            }
        }
    }

    action
}

/// One decision pass: settle a pending search, otherwise adjust the rate
/// within the column, then drive the search state machine.
fn rate_scale_perform(
    config: &RateScaleConfig,
    hw: &HardwareCapabilities,
    link: &dyn LinkController,
    id: StationId,
    state: &mut StationRateState,
    tid: Option<Tid>,
    now: Instant,
) {
    let prev_agg = state.is_agg;
    state.is_agg = tid.is_some_and(|t| {
        state.caps.agg_enabled_tids & t.bit() != 0 && state.agg_active_tids & t.bit() != 0
    });

    let mut tbl_idx = state.working_tbl();

    if prev_agg != state.is_agg {
        debug!(
            "aggregation changed from {prev_agg} to {}, switching throughput model",
            state.is_agg
        );
        set_expected_tpt(state, tbl_idx);
        state.tables[tbl_idx].clear_windows();
    }

    let mut index = state.last_rate_idx;
    let rate_mask = state.supported_rates(state.tables[tbl_idx].rate.mode);

    if rate_mask & (1 << index) == 0 {
        debug!("station {id}: current rate is not in the support mask");
        if state.search_better_tbl {
            // Abandon the broken search table and re-push the active one.
            state.tables[tbl_idx].rate.mode = LinkMode::None;
            state.tables[tbl_idx].column = None;
            state.search_better_tbl = false;
            let active = state.active_tbl;
            let rate = state.tables[active].rate;
            update_rate_table(config, hw, link, id, state, &rate);
        }
        return;
    }

    let window = &state.tables[tbl_idx].win[index as usize];
    let fail_count = window.failures();
    if fail_count < config.min_failures_to_estimate
        && window.successes() < config.min_successes_to_estimate
    {
        debug!(
            "({:?}: {index}) test window: success {} total {}",
            state.tables[tbl_idx].rate.mode,
            window.successes(),
            window.attempts()
        );
        state.tables[tbl_idx].win[index as usize].invalidate_average();
        stay_in_table(config, state, false, now);
        state.last_rate_idx = index;
        return;
    }

    let expected = state.tables[tbl_idx].expected_tpt[index as usize];
    state.tables[tbl_idx].win[index as usize].refresh_average(expected, config);

    let mut update_lq = false;
    let mut done_search = false;
    let current_tpt;

    if state.search_better_tbl {
        let measured = state.tables[tbl_idx].win[index as usize]
            .average_tpt()
            .unwrap_or(0);

        if measured > state.last_tpt {
            debug!(
                "search table wins: measured {measured} previous {}",
                state.last_tpt
            );
            // The search slot becomes the active table.
            state.active_tbl = tbl_idx;
            current_tpt = measured;
        } else {
            debug!(
                "search table loses: measured {measured} previous {}",
                state.last_tpt
            );
            state.tables[tbl_idx].rate.mode = LinkMode::None;
            state.tables[tbl_idx].column = None;
            tbl_idx = state.active_tbl;
            index = state.tables[tbl_idx].rate.index;
            current_tpt = state.last_tpt;
            update_lq = true;
        }

        state.search_better_tbl = false;
        done_search = true;
    } else {
        let mode = state.tables[tbl_idx].rate.mode;
        let (low, high) = adjacent_rates(index, rate_mask, mode);

        let window = &state.tables[tbl_idx].win[index as usize];
        let success_ratio = window.success_ratio();
        let measured = window.average_tpt();
        let low_tpt = low.and_then(|l| state.tables[tbl_idx].win[l as usize].average_tpt());
        let high_tpt = high.and_then(|h| state.tables[tbl_idx].win[h as usize].average_tpt());

        debug!(
            "({mode:?}: {index}): tpt {measured:?} sr {success_ratio:?} low {low:?} high {high:?} low_tpt {low_tpt:?} high_tpt {high_tpt:?}"
        );

        let action = decide_scale_action(
            config,
            state.tables[tbl_idx].expected_tpt,
            success_ratio,
            low,
            high,
            measured,
            low_tpt,
            high_tpt,
        );

        current_tpt = measured.unwrap_or(0);

        if mode.is_mimo2() && !hw.coex_mimo_allowed {
            // Coexistence pulled the rug from under dual-stream: search
            // for a new configuration right away.
            debug!("coexistence forbids dual-stream, forcing search");
            stay_in_table(config, state, true, now);
        } else {
            match action {
                ScaleAction::Downscale => {
                    if let Some(lower) = low {
                        update_lq = true;
                        index = lower;
                    } else {
                        debug!("already at the bottom rate");
                    }
                }
                ScaleAction::Upscale => {
                    if let Some(higher) = high {
                        update_lq = true;
                        index = higher;
                    } else {
                        debug!("already at the top rate");
                    }
                }
                ScaleAction::Stay => {
                    if state.state == ScaleState::StayInColumn {
                        update_lq = txpower::power_scale_perform(state, hw, config, tbl_idx);
                    }
                }
            }
        }
    }

    if update_lq {
        state.tables[tbl_idx].rate.index = index;
        let rate = state.tables[tbl_idx].rate;
        update_rate_table(config, hw, link, id, state, &rate);
    }

    stay_in_table(config, state, false, now);

    // Propose the next column while a search cycle is open and nothing
    // else changed the table this pass.
    if !update_lq
        && !done_search
        && state.state == ScaleState::SearchCycleStarted
        && state.tables[tbl_idx].win[index as usize].attempts() > 0
    {
        state.last_tpt = current_tpt;

        let tbl_rate = state.tables[tbl_idx].rate;
        if let Some(current_column) = state.tables[tbl_idx].column {
            match columns::next_column(state, hw, current_column, &tbl_rate) {
                Some(next) => {
                    if switch_to_column(config, state, next).is_ok() {
                        state.search_better_tbl = true;
                    }
                }
                None => {
                    debug!("no more columns to explore, search cycle ended");
                    state.state = ScaleState::SearchCycleEnded;
                }
            }
        }

        if state.search_better_tbl {
            let search_idx = 1 - state.active_tbl;
            state.tables[search_idx].clear_windows();
            index = state.tables[search_idx].rate.index;
            let rate = state.tables[search_idx].rate;
            debug!("programming search table: {rate:?}");
            update_rate_table(config, hw, link, id, state, &rate);
        } else {
            done_search = true;
        }
    }

    if done_search && state.state == ScaleState::SearchCycleEnded {
        let active_rate = state.tables[state.active_tbl].rate;
        if active_rate.mode.is_legacy() {
            // No high-throughput alternative was viable; settle in legacy
            // and drop aggregation, it cannot pay off here.
            debug!("station {id}: staying in legacy table");
            if let Some(tid) = tid {
                if state.agg_active_tids & tid.bit() != 0 {
                    debug!("station {id}: stopping aggregation on {tid}");
                    link.request_aggregation_stop(id, tid);
                }
            }
            set_stay_in_table(config, state, true, now);
        } else {
            if state.last_tpt > config.agg_tpt_threshold {
                if let Some(tid) = tid {
                    if state.caps.agg_enabled_tids & tid.bit() != 0
                        && state.agg_active_tids & tid.bit() == 0
                    {
                        debug!("station {id}: requesting aggregation on {tid}");
                        link.request_aggregation_start(id, tid);
                    }
                }
            }
            set_stay_in_table(config, state, false, now);
        }
    }

    state.last_rate_idx = index;
}

//! Retry-chain construction.
//!
//! Expands one chosen rate into the full fallback sequence programmed into
//! hardware. The chain descends in three segments: the initial column, the
//! column reached by one downgrade (dual-stream to single-stream,
//! single-stream to legacy), and finally an all-legacy fill. A column that
//! runs out of lower rates mid-segment repeats its bottom rate for the
//! remaining retries instead of underflowing.
//!
//! For a dual-stream/80 MHz/SGI start the result looks like:
//!
//! ```text
//! chain[0..2]  VHT MCS9 NSS2 SGI      (two tries per rate)
//! chain[2..6]  VHT MCS8, MCS7 NSS2 SGI
//! chain[6..9]  VHT MCS7..MCS5 NSS1    (one try each, downgraded column)
//! chain[9..]   legacy 36M downwards, antenna toggling every step
//! ```

use crate::config::RateScaleConfig;
use crate::constants::{
    HT_VHT_RETRIES_PER_RATE, INITIAL_MIMO_CHAIN_RATES, INITIAL_SISO_CHAIN_RATES,
    LEGACY_RETRIES_PER_RATE, MAX_RETRY_CHAIN_LEN, SECONDARY_SISO_CHAIN_RATES,
    SECONDARY_SISO_RETRIES,
};
use crate::rates::{Antenna, Rate};
use crate::station::{HardwareCapabilities, StationRateState};
use crate::traits::RateTableCmd;
use crate::types::RateWord;

/// Fills chain slots from one column, stepping down the rate ladder and
/// optionally toggling the antenna after every rate.
///
/// On return `rate` holds the last rate emitted (or the column's bottom),
/// positioned for the caller to downgrade into the next column.
fn fill_column_rates(
    state: &StationRateState,
    rate: &mut Rate,
    chain: &mut [RateWord; MAX_RETRY_CHAIN_LEN],
    index: &mut usize,
    num_rates: usize,
    num_retries: usize,
    valid_ant: Antenna,
    toggle_ant: bool,
) {
    let mut bottom_reached = false;
    let mut prev_index = rate.index;

    let mut emitted = 0;
    while emitted < num_rates && *index < MAX_RETRY_CHAIN_LEN {
        let word = rate.to_word();
        let mut retry = 0;
        while retry < num_retries && *index < MAX_RETRY_CHAIN_LEN {
            chain[*index] = word;
            *index += 1;
            retry += 1;
        }

        if toggle_ant {
            rate.toggle_antenna(valid_ant);
        }

        prev_index = rate.index;
        bottom_reached = rate.step_down_in_column(state.supported_rates(rate.mode));
        if bottom_reached && !rate.mode.is_legacy() {
            break;
        }

        emitted += 1;
    }

    if !bottom_reached {
        rate.index = prev_index;
    }
}

/// Builds the hardware command for a station starting at `initial_rate`.
///
/// Every emitted rate is drawn from the station's support masks; the chain
/// never exceeds [`MAX_RETRY_CHAIN_LEN`] slots. Aggregation limits and the
/// current power reduction ride along with the chain.
pub(crate) fn build_rate_table(
    state: &StationRateState,
    hw: &HardwareCapabilities,
    config: &RateScaleConfig,
    initial_rate: &Rate,
) -> RateTableCmd {
    let mut cmd = RateTableCmd {
        single_stream_ant: state.lq.single_stream_ant,
        dual_stream_ant: state.lq.dual_stream_ant,
        agg_time_limit_usec: config.agg_time_limit_usec,
        agg_frame_limit: config.agg_frame_limit,
        agg_disable_start: config.agg_disable_start,
        reduced_power_level: state.lq.reduced_power_level,
        ..Default::default()
    };

    if initial_rate.ant.count() == 1 {
        cmd.single_stream_ant = initial_rate.ant;
    }

    let valid_ant = hw.valid_tx_ant;
    let mut rate = *initial_rate;
    let mut index = 0;

    // Primary segment: the chosen column itself.
    let (num_rates, num_retries, toggle_ant) = if rate.mode.is_siso() {
        (INITIAL_SISO_CHAIN_RATES, HT_VHT_RETRIES_PER_RATE, false)
    } else if rate.mode.is_mimo2() {
        (INITIAL_MIMO_CHAIN_RATES, HT_VHT_RETRIES_PER_RATE, false)
    } else {
        (MAX_RETRY_CHAIN_LEN, LEGACY_RETRIES_PER_RATE, true)
    };
    fill_column_rates(
        state,
        &mut rate,
        &mut cmd.chain,
        &mut index,
        num_rates,
        num_retries,
        valid_ant,
        toggle_ant,
    );

    // Secondary segment: one column down.
    state.downgrade_column(hw, &mut rate);

    let (num_rates, num_retries) = if rate.mode.is_siso() {
        cmd.mimo_delim = index as u8;
        (SECONDARY_SISO_CHAIN_RATES, SECONDARY_SISO_RETRIES)
    } else {
        debug_assert!(rate.mode.is_legacy(), "downgrade left mode {:?}", rate.mode);
        (MAX_RETRY_CHAIN_LEN, LEGACY_RETRIES_PER_RATE)
    };
    fill_column_rates(
        state,
        &mut rate,
        &mut cmd.chain,
        &mut index,
        num_rates,
        num_retries,
        valid_ant,
        true,
    );

    // Tertiary segment: whatever space is left goes to legacy.
    state.downgrade_column(hw, &mut rate);
    fill_column_rates(
        state,
        &mut rate,
        &mut cmd.chain,
        &mut index,
        MAX_RETRY_CHAIN_LEN,
        LEGACY_RETRIES_PER_RATE,
        valid_ant,
        true,
    );

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{
        Band, Bandwidth, LinkMode, RATE_54M_IDX, RATE_MCS_9_IDX,
    };
    use crate::station::{StationCapabilities, VhtMcsSupport};
    use std::time::Instant;

    fn hw() -> HardwareCapabilities {
        HardwareCapabilities {
            valid_tx_ant: Antenna::AB,
            ldpc: true,
            coex_mimo_allowed: true,
            coex_tpc_allowed: true,
        }
    }

    fn legacy_station() -> StationRateState {
        StationRateState::new(
            StationCapabilities::legacy_only(),
            Band::TwoGhz,
            &hw(),
            &RateScaleConfig::default(),
            Instant::now(),
        )
    }

    fn vht_station() -> StationRateState {
        let mut caps = StationCapabilities::legacy_only();
        caps.legacy_rates = 0x0FF0; // OFDM only
        caps.ht_supported = true;
        caps.vht_supported = true;
        caps.vht_mcs_per_nss = [VhtMcsSupport::Mcs0To9, VhtMcsSupport::Mcs0To9];
        caps.rx_nss = 2;
        caps.bandwidth = Bandwidth::Mhz80;
        caps.sgi_80 = true;
        StationRateState::new(caps, Band::FiveGhz, &hw(), &RateScaleConfig::default(), Instant::now())
    }

    fn decode_chain(cmd: &RateTableCmd, band: Band) -> Vec<Rate> {
        cmd.chain
            .iter()
            .map(|w| Rate::from_word(*w, band).unwrap())
            .collect()
    }

    #[test]
    fn legacy_chain_descends_and_toggles() {
        let state = legacy_station();
        let initial = Rate {
            mode: LinkMode::LegacyG,
            index: RATE_54M_IDX,
            ant: Antenna::A,
            bw: Bandwidth::Mhz20,
            sgi: false,
            ldpc: false,
        };
        let cmd = build_rate_table(&state, &hw(), &RateScaleConfig::default(), &initial);
        let rates = decode_chain(&cmd, Band::TwoGhz);

        assert_eq!(rates[0].index, RATE_54M_IDX);
        assert_eq!(rates[0].ant, Antenna::A);
        // Antenna alternates every step in legacy chains.
        assert_eq!(rates[1].ant, Antenna::B);
        assert_eq!(rates[2].ant, Antenna::A);
        // Monotonically non-increasing rate ladder.
        for pair in rates.windows(2) {
            assert!(pair[1].index <= pair[0].index);
        }
        // Every slot supported by the station.
        for rate in &rates {
            assert!(state.active_legacy_rate & (1 << rate.index) != 0);
        }
    }

    #[test]
    fn chain_bottom_repeats_lowest_rate() {
        let state = legacy_station();
        let initial = Rate {
            mode: LinkMode::LegacyG,
            index: crate::rates::RATE_2M_IDX,
            ant: Antenna::A,
            bw: Bandwidth::Mhz20,
            sgi: false,
            ldpc: false,
        };
        let cmd = build_rate_table(&state, &hw(), &RateScaleConfig::default(), &initial);
        let rates = decode_chain(&cmd, Band::TwoGhz);

        // 2M then 1M, then the bottom repeats to the end of the chain.
        assert_eq!(rates[0].index, crate::rates::RATE_2M_IDX);
        for rate in &rates[1..] {
            assert_eq!(rate.index, crate::rates::RATE_1M_IDX);
        }
    }

    #[test]
    fn mimo_chain_has_three_segments() {
        let state = vht_station();
        let initial = Rate {
            mode: LinkMode::VhtMimo2,
            index: RATE_MCS_9_IDX,
            ant: Antenna::AB,
            bw: Bandwidth::Mhz80,
            sgi: true,
            ldpc: true,
        };
        let cmd = build_rate_table(&state, &hw(), &RateScaleConfig::default(), &initial);
        let rates = decode_chain(&cmd, Band::FiveGhz);

        // Dual-stream prefix: three rates, two tries each.
        for slot in 0..6 {
            assert_eq!(rates[slot].mode, LinkMode::VhtMimo2, "slot {slot}");
        }
        assert_eq!(rates[0].index, rates[1].index);
        assert!(rates[2].index < rates[0].index);
        assert_eq!(cmd.mimo_delim, 6);

        // Single-stream middle segment keeps the MCS ladder going.
        for slot in 6..9 {
            assert_eq!(rates[slot].mode, LinkMode::VhtSiso, "slot {slot}");
            assert_eq!(rates[slot].ant.count(), 1);
        }

        // Legacy tail.
        for slot in 9..MAX_RETRY_CHAIN_LEN {
            assert_eq!(rates[slot].mode, LinkMode::LegacyA, "slot {slot}");
            assert!(!rates[slot].sgi);
        }
    }

    #[test]
    fn single_antenna_start_pins_single_stream_mask() {
        let state = legacy_station();
        let initial = Rate {
            mode: LinkMode::LegacyG,
            index: RATE_54M_IDX,
            ant: Antenna::B,
            bw: Bandwidth::Mhz20,
            sgi: false,
            ldpc: false,
        };
        let cmd = build_rate_table(&state, &hw(), &RateScaleConfig::default(), &initial);
        assert_eq!(cmd.single_stream_ant, Antenna::B);
    }

    #[test]
    fn command_carries_aggregation_and_power_metadata() {
        let mut state = legacy_station();
        state.lq.reduced_power_level = 6;
        let config = RateScaleConfig::default();
        let initial = Rate {
            mode: LinkMode::LegacyG,
            index: RATE_54M_IDX,
            ant: Antenna::A,
            bw: Bandwidth::Mhz20,
            sgi: false,
            ldpc: false,
        };
        let cmd = build_rate_table(&state, &hw(), &config, &initial);

        assert_eq!(cmd.agg_frame_limit, config.agg_frame_limit);
        assert_eq!(cmd.agg_time_limit_usec, config.agg_time_limit_usec);
        assert_eq!(cmd.agg_disable_start, config.agg_disable_start);
        assert_eq!(cmd.reduced_power_level, 6);
    }
}

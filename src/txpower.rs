//! Transmit-power adaptation.
//!
//! An independent control loop that probes whether the link sustains its
//! throughput at reduced transmit power. Reduction levels step by a fixed
//! amount between 0 (full power) and a configured maximum; each level has
//! its own measurement window in the scale table. The loop only runs while
//! the engine is settled in a column, and only on a handful of probe rates
//! per modulation family, so the data it acts on is comparable.

use crate::config::RateScaleConfig;
use crate::rates::{LinkMode, RATE_54M_IDX, RATE_MCS_7_IDX, RATE_MCS_9_IDX, Rate};
use crate::station::{HardwareCapabilities, StationRateState};

/// Outcome of one power evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PowerAction {
    Stay,
    /// Reduce power further (step to the weaker level).
    Decrease,
    /// Restore some power (step to the stronger level).
    Increase,
    /// Drop every restriction and return to full power.
    NoRestriction,
}

/// Neighboring reduction levels of `current`, bounded by 0 and the
/// configured maximum. `None` marks the edge of the range.
pub(crate) fn adjacent_power_levels(current: u8, config: &RateScaleConfig) -> (Option<u8>, Option<u8>) {
    let weaker = current + config.power_step;
    let weaker = (weaker <= config.max_power_reduction).then_some(weaker);

    let stronger = current.checked_sub(config.power_step);

    (weaker, stronger)
}

/// Whether power adaptation may run at all for this rate.
///
/// Adaptation needs the peer in power save or an explicit coexistence
/// permission, and only ever probes the top of each modulation family:
/// the highest legacy rate, HT MCS 7, or VHT MCS 7..=9. Other rates keep
/// full power so the rate loop sees an unclouded channel.
pub(crate) fn power_adaptation_allowed(
    state: &StationRateState,
    hw: &HardwareCapabilities,
    rate: &Rate,
) -> bool {
    if !state.caps.power_save_enabled && !hw.coex_tpc_allowed {
        return false;
    }

    match rate.mode {
        LinkMode::LegacyA | LinkMode::LegacyG => rate.index == RATE_54M_IDX,
        LinkMode::HtSiso | LinkMode::HtMimo2 => rate.index == RATE_MCS_7_IDX,
        LinkMode::VhtSiso | LinkMode::VhtMimo2 => {
            (RATE_MCS_7_IDX..=RATE_MCS_9_IDX).contains(&rate.index)
        }
        LinkMode::None => false,
    }
}

/// Decides the power move from the current and neighboring level windows.
///
/// An absent neighbor measurement behaves as "worse than anything
/// measured" on the comparisons that probe downwards, which is what makes
/// the loop explore weaker levels before trusting them.
pub(crate) fn decide_power_action(
    config: &RateScaleConfig,
    sr: Option<u32>,
    weak: Option<u8>,
    strong: Option<u8>,
    current_tpt: Option<u32>,
    weak_tpt: Option<u32>,
    strong_tpt: Option<u32>,
) -> PowerAction {
    // Stay until the current level has a throughput estimate.
    let Some(current) = current_tpt else {
        log::trace!("no current power tpt, stay");
        return PowerAction::Stay;
    };

    // Struggling link: lift every restriction.
    if sr.is_none_or(|s| s <= config.power_sr_force_increase) || current == 0 {
        log::debug!("weak success ratio, remove all power reduction");
        return PowerAction::NoRestriction;
    }

    // Try decreasing first if applicable.
    if weak.is_some() {
        if weak_tpt.is_none() && (strong_tpt.is_none() || strong_tpt.is_some_and(|s| current >= s))
        {
            log::debug!("weaker level unmeasured, probe it");
            return PowerAction::Decrease;
        }

        if weak_tpt.is_some_and(|w| w > current) {
            log::debug!("weaker level measures better, decrease power");
            return PowerAction::Decrease;
        }
    }

    // Next, increase if needed.
    if sr.is_some_and(|s| s < config.power_sr_no_increase) && strong.is_some() {
        if weak_tpt.is_none() && strong_tpt.is_some_and(|s| current < s) {
            log::debug!("stronger level measures better, increase power");
            return PowerAction::Increase;
        }

        // An unmeasured weaker level counts as worse here.
        if weak_tpt.is_none_or(|w| w < current)
            && strong_tpt.is_none_or(|s| s > current)
        {
            log::debug!("weaker level measures worse, increase power");
            return PowerAction::Increase;
        }
    }

    PowerAction::Stay
}

/// Runs one power evaluation against the given table slot.
///
/// # Returns
/// True when the reduction level changed and the table must be re-pushed.
pub(crate) fn power_scale_perform(
    state: &mut StationRateState,
    hw: &HardwareCapabilities,
    config: &RateScaleConfig,
    tbl_idx: usize,
) -> bool {
    let current = state.lq.reduced_power_level;
    let rate = state.tables[tbl_idx].rate;

    if !power_adaptation_allowed(state, hw, &rate) {
        log::trace!("power adaptation not allowed, removing restrictions");
        state.lq.reduced_power_level = 0;
        return current != 0;
    }

    let (weak, strong) = adjacent_power_levels(current, config);

    let windows = &state.tables[tbl_idx].power_win;
    let sr = windows[current as usize].success_ratio();
    let current_tpt = windows[current as usize].average_tpt();
    let weak_tpt = weak.and_then(|lvl| windows[lvl as usize].average_tpt());
    let strong_tpt = strong.and_then(|lvl| windows[lvl as usize].average_tpt());

    log::debug!(
        "power level {current}: tpt {current_tpt:?} sr {sr:?} weak {weak:?}/{weak_tpt:?} strong {strong:?}/{strong_tpt:?}"
    );

    let mut action =
        decide_power_action(config, sr, weak, strong, current_tpt, weak_tpt, strong_tpt);

    // Clamp at the edges of the reduction range.
    if weak.is_none() && action == PowerAction::Decrease {
        action = PowerAction::Stay;
    } else if strong.is_none()
        && matches!(action, PowerAction::Increase | PowerAction::NoRestriction)
    {
        action = PowerAction::Stay;
    }

    match action {
        PowerAction::Decrease => {
            if let Some(weak) = weak {
                state.lq.reduced_power_level = weak;
                return true;
            }
            false
        }
        PowerAction::Increase => {
            if let Some(strong) = strong {
                state.lq.reduced_power_level = strong;
                return true;
            }
            false
        }
        PowerAction::NoRestriction => {
            state.lq.reduced_power_level = 0;
            true
        }
        PowerAction::Stay => false,
    }
}

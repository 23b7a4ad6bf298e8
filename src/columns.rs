//! The column registry and the next-column search.
//!
//! A column is one combination of modulation family, antenna set, and
//! guard interval. The registry is a fixed table: each column lists the
//! columns worth trying after it, in preference order, plus the
//! admissibility checks that decide whether the peer and the radio can use
//! it at all. The search cycle walks these candidate lists, so the legal
//! transitions of the whole engine are encoded right here.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_NEXT_COLUMNS;
use crate::rates::{Antenna, Band, Bandwidth, LinkMode, Rate};
use crate::station::{HardwareCapabilities, StationCapabilities, StationRateState};
use crate::throughput::expected_tpt_table;

/// Modulation family of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnMode {
    Legacy,
    Siso,
    Mimo2,
}

impl ColumnMode {
    /// Concrete link mode for a station on the given band.
    pub(crate) fn link_mode(self, is_vht: bool, band: Band) -> LinkMode {
        match self {
            ColumnMode::Legacy => LinkMode::legacy_for(band),
            ColumnMode::Siso if is_vht => LinkMode::VhtSiso,
            ColumnMode::Siso => LinkMode::HtSiso,
            ColumnMode::Mimo2 if is_vht => LinkMode::VhtMimo2,
            ColumnMode::Mimo2 => LinkMode::HtMimo2,
        }
    }
}

/// Identifier of one column in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColumnId {
    LegacyAntA = 0,
    LegacyAntB = 1,
    SisoAntA = 2,
    SisoAntB = 3,
    SisoAntASgi = 4,
    SisoAntBSgi = 5,
    Mimo2 = 6,
    Mimo2Sgi = 7,
}

impl ColumnId {
    /// Bit of this column inside a visited-set bitmask.
    #[inline]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Admissibility predicate: can this peer/radio use a candidate column,
/// judged against the currently configured rate.
pub(crate) type ColumnCheck =
    fn(&StationCapabilities, &HardwareCapabilities, &Rate) -> bool;

/// One registry entry.
pub(crate) struct TxColumn {
    pub mode: ColumnMode,
    pub ant: Antenna,
    pub sgi: bool,
    /// Candidate successors, in preference order.
    pub next_columns: [Option<ColumnId>; MAX_NEXT_COLUMNS],
    pub checks: &'static [ColumnCheck],
}

fn siso_allowed(caps: &StationCapabilities, _hw: &HardwareCapabilities, _rate: &Rate) -> bool {
    caps.ht_supported
}

fn mimo_allowed(caps: &StationCapabilities, hw: &HardwareCapabilities, _rate: &Rate) -> bool {
    if !caps.ht_supported {
        return false;
    }
    // A peer pinned to one chain cannot receive two streams.
    if caps.static_smps {
        return false;
    }
    if hw.valid_tx_ant.count() < 2 {
        return false;
    }
    hw.coex_mimo_allowed
}

fn sgi_allowed(caps: &StationCapabilities, _hw: &HardwareCapabilities, rate: &Rate) -> bool {
    match rate.bw {
        Bandwidth::Mhz20 => caps.sgi_20,
        Bandwidth::Mhz40 => caps.sgi_40,
        Bandwidth::Mhz80 => caps.sgi_80,
    }
}

use ColumnId::*;

static COLUMNS: [TxColumn; 8] = [
    // LegacyAntA
    TxColumn {
        mode: ColumnMode::Legacy,
        ant: Antenna::A,
        sgi: false,
        next_columns: [
            Some(LegacyAntB),
            Some(SisoAntA),
            Some(Mimo2),
            None,
            None,
            None,
            None,
        ],
        checks: &[],
    },
    // LegacyAntB
    TxColumn {
        mode: ColumnMode::Legacy,
        ant: Antenna::B,
        sgi: false,
        next_columns: [
            Some(LegacyAntA),
            Some(SisoAntB),
            Some(Mimo2),
            None,
            None,
            None,
            None,
        ],
        checks: &[],
    },
    // SisoAntA
    TxColumn {
        mode: ColumnMode::Siso,
        ant: Antenna::A,
        sgi: false,
        next_columns: [
            Some(SisoAntB),
            Some(Mimo2),
            Some(SisoAntASgi),
            Some(LegacyAntA),
            Some(LegacyAntB),
            None,
            None,
        ],
        checks: &[siso_allowed],
    },
    // SisoAntB
    TxColumn {
        mode: ColumnMode::Siso,
        ant: Antenna::B,
        sgi: false,
        next_columns: [
            Some(SisoAntA),
            Some(Mimo2),
            Some(SisoAntBSgi),
            Some(LegacyAntA),
            Some(LegacyAntB),
            None,
            None,
        ],
        checks: &[siso_allowed],
    },
    // SisoAntASgi
    TxColumn {
        mode: ColumnMode::Siso,
        ant: Antenna::A,
        sgi: true,
        next_columns: [
            Some(SisoAntBSgi),
            Some(Mimo2Sgi),
            Some(SisoAntA),
            Some(LegacyAntA),
            Some(LegacyAntB),
            None,
            None,
        ],
        checks: &[siso_allowed, sgi_allowed],
    },
    // SisoAntBSgi
    TxColumn {
        mode: ColumnMode::Siso,
        ant: Antenna::B,
        sgi: true,
        next_columns: [
            Some(SisoAntASgi),
            Some(Mimo2Sgi),
            Some(SisoAntB),
            Some(LegacyAntA),
            Some(LegacyAntB),
            None,
            None,
        ],
        checks: &[siso_allowed, sgi_allowed],
    },
    // Mimo2
    TxColumn {
        mode: ColumnMode::Mimo2,
        ant: Antenna::AB,
        sgi: false,
        next_columns: [
            Some(SisoAntA),
            Some(Mimo2Sgi),
            Some(LegacyAntA),
            Some(LegacyAntB),
            None,
            None,
            None,
        ],
        checks: &[mimo_allowed],
    },
    // Mimo2Sgi
    TxColumn {
        mode: ColumnMode::Mimo2,
        ant: Antenna::AB,
        sgi: true,
        next_columns: [
            Some(SisoAntASgi),
            Some(Mimo2),
            Some(LegacyAntA),
            Some(LegacyAntB),
            None,
            None,
            None,
        ],
        checks: &[mimo_allowed, sgi_allowed],
    },
];

/// Registry entry for a column.
pub(crate) fn column(id: ColumnId) -> &'static TxColumn {
    &COLUMNS[id as usize]
}

/// Proposes the next column worth measuring, or `None` when every
/// candidate of the current column has been visited, is inadmissible, or
/// cannot beat the currently measured throughput even at its ceiling rate.
///
/// One pass over the candidate list; the visited mask makes revisits
/// impossible even though the column graph is cyclic.
pub(crate) fn next_column(
    state: &StationRateState,
    hw: &HardwareCapabilities,
    current: ColumnId,
    current_rate: &Rate,
) -> Option<ColumnId> {
    for candidate in column(current).next_columns.iter().flatten() {
        if state.visited_columns & candidate.bit() != 0 {
            log::trace!("skip visited column {candidate:?}");
            continue;
        }

        let next = column(*candidate);

        if !next.ant.supported_by(hw.valid_tx_ant) {
            log::trace!(
                "skip column {candidate:?}: ant {:?} unsupported by chip",
                next.ant
            );
            continue;
        }

        if !next
            .checks
            .iter()
            .all(|check| check(&state.caps, hw, current_rate))
        {
            log::trace!("skip column {candidate:?}: admissibility check failed");
            continue;
        }

        let Some(max_rate) = state.max_allowed_rate(next.mode) else {
            continue;
        };

        let tpt = state.last_tpt / 100;
        let tpt_tbl = expected_tpt_table(next.mode, state.caps.bandwidth, next.sgi, state.is_agg);
        let max_expected = tpt_tbl[max_rate as usize] as u32;
        if tpt >= max_expected {
            log::trace!(
                "skip column {candidate:?}: max expected {max_expected} cannot beat current {tpt}"
            );
            continue;
        }

        log::debug!("found potential column {candidate:?}, max expected {max_expected}");
        return Some(*candidate);
    }

    None
}

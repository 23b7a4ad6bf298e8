//! The physical-rate catalog and the hardware rate-word codec.
//!
//! Fifteen catalog entries cover the legacy CCK and OFDM ladders plus the
//! MCS 7/8/9 extensions reachable only with HT/VHT modulation. Each entry
//! carries the PLCP codes for every modulation it can be transmitted with
//! and its neighbors in the legacy ordering, where CCK and OFDM rates
//! interleave. Rate ordering inside HT/VHT columns is positional, so those
//! entries need no explicit links.

use serde::{Deserialize, Serialize};

use crate::constants::{
    RATE_ANT_MSK, RATE_ANT_POS, RATE_BW_MSK, RATE_BW_POS, RATE_CCK_MSK, RATE_CODE_MSK,
    RATE_COUNT, RATE_HT_MCS_CODE_MSK, RATE_HT_MSK, RATE_HT_NSS_MSK, RATE_HT_NSS_POS,
    RATE_LDPC_MSK, RATE_SGI_MSK, RATE_VHT_MCS_CODE_MSK, RATE_VHT_MSK, RATE_VHT_NSS_MSK,
    RATE_VHT_NSS_POS,
};
use crate::error::RateScaleError;
use crate::types::RateWord;

// Catalog indices. CCK first, then OFDM with the MCS extensions on top.
pub const RATE_1M_IDX: u8 = 0;
pub const RATE_2M_IDX: u8 = 1;
pub const RATE_5M_IDX: u8 = 2;
pub const RATE_11M_IDX: u8 = 3;
pub const RATE_6M_IDX: u8 = 4;
pub const RATE_9M_IDX: u8 = 5;
pub const RATE_12M_IDX: u8 = 6;
pub const RATE_18M_IDX: u8 = 7;
pub const RATE_24M_IDX: u8 = 8;
pub const RATE_36M_IDX: u8 = 9;
pub const RATE_48M_IDX: u8 = 10;
pub const RATE_54M_IDX: u8 = 11;
pub const RATE_MCS_7_IDX: u8 = 12;
pub const RATE_MCS_8_IDX: u8 = 13;
pub const RATE_MCS_9_IDX: u8 = 14;

/// First CCK catalog index.
pub const FIRST_CCK_RATE: u8 = RATE_1M_IDX;
/// Last CCK catalog index.
pub const LAST_CCK_RATE: u8 = RATE_11M_IDX;
/// First OFDM catalog index; also where MCS 0 lands.
pub const FIRST_OFDM_RATE: u8 = RATE_6M_IDX;
/// First index reachable with HT modulation (MCS 0).
pub const FIRST_HT_RATE: u8 = RATE_6M_IDX;
/// Last index reachable with HT modulation (MCS 7).
pub const LAST_HT_RATE: u8 = RATE_MCS_7_IDX;
/// Last index reachable with VHT modulation (MCS 9).
pub const LAST_VHT_RATE: u8 = RATE_MCS_9_IDX;

const PLCP_INVALID: u8 = 0xFF;

/// One catalog entry: PLCP codes per modulation and legacy-ladder links.
struct RateInfo {
    plcp: u8,
    plcp_ht_siso: u8,
    plcp_ht_mimo2: u8,
    plcp_vht_siso: u8,
    plcp_vht_mimo2: u8,
    prev: Option<u8>,
    next: Option<u8>,
}

const fn rate(
    plcp: u8,
    plcp_ht_siso: u8,
    plcp_ht_mimo2: u8,
    plcp_vht_siso: u8,
    plcp_vht_mimo2: u8,
    prev: Option<u8>,
    next: Option<u8>,
) -> RateInfo {
    RateInfo {
        plcp,
        plcp_ht_siso,
        plcp_ht_mimo2,
        plcp_vht_siso,
        plcp_vht_mimo2,
        prev,
        next,
    }
}

/// The catalog. Legacy prev/next links express the interleaved CCK/OFDM
/// ladder of the 2.4 GHz band; the 5 GHz walk skips CCK via the support
/// mask instead.
#[rustfmt::skip]
const RATES: [RateInfo; RATE_COUNT] = [
    /*  1M */ rate( 10, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, None, Some(RATE_2M_IDX)),
    /*  2M */ rate( 20, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, Some(RATE_1M_IDX), Some(RATE_5M_IDX)),
    /* 5.5M */ rate( 55, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, Some(RATE_2M_IDX), Some(RATE_11M_IDX)),
    /* 11M */ rate(110, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, Some(RATE_9M_IDX), Some(RATE_12M_IDX)),
    /*  6M */ rate( 13, 0x0, 0x8, 0x0, 0x10, Some(RATE_5M_IDX), Some(RATE_11M_IDX)),
    /*  9M */ rate( 15, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, Some(RATE_6M_IDX), Some(RATE_11M_IDX)),
    /* 12M */ rate(  5, 0x1, 0x9, 0x1, 0x11, Some(RATE_11M_IDX), Some(RATE_18M_IDX)),
    /* 18M */ rate(  7, 0x2, 0xA, 0x2, 0x12, Some(RATE_12M_IDX), Some(RATE_24M_IDX)),
    /* 24M */ rate(  9, 0x3, 0xB, 0x3, 0x13, Some(RATE_18M_IDX), Some(RATE_36M_IDX)),
    /* 36M */ rate( 11, 0x4, 0xC, 0x4, 0x14, Some(RATE_24M_IDX), Some(RATE_48M_IDX)),
    /* 48M */ rate(  1, 0x5, 0xD, 0x5, 0x15, Some(RATE_36M_IDX), Some(RATE_54M_IDX)),
    /* 54M */ rate(  3, 0x6, 0xE, 0x6, 0x16, Some(RATE_48M_IDX), None),
    /* MCS7 */ rate(PLCP_INVALID, 0x7, 0xF, 0x7, 0x17, None, None),
    /* MCS8 */ rate(PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, 0x8, 0x18, None, None),
    /* MCS9 */ rate(PLCP_INVALID, PLCP_INVALID, PLCP_INVALID, 0x9, 0x19, None, None),
];

/// Radio band the link operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    /// 2.4 GHz: CCK and OFDM legacy rates.
    TwoGhz,
    /// 5 GHz: OFDM legacy rates only.
    FiveGhz,
}

/// Channel width of a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bandwidth {
    Mhz20,
    Mhz40,
    Mhz80,
}

impl Bandwidth {
    const fn bits(self) -> u32 {
        match self {
            Bandwidth::Mhz20 => 0,
            Bandwidth::Mhz40 => 1,
            Bandwidth::Mhz80 => 2,
        }
    }

    const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Bandwidth::Mhz20),
            1 => Some(Bandwidth::Mhz40),
            2 => Some(Bandwidth::Mhz80),
            _ => None,
        }
    }
}

/// A set of transmit chains, at most three (A, B, C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Antenna(u8);

impl Antenna {
    pub const NONE: Antenna = Antenna(0b000);
    pub const A: Antenna = Antenna(0b001);
    pub const B: Antenna = Antenna(0b010);
    pub const AB: Antenna = Antenna(0b011);
    pub const C: Antenna = Antenna(0b100);
    pub const AC: Antenna = Antenna(0b101);
    pub const BC: Antenna = Antenna(0b110);
    pub const ABC: Antenna = Antenna(0b111);

    // Single-antenna rotation: A -> B -> C -> A; pairs rotate likewise.
    const TOGGLE: [u8; 8] = [0b000, 0b010, 0b100, 0b110, 0b001, 0b011, 0b101, 0b111];

    /// Builds an antenna set from a raw chain bitmask (extra bits dropped).
    #[inline]
    pub const fn from_mask(mask: u8) -> Self {
        Antenna(mask & 0b111)
    }

    /// Raw chain bitmask.
    #[inline]
    pub const fn mask(self) -> u8 {
        self.0
    }

    /// Number of chains in the set.
    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Lowest-numbered chain in the set, or `NONE` when empty.
    #[inline]
    pub const fn first(self) -> Antenna {
        Antenna(self.0 & self.0.wrapping_neg())
    }

    /// True when every chain of `self` is present in `valid`.
    #[inline]
    pub const fn supported_by(self, valid: Antenna) -> bool {
        self.0 & valid.0 == self.0
    }

    /// Next antenna set in the rotation order.
    #[inline]
    pub const fn toggled(self) -> Antenna {
        Antenna(Self::TOGGLE[self.0 as usize])
    }
}

/// Modulation family of a rate, fixing which PLCP code set and which
/// support mask apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkMode {
    /// Placeholder for a nullified table slot; never transmitted.
    None,
    /// Legacy OFDM on the 5 GHz band.
    LegacyA,
    /// Legacy CCK/OFDM on the 2.4 GHz band.
    LegacyG,
    HtSiso,
    HtMimo2,
    VhtSiso,
    VhtMimo2,
}

impl LinkMode {
    #[inline]
    pub const fn is_legacy(self) -> bool {
        matches!(self, LinkMode::LegacyA | LinkMode::LegacyG)
    }

    #[inline]
    pub const fn is_ht(self) -> bool {
        matches!(self, LinkMode::HtSiso | LinkMode::HtMimo2)
    }

    #[inline]
    pub const fn is_vht(self) -> bool {
        matches!(self, LinkMode::VhtSiso | LinkMode::VhtMimo2)
    }

    #[inline]
    pub const fn is_siso(self) -> bool {
        matches!(self, LinkMode::HtSiso | LinkMode::VhtSiso)
    }

    #[inline]
    pub const fn is_mimo2(self) -> bool {
        matches!(self, LinkMode::HtMimo2 | LinkMode::VhtMimo2)
    }

    /// Legacy ordering walks literally on the 5 GHz band (no CCK holes).
    #[inline]
    pub const fn is_a_band(self) -> bool {
        matches!(self, LinkMode::LegacyA)
    }

    /// Legacy mode for the given band.
    #[inline]
    pub const fn legacy_for(band: Band) -> LinkMode {
        match band {
            Band::TwoGhz => LinkMode::LegacyG,
            Band::FiveGhz => LinkMode::LegacyA,
        }
    }
}

/// One concrete transmit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub mode: LinkMode,
    /// Catalog index.
    pub index: u8,
    pub ant: Antenna,
    pub bw: Bandwidth,
    pub sgi: bool,
    pub ldpc: bool,
}

impl Rate {
    /// True when both rates live in the same column (modulation family,
    /// antenna set, and guard interval all match).
    #[inline]
    pub fn same_column(&self, other: &Rate) -> bool {
        self.mode == other.mode && self.ant == other.ant && self.sgi == other.sgi
    }

    /// Packs this rate into its hardware word.
    ///
    /// An index with no PLCP code for the current modulation is clamped to
    /// the top of that modulation's range, matching what the hardware would
    /// accept; internal callers never construct such a rate.
    pub fn to_word(&self) -> RateWord {
        let mut word = ((self.ant.mask() as u32) << RATE_ANT_POS) & RATE_ANT_MSK;

        if self.mode.is_legacy() {
            let info = &RATES[self.index as usize];
            word |= info.plcp as u32;
            if self.index >= FIRST_CCK_RATE && self.index <= LAST_CCK_RATE {
                word |= RATE_CCK_MSK;
            }
            return RateWord::new(word);
        }

        let index = match self.mode {
            LinkMode::HtSiso | LinkMode::HtMimo2 => self.index.clamp(FIRST_HT_RATE, LAST_HT_RATE),
            _ => self.index.clamp(FIRST_HT_RATE, LAST_VHT_RATE),
        };
        debug_assert_eq!(index, self.index, "rate index outside modulation range");
        let info = &RATES[index as usize];

        match self.mode {
            LinkMode::HtSiso => word |= RATE_HT_MSK | info.plcp_ht_siso as u32,
            LinkMode::HtMimo2 => word |= RATE_HT_MSK | info.plcp_ht_mimo2 as u32,
            LinkMode::VhtSiso => word |= RATE_VHT_MSK | info.plcp_vht_siso as u32,
            LinkMode::VhtMimo2 => word |= RATE_VHT_MSK | info.plcp_vht_mimo2 as u32,
            _ => debug_assert!(false, "unencodable link mode {:?}", self.mode),
        }

        word |= self.bw.bits() << RATE_BW_POS;
        if self.sgi {
            word |= RATE_SGI_MSK;
        }
        if self.ldpc {
            word |= RATE_LDPC_MSK;
        }

        RateWord::new(word)
    }

    /// Unpacks a hardware rate word reported for the given band.
    ///
    /// # Errors
    /// - [`RateScaleError::MalformedRateWord`] - no catalog entry matches
    ///   the word's rate code, stream count, or channel width
    pub fn from_word(word: RateWord, band: Band) -> Result<Rate, RateScaleError> {
        let index = catalog_index_of(word).ok_or(RateScaleError::MalformedRateWord(word))?;
        let ant = Antenna::from_mask(((word.value() & RATE_ANT_MSK) >> RATE_ANT_POS) as u8);

        if !word.has(RATE_HT_MSK) && !word.has(RATE_VHT_MSK) {
            // Legacy transmissions use one chain; anything else leaves the
            // mode unset so no table will claim the event.
            let mode = if ant.count() == 1 {
                LinkMode::legacy_for(band)
            } else {
                LinkMode::None
            };
            return Ok(Rate {
                mode,
                index,
                ant,
                bw: Bandwidth::Mhz20,
                sgi: false,
                ldpc: false,
            });
        }

        let bw = Bandwidth::from_bits((word.value() & RATE_BW_MSK) >> RATE_BW_POS)
            .ok_or(RateScaleError::MalformedRateWord(word))?;
        let sgi = word.has(RATE_SGI_MSK);
        let ldpc = word.has(RATE_LDPC_MSK);

        let mode = if word.has(RATE_HT_MSK) {
            let nss = ((word.value() & RATE_HT_NSS_MSK) >> RATE_HT_NSS_POS) + 1;
            match nss {
                1 => LinkMode::HtSiso,
                2 => LinkMode::HtMimo2,
                _ => return Err(RateScaleError::MalformedRateWord(word)),
            }
        } else {
            let nss = ((word.value() & RATE_VHT_NSS_MSK) >> RATE_VHT_NSS_POS) + 1;
            match nss {
                1 => LinkMode::VhtSiso,
                2 => LinkMode::VhtMimo2,
                _ => return Err(RateScaleError::MalformedRateWord(word)),
            }
        };

        Ok(Rate {
            mode,
            index,
            ant,
            bw,
            sgi,
            ldpc,
        })
    }

    /// Rotates to the next valid antenna set, returning false when no other
    /// set inside `valid` exists.
    pub fn toggle_antenna(&mut self, valid: Antenna) -> bool {
        if self.ant == Antenna::NONE || !self.ant.supported_by(valid) {
            return false;
        }

        let mut next = self.ant.toggled();
        while next != self.ant && !next.supported_by(valid) {
            next = next.toggled();
        }

        if next == self.ant {
            return false;
        }

        self.ant = next;
        true
    }

    /// Steps to the next lower supported rate in the current column.
    /// Returns true when the bottom of the column had already been reached.
    pub(crate) fn step_down_in_column(&mut self, mask: u16) -> bool {
        let (low, _) = adjacent_rates(self.index, mask, self.mode);
        match low {
            Some(idx) => {
                self.index = idx;
                false
            }
            None => true,
        }
    }
}

/// Catalog index a rate word refers to, independent of antenna or width.
fn catalog_index_of(word: RateWord) -> Option<u8> {
    if word.has(RATE_HT_MSK) {
        let mut idx = (word.value() & RATE_HT_MCS_CODE_MSK) as u8 + FIRST_HT_RATE;
        // The catalog keeps 9M between MCS 0 and MCS 1; skip over it.
        if idx >= RATE_9M_IDX {
            idx += 1;
        }
        (FIRST_HT_RATE..=LAST_HT_RATE).contains(&idx).then_some(idx)
    } else if word.has(RATE_VHT_MSK) {
        let mut idx = (word.value() & RATE_VHT_MCS_CODE_MSK) as u8 + FIRST_HT_RATE;
        if idx >= RATE_9M_IDX {
            idx += 1;
        }
        (FIRST_HT_RATE..=LAST_VHT_RATE)
            .contains(&idx)
            .then_some(idx)
    } else {
        let plcp = (word.value() & RATE_CODE_MSK) as u8;
        RATES.iter().position(|r| r.plcp == plcp).map(|i| i as u8)
    }
}

/// Adjacent supported rates around `index` under `mask`.
///
/// 5 GHz legacy and all HT/VHT columns order rates by catalog position, so
/// the walk is a literal bit scan. The 2.4 GHz legacy ladder interleaves
/// CCK and OFDM and follows the catalog's prev/next links instead.
///
/// # Returns
/// `(lower, higher)`, either side `None` at the edge of the ladder.
pub(crate) fn adjacent_rates(index: u8, mask: u16, mode: LinkMode) -> (Option<u8>, Option<u8>) {
    if mode.is_a_band() || !mode.is_legacy() {
        let below = mask & ((1u16 << index) - 1);
        let low = (below != 0).then(|| 15 - below.leading_zeros() as u8);

        let above = mask >> (index + 1) << (index + 1);
        let high = (above != 0).then(|| above.trailing_zeros() as u8);

        return (low, high);
    }

    let mut low = None;
    let mut cursor = RATES[index as usize].prev;
    while let Some(idx) = cursor {
        if mask & (1 << idx) != 0 {
            low = Some(idx);
            break;
        }
        cursor = RATES[idx as usize].prev;
    }

    let mut high = None;
    let mut cursor = RATES[index as usize].next;
    while let Some(idx) = cursor {
        if mask & (1 << idx) != 0 {
            high = Some(idx);
            break;
        }
        cursor = RATES[idx as usize].next;
    }

    (low, high)
}

/// Legacy rate a given HT/VHT catalog index falls back to when a column
/// downgrade leaves the high-throughput ladder.
pub(crate) fn ht_to_legacy(index: u8) -> u8 {
    match index {
        RATE_6M_IDX => RATE_6M_IDX,
        RATE_12M_IDX => RATE_9M_IDX,
        RATE_18M_IDX => RATE_12M_IDX,
        RATE_24M_IDX => RATE_18M_IDX,
        RATE_36M_IDX => RATE_24M_IDX,
        RATE_48M_IDX => RATE_36M_IDX,
        RATE_54M_IDX => RATE_48M_IDX,
        RATE_MCS_7_IDX | RATE_MCS_8_IDX | RATE_MCS_9_IDX => RATE_54M_IDX,
        _ => {
            debug_assert!(false, "index {index} is not an HT/VHT rate");
            RATE_6M_IDX
        }
    }
}

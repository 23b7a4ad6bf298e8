//! Expected-throughput model.
//!
//! Static tables of the theoretical throughput achievable at every catalog
//! rate, per stream count, channel width, guard interval, and aggregation
//! state. Entries are in relative throughput units; zeros mark rates a
//! given configuration cannot transmit. The legacy table is the only one
//! with CCK entries, used on the 2.4 GHz band.

use crate::columns::ColumnMode;
use crate::constants::RATE_COUNT;
use crate::rates::Bandwidth;

/// One table row: expected throughput per catalog index.
pub type TptTable = [u16; RATE_COUNT];

/// Legacy rates have a single row; retries dominate, aggregation and guard
/// interval do not apply.
pub static EXPECTED_TPT_LEGACY: TptTable =
    [7, 13, 35, 58, 40, 57, 72, 98, 121, 154, 177, 186, 0, 0, 0];

// HT/VHT rows: [NGI, SGI, AGG+NGI, AGG+SGI].

#[rustfmt::skip]
static EXPECTED_TPT_SISO_20MHZ: [TptTable; 4] = [
    [0, 0, 0, 0, 42, 0,  76, 102, 124, 159, 183, 193, 202, 216, 0],
    [0, 0, 0, 0, 46, 0,  82, 110, 132, 168, 192, 202, 210, 225, 0],
    [0, 0, 0, 0, 49, 0,  97, 145, 192, 285, 375, 420, 464, 551, 0],
    [0, 0, 0, 0, 54, 0, 108, 160, 213, 315, 415, 465, 513, 608, 0],
];

#[rustfmt::skip]
static EXPECTED_TPT_SISO_40MHZ: [TptTable; 4] = [
    [0, 0, 0, 0,  77, 0, 127, 160, 184, 220, 242, 250,  257,  269,  275],
    [0, 0, 0, 0,  83, 0, 135, 169, 193, 229, 250, 257,  264,  275,  280],
    [0, 0, 0, 0, 101, 0, 199, 295, 389, 570, 744, 828,  911, 1070, 1173],
    [0, 0, 0, 0, 112, 0, 220, 326, 429, 629, 819, 912, 1000, 1173, 1284],
];

#[rustfmt::skip]
static EXPECTED_TPT_SISO_80MHZ: [TptTable; 4] = [
    [0, 0, 0, 0, 130, 0, 191, 223, 244,  273,  288,  294,  298,  305,  308],
    [0, 0, 0, 0, 138, 0, 200, 231, 251,  279,  293,  298,  302,  308,  312],
    [0, 0, 0, 0, 217, 0, 429, 634, 834, 1220, 1585, 1760, 1931, 2258, 2466],
    [0, 0, 0, 0, 241, 0, 475, 701, 921, 1343, 1741, 1931, 2117, 2468, 2691],
];

#[rustfmt::skip]
static EXPECTED_TPT_MIMO2_20MHZ: [TptTable; 4] = [
    [0, 0, 0, 0,  74, 0, 123, 155, 179, 213, 235, 243, 250,  261, 0],
    [0, 0, 0, 0,  81, 0, 131, 164, 187, 221, 242, 250, 256,  267, 0],
    [0, 0, 0, 0,  98, 0, 193, 286, 375, 550, 718, 799, 878, 1032, 0],
    [0, 0, 0, 0, 109, 0, 214, 316, 414, 607, 790, 879, 965, 1132, 0],
];

#[rustfmt::skip]
static EXPECTED_TPT_MIMO2_40MHZ: [TptTable; 4] = [
    [0, 0, 0, 0, 123, 0, 182, 214, 235,  264,  279,  285,  289,  296,  300],
    [0, 0, 0, 0, 131, 0, 191, 222, 242,  270,  284,  289,  293,  300,  303],
    [0, 0, 0, 0, 200, 0, 390, 571, 741, 1067, 1365, 1505, 1640, 1894, 2053],
    [0, 0, 0, 0, 221, 0, 430, 630, 816, 1169, 1490, 1641, 1784, 2053, 2221],
];

#[rustfmt::skip]
static EXPECTED_TPT_MIMO2_80MHZ: [TptTable; 4] = [
    [0, 0, 0, 0, 182, 0, 240,  264,  278,  299,  308,  311,  313,  317,  319],
    [0, 0, 0, 0, 190, 0, 247,  269,  282,  302,  310,  313,  315,  319,  320],
    [0, 0, 0, 0, 428, 0, 833, 1215, 1577, 2254, 2863, 3147, 3418, 3913, 4219],
    [0, 0, 0, 0, 474, 0, 920, 1338, 1732, 2464, 3116, 3418, 3705, 4225, 4545],
];

/// Selects the expected-throughput row for a column configuration.
pub fn expected_tpt_table(
    mode: ColumnMode,
    bw: Bandwidth,
    sgi: bool,
    aggregating: bool,
) -> &'static TptTable {
    let group = match (mode, bw) {
        (ColumnMode::Legacy, _) => return &EXPECTED_TPT_LEGACY,
        (ColumnMode::Siso, Bandwidth::Mhz20) => &EXPECTED_TPT_SISO_20MHZ,
        (ColumnMode::Siso, Bandwidth::Mhz40) => &EXPECTED_TPT_SISO_40MHZ,
        (ColumnMode::Siso, Bandwidth::Mhz80) => &EXPECTED_TPT_SISO_80MHZ,
        (ColumnMode::Mimo2, Bandwidth::Mhz20) => &EXPECTED_TPT_MIMO2_20MHZ,
        (ColumnMode::Mimo2, Bandwidth::Mhz40) => &EXPECTED_TPT_MIMO2_40MHZ,
        (ColumnMode::Mimo2, Bandwidth::Mhz80) => &EXPECTED_TPT_MIMO2_80MHZ,
    };

    match (sgi, aggregating) {
        (false, false) => &group[0],
        (true, false) => &group[1],
        (false, true) => &group[2],
        (true, true) => &group[3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{RATE_1M_IDX, RATE_6M_IDX, RATE_MCS_9_IDX, RATE_MCS_7_IDX};

    #[test]
    fn legacy_selected_regardless_of_width() {
        for bw in [Bandwidth::Mhz20, Bandwidth::Mhz40, Bandwidth::Mhz80] {
            let tbl = expected_tpt_table(ColumnMode::Legacy, bw, false, false);
            assert_eq!(tbl[RATE_1M_IDX as usize], 7);
        }
    }

    #[test]
    fn cck_entries_zero_outside_legacy() {
        let tbl = expected_tpt_table(ColumnMode::Siso, Bandwidth::Mhz20, false, false);
        for idx in 0..4 {
            assert_eq!(tbl[idx], 0);
        }
    }

    #[test]
    fn aggregation_rows_dominate_single_frame_rows() {
        for (mode, bw) in [
            (ColumnMode::Siso, Bandwidth::Mhz40),
            (ColumnMode::Mimo2, Bandwidth::Mhz80),
        ] {
            let plain = expected_tpt_table(mode, bw, false, false);
            let agg = expected_tpt_table(mode, bw, false, true);
            let idx = RATE_MCS_7_IDX as usize;
            assert!(agg[idx] > plain[idx]);
        }
    }

    #[test]
    fn sgi_rows_dominate_ngi_rows() {
        let ngi = expected_tpt_table(ColumnMode::Mimo2, Bandwidth::Mhz80, false, true);
        let sgi = expected_tpt_table(ColumnMode::Mimo2, Bandwidth::Mhz80, true, true);
        let idx = RATE_MCS_9_IDX as usize;
        assert!(sgi[idx] > ngi[idx]);
    }

    #[test]
    fn twenty_mhz_tables_have_no_mcs9_entry() {
        let tbl = expected_tpt_table(ColumnMode::Siso, Bandwidth::Mhz20, true, true);
        assert_eq!(tbl[RATE_MCS_9_IDX as usize], 0);
        assert!(tbl[RATE_6M_IDX as usize] > 0);
    }
}

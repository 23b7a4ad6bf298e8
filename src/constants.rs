//! Rate-word bit layout, catalog dimensions, and default tunables.
//!
//! Defines constants broadly applicable across the engine. Values that the
//! host may want to tune carry a `DEFAULT_` prefix and seed
//! [`crate::config::RateScaleConfig::default`]; the decision paths read the
//! config, never these directly.

// --- Hardware rate word bit layout ---

/// Mask for the legacy PLCP rate code (also covers HT/VHT MCS codes).
pub const RATE_CODE_MSK: u32 = 0xFF;
/// Flag marking an HT-modulated rate word.
pub const RATE_HT_MSK: u32 = 1 << 8;
/// Flag marking a CCK-modulated legacy rate word.
pub const RATE_CCK_MSK: u32 = 1 << 9;
/// Position of the 2-bit channel-width field.
pub const RATE_BW_POS: u32 = 11;
/// Mask of the 2-bit channel-width field.
pub const RATE_BW_MSK: u32 = 0b11 << RATE_BW_POS;
/// Flag selecting the short guard interval.
pub const RATE_SGI_MSK: u32 = 1 << 13;
/// Position of the 3-bit antenna field.
pub const RATE_ANT_POS: u32 = 14;
/// Mask of the 3-bit antenna field (chains A/B/C).
pub const RATE_ANT_MSK: u32 = 0b111 << RATE_ANT_POS;
/// Flag marking a VHT-modulated rate word.
pub const RATE_VHT_MSK: u32 = 1 << 26;
/// Flag requesting LDPC forward error correction.
pub const RATE_LDPC_MSK: u32 = 1 << 27;

/// Mask of the MCS code inside an HT rate code.
pub const RATE_HT_MCS_CODE_MSK: u32 = 0x7;
/// Position of the stream-count field inside an HT rate code.
pub const RATE_HT_NSS_POS: u32 = 3;
/// Mask of the stream-count field inside an HT rate code.
pub const RATE_HT_NSS_MSK: u32 = 0b11 << RATE_HT_NSS_POS;
/// Mask of the MCS code inside a VHT rate code.
pub const RATE_VHT_MCS_CODE_MSK: u32 = 0xF;
/// Position of the stream-count field inside a VHT rate code.
pub const RATE_VHT_NSS_POS: u32 = 4;
/// Mask of the stream-count field inside a VHT rate code.
pub const RATE_VHT_NSS_MSK: u32 = 0b11 << RATE_VHT_NSS_POS;

// --- Catalog dimensions ---

/// Number of entries in the rate catalog.
pub const RATE_COUNT: usize = 15;
/// Number of slots in a programmed retry chain.
pub const MAX_RETRY_CHAIN_LEN: usize = 16;
/// Maximum candidate successors per column.
pub const MAX_NEXT_COLUMNS: usize = 7;
/// Per-level power windows held by each scale table (levels 0..=15).
pub const POWER_WINDOW_COUNT: usize = 16;

// --- Retry chain shape ---

/// Rates filled from the initial column when it is single-stream.
pub const INITIAL_SISO_CHAIN_RATES: usize = 3;
/// Rates filled from the initial column when it is dual-stream.
pub const INITIAL_MIMO_CHAIN_RATES: usize = 3;
/// Rates filled from a single-stream column entered by downgrade.
pub const SECONDARY_SISO_CHAIN_RATES: usize = 3;
/// Retries per rate in a downgraded single-stream segment.
pub const SECONDARY_SISO_RETRIES: usize = 1;
/// Retries per rate in HT/VHT segments.
pub const HT_VHT_RETRIES_PER_RATE: usize = 2;
/// Retries per rate in legacy segments.
pub const LEGACY_RETRIES_PER_RATE: usize = 1;

// --- Default tunables: history window ---

/// Tx attempts remembered per rate (and per power level).
pub const DEFAULT_WINDOW_CAPACITY: u32 = 62;
/// Failures required before a throughput estimate is derived.
pub const DEFAULT_MIN_FAILURES_TO_ESTIMATE: u32 = 3;
/// Successes required before a throughput estimate is derived.
pub const DEFAULT_MIN_SUCCESSES_TO_ESTIMATE: u32 = 8;

// --- Default tunables: success-ratio thresholds (128-scaled percent) ---

/// Ratio at or below which the rate is force-decreased (15%).
pub const DEFAULT_SR_FORCE_DECREASE: u32 = 1920;
/// Ratio at or above which a decrease is suppressed (85%).
pub const DEFAULT_SR_NO_DECREASE: u32 = 10880;
/// Ratio at or below which power restriction is lifted entirely (75%).
pub const DEFAULT_POWER_SR_FORCE_INCREASE: u32 = 9600;
/// Ratio at or above which more power is never requested (85%).
pub const DEFAULT_POWER_SR_NO_INCREASE: u32 = 10880;

// --- Default tunables: column persistence ---

/// Evaluations before the stats of a legacy column are aged out.
pub const DEFAULT_LEGACY_TABLE_COUNT_LIMIT: u32 = 160;
/// Accumulated failures that end a legacy stay-in-column period.
pub const DEFAULT_LEGACY_FAILURE_LIMIT: u32 = 160;
/// Accumulated successes that end a legacy stay-in-column period.
pub const DEFAULT_LEGACY_SUCCESS_LIMIT: u32 = 480;
/// Evaluations before the stats of an HT/VHT column are aged out.
pub const DEFAULT_NON_LEGACY_TABLE_COUNT_LIMIT: u32 = 1500;
/// Accumulated failures that end an HT/VHT stay-in-column period.
pub const DEFAULT_NON_LEGACY_FAILURE_LIMIT: u32 = 400;
/// Accumulated successes that end an HT/VHT stay-in-column period.
pub const DEFAULT_NON_LEGACY_SUCCESS_LIMIT: u32 = 4500;

// --- Default tunables: timing and resync ---

/// Seconds in a column before a search is allowed on time alone.
pub const DEFAULT_STAY_IN_COLUMN_TIMEOUT_SECS: u64 = 5;
/// Seconds of tx silence after which the station is re-initialized.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5;
/// Consecutive mismatched status reports before the table is re-pushed.
pub const DEFAULT_MAX_MISSED_RATE_EVENTS: u32 = 15;

// --- Default tunables: transmit power ---

/// Power-reduction distance between adjacent probe levels.
pub const DEFAULT_POWER_STEP: u8 = 3;
/// Largest allowed power reduction.
pub const DEFAULT_MAX_POWER_REDUCTION: u8 = 15;

// --- Default tunables: aggregation ---

/// Measured throughput above which aggregation is requested.
pub const DEFAULT_AGG_TPT_THRESHOLD: u32 = 70;
/// Aggregate duration budget handed to hardware, in microseconds.
pub const DEFAULT_AGG_TIME_LIMIT_USEC: u16 = 4000;
/// Frames per aggregate handed to hardware.
pub const DEFAULT_AGG_FRAME_LIMIT: u8 = 63;
/// Retry-chain depth at which hardware stops aggregating.
pub const DEFAULT_AGG_DISABLE_START: u8 = 3;

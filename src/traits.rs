//! Collaborator interfaces of the rate-scaling engine.
//!
//! The engine never talks to hardware or to the aggregation machinery
//! directly; it emits fire-and-forget calls through [`LinkController`].
//! Implementations must not block the decision path — queue the work and
//! return.

use std::fmt::Debug;

use crate::constants::MAX_RETRY_CHAIN_LEN;
use crate::rates::Antenna;
use crate::types::{RateWord, StationId, Tid};

/// The finalized per-station rate table and its transmission metadata, as
/// pushed to the hardware or firmware that executes the retry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateTableCmd {
    /// Retry chain, most aggressive rate first.
    pub chain: [RateWord; MAX_RETRY_CHAIN_LEN],
    /// Chain slot at which the dual-stream prefix ends.
    pub mimo_delim: u8,
    /// Antenna set for single-stream entries.
    pub single_stream_ant: Antenna,
    /// Antenna set for dual-stream entries.
    pub dual_stream_ant: Antenna,
    /// Aggregate duration budget, microseconds.
    pub agg_time_limit_usec: u16,
    /// Frames per aggregate.
    pub agg_frame_limit: u8,
    /// Retry-chain depth at which aggregation stops.
    pub agg_disable_start: u8,
    /// Transmit-power reduction to apply, in reduction steps.
    pub reduced_power_level: u8,
}

/// Outbound boundary towards the radio driver.
///
/// Calls are idempotent notifications: the engine re-pushes a full table
/// rather than patching, and never reads anything back synchronously.
pub trait LinkController: Send + Sync + Debug {
    /// Programs the retry chain for a station.
    fn program_rate_table(&self, station: StationId, cmd: &RateTableCmd);

    /// Asks the host to negotiate aggregation on a TID.
    fn request_aggregation_start(&self, station: StationId, tid: Tid);

    /// Asks the host to tear down aggregation on a TID.
    fn request_aggregation_stop(&self, station: StationId, tid: Tid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingController {
        programmed: Mutex<Vec<(StationId, RateTableCmd)>>,
        agg_starts: Mutex<Vec<(StationId, Tid)>>,
    }

    impl LinkController for RecordingController {
        fn program_rate_table(&self, station: StationId, cmd: &RateTableCmd) {
            self.programmed.lock().unwrap().push((station, *cmd));
        }
        fn request_aggregation_start(&self, station: StationId, tid: Tid) {
            self.agg_starts.lock().unwrap().push((station, tid));
        }
        fn request_aggregation_stop(&self, _station: StationId, _tid: Tid) {}
    }

    #[test]
    fn controller_receives_full_commands() {
        let controller = RecordingController::default();
        let cmd = RateTableCmd {
            agg_frame_limit: 63,
            ..Default::default()
        };

        controller.program_rate_table(StationId::new(3), &cmd);
        controller.request_aggregation_start(StationId::new(3), Tid::new(5));

        let programmed = controller.programmed.lock().unwrap();
        assert_eq!(programmed.len(), 1);
        assert_eq!(programmed[0].1.agg_frame_limit, 63);
        assert_eq!(controller.agg_starts.lock().unwrap()[0].1, Tid::new(5));
    }
}

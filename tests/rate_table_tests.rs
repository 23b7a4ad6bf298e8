//! Properties of the programmed retry chains as seen at the hardware
//! boundary.

mod common;

use common::{drive_frames, rig, rig_with, default_hw};
use ratescale::{Band, Rate, RateScaleConfig, StationCapabilities, StationId};

#[test]
fn every_chain_slot_is_a_supported_rate() {
    let mut rig = rig();
    let id = StationId::new(1);
    let mut caps = StationCapabilities::legacy_only();
    caps.legacy_rates = 0b0000_1010_1010_1010; // sparse ladder

    rig.engine.on_peer_associated(id, caps.clone(), Band::TwoGhz);
    rig.engine
        .on_rx_rssi_update(id, ratescale::Antenna::A, [-58, 0, 0])
        .unwrap();
    rig.engine.on_peer_associated(id, caps.clone(), Band::TwoGhz);
    drive_frames(&mut rig, id, 40, true);

    let cmd = rig.link.last_cmd().unwrap();
    for word in cmd.chain {
        let rate = Rate::from_word(word, Band::TwoGhz).expect("chain slots must decode");
        assert!(
            caps.legacy_rates & (1 << rate.index) != 0,
            "unsupported rate {} programmed",
            rate.index
        );
    }
}

#[test]
fn chain_descends_monotonically_for_legacy() {
    let mut rig = rig();
    let id = StationId::new(2);
    rig.engine
        .on_peer_associated(id, StationCapabilities::legacy_only(), Band::TwoGhz);
    drive_frames(&mut rig, id, 100, true);

    let cmd = rig.link.last_cmd().unwrap();
    let rates: Vec<Rate> = cmd
        .chain
        .iter()
        .map(|w| Rate::from_word(*w, Band::TwoGhz).unwrap())
        .collect();

    for pair in rates.windows(2) {
        assert!(pair[1].index <= pair[0].index);
    }
}

#[test]
fn configured_aggregation_limits_reach_the_command() {
    let config = RateScaleConfig {
        agg_frame_limit: 32,
        agg_time_limit_usec: 2500,
        agg_disable_start: 5,
        ..Default::default()
    };
    let mut rig = rig_with(config, default_hw());
    let id = StationId::new(3);
    rig.engine
        .on_peer_associated(id, StationCapabilities::legacy_only(), Band::TwoGhz);

    let cmd = rig.link.last_cmd().unwrap();
    assert_eq!(cmd.agg_frame_limit, 32);
    assert_eq!(cmd.agg_time_limit_usec, 2500);
    assert_eq!(cmd.agg_disable_start, 5);
    assert_eq!(cmd.reduced_power_level, 0);
}

#[test]
fn reprogramming_keeps_the_chain_consistent_with_the_head() {
    let mut rig = rig();
    let id = StationId::new(4);
    rig.engine
        .on_peer_associated(id, StationCapabilities::legacy_only(), Band::TwoGhz);
    drive_frames(&mut rig, id, 120, true);

    // Each programmed command's head must equal the engine's view of the
    // chosen rate at that moment; check the final one.
    let head = Rate::from_word(rig.link.last_cmd().unwrap().chain[0], Band::TwoGhz).unwrap();
    let current = rig.engine.current_rate(id).unwrap();
    assert_eq!(head.index, current.index);
    assert_eq!(head.ant, current.ant);
}

//! Integration tests for the watering executor against mock hardware.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use smartgreen::adapters::hardware::BusActuators;
use smartgreen::adapters::sim_i2c::SimI2c;
use smartgreen::app::ports::ActuatorBus;
use smartgreen::bus::SharedBus;
use smartgreen::config::{Capabilities, Plant, WateringConfig};
use smartgreen::drivers::mcp23017::Mcp23017;
use smartgreen::error::{BusError, CapabilityError};
use smartgreen::executor::{RunError, StopReason, WateringExecutor};
use smartgreen::flow::PulseCounter;
use smartgreen::pins::{MCP_I2C_ADDR, PUMP_OUTPUT};
use smartgreen::status::{LatestStatus, StatusChannel, StatusPublisher, WateringPhase};

use super::mock_hw::{ActuatorCall, MockActuators, PulseDelay, VecLogger};

/// 7 L/min at the default calibration factor: ~116.7 ml per 1 s window.
const STEADY_FLOW_PPS: u32 = 2870;
const CALIBRATION: f32 = 410.0;
const START: i64 = 1_713_825_000;

fn publish_timeout() -> Duration {
    WateringConfig::default().status_publish_timeout
}

fn bracket(valve: u8) -> [ActuatorCall; 6] {
    [
        ActuatorCall::All { on: false },
        ActuatorCall::Set { index: valve, on: true },
        ActuatorCall::Set { index: PUMP_OUTPUT, on: true },
        ActuatorCall::Set { index: PUMP_OUTPUT, on: false },
        ActuatorCall::Set { index: valve, on: false },
        ActuatorCall::All { on: false },
    ]
}

#[test]
fn stops_at_first_sample_over_target() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let mut hw = MockActuators::new();
    let mut log = VecLogger::default();

    let mut exec = WateringExecutor::new(
        &mut hw,
        &mut log,
        PulseDelay::new(&pulses, STEADY_FLOW_PPS),
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    );
    let plants = [Plant::new(0, 1), Plant::new(3, 2)];
    let report = exec.run(&plants, Capabilities::all(), CALIBRATION, START).unwrap();

    // 150 ml target: 116.7 after one window, 233.3 after two.
    assert_eq!(report.plants[0].samples, 2);
    assert_eq!(report.plants[0].stop, StopReason::TargetReached);
    assert!(report.plants[0].volume_ml >= 150.0);
    // 300 ml target: three windows.
    assert_eq!(report.plants[1].samples, 3);
    assert_eq!(report.plants[1].stop, StopReason::TargetReached);

    let mut expected = bracket(0).to_vec();
    expected.extend(bracket(3));
    assert_eq!(hw.calls, expected);
    assert_eq!(hw.output_state(), 0);

    assert_eq!(log.records.len(), 2);
    assert_eq!(log.records[0].plant_id, 0);
    assert_eq!(log.records[0].timestamp, START + 2);
    assert_eq!(log.records[1].plant_id, 3);
    assert_eq!(log.records[1].timestamp, START + 5);
    assert_eq!(log.records[1].duration_s, 3);
    assert_eq!(log.records[1].label, "water");
}

#[test]
fn stops_at_duration_without_flow() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let mut hw = MockActuators::new();
    let mut delay = PulseDelay::new(&pulses, 0);
    let config = WateringConfig::default();
    let plant = Plant::new(5, 1);

    let report = WateringExecutor::new(
        &mut hw,
        VecLogger::default(),
        &mut delay,
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        config,
    )
    .run(&[plant], Capabilities::all(), CALIBRATION, START)
    .unwrap();

    let secs = config.run_duration(&plant).as_secs() as u32;
    assert_eq!(report.plants[0].stop, StopReason::DurationElapsed);
    assert_eq!(report.plants[0].samples, secs);
    assert_eq!(report.plants[0].elapsed_s, secs);
    assert_eq!(report.plants[0].volume_ml, 0.0);
    assert_eq!(hw.calls, bracket(5).to_vec());
    // Settle delays on both sides plus every sampling window.
    assert_eq!(delay.elapsed_ms, u64::from(secs) * 1000 + 2000);
}

#[test]
fn trickle_flow_is_cut_off_by_duration() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();

    let report = WateringExecutor::new(
        MockActuators::new(),
        VecLogger::default(),
        PulseDelay::new(&pulses, 41),
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    )
    .run(&[Plant::new(1, 1)], Capabilities::all(), CALIBRATION, START)
    .unwrap();

    let plant = report.plants[0];
    assert_eq!(plant.stop, StopReason::DurationElapsed);
    assert!(plant.volume_ml > 0.0 && plant.volume_ml < 150.0);
}

#[test]
fn bus_error_mid_sequence_still_closes_everything() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let mut hw = MockActuators::failing_on(PUMP_OUTPUT, true);
    let mut log = VecLogger::default();

    let result = WateringExecutor::new(
        &mut hw,
        &mut log,
        PulseDelay::new(&pulses, STEADY_FLOW_PPS),
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    )
    .run(&[Plant::new(2, 1), Plant::new(4, 1)], Capabilities::all(), CALIBRATION, START);

    assert_eq!(result, Err(RunError::Bus(BusError::NoAcknowledge(0x20))));
    // Only the first plant was attempted, and it was fully closed.
    assert_eq!(hw.calls, bracket(2).to_vec());
    assert_eq!(hw.output_state(), 0);
    assert!(log.records.is_empty());
    assert_eq!(latest.get().phase, WateringPhase::Finished);
    assert_eq!(latest.get().plant_id, 2);
}

#[test]
fn failed_valve_close_still_forces_all_off() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let mut hw = MockActuators::failing_on(6, false);

    let result = WateringExecutor::new(
        &mut hw,
        VecLogger::default(),
        PulseDelay::new(&pulses, STEADY_FLOW_PPS),
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    )
    .run(&[Plant::new(6, 1)], Capabilities::all(), CALIBRATION, START);

    assert!(matches!(result, Err(RunError::Bus(_))));
    assert_eq!(hw.calls.last(), Some(&ActuatorCall::All { on: false }));
    assert_eq!(hw.output_state(), 0);
}

#[test]
fn missing_expander_actuates_nothing() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let mut hw = MockActuators::new();
    let caps = Capabilities {
        has_mcp: false,
        ..Capabilities::all()
    };

    let result = WateringExecutor::new(
        &mut hw,
        VecLogger::default(),
        PulseDelay::new(&pulses, STEADY_FLOW_PPS),
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    )
    .run(&[Plant::new(0, 1)], caps, CALIBRATION, START);

    assert_eq!(result, Err(RunError::Capability(CapabilityError::NoActuatorBus)));
    assert!(hw.calls.is_empty());
}

#[test]
fn missing_rtc_still_waters() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let caps = Capabilities {
        has_rtc: false,
        ..Capabilities::all()
    };

    let report = WateringExecutor::new(
        MockActuators::new(),
        VecLogger::default(),
        PulseDelay::new(&pulses, STEADY_FLOW_PPS),
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    )
    .run(&[Plant::new(0, 1)], caps, CALIBRATION, 42)
    .unwrap();

    assert_eq!(report.plants.len(), 1);
}

#[test]
fn phases_are_published_in_order() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let mut subscriber = channel.subscriber().unwrap();

    WateringExecutor::new(
        MockActuators::new(),
        VecLogger::default(),
        PulseDelay::new(&pulses, STEADY_FLOW_PPS),
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    )
    .run(&[Plant::new(7, 1)], Capabilities::all(), CALIBRATION, START)
    .unwrap();

    let mut phases = Vec::new();
    let mut flows = Vec::new();
    while let Some(status) = subscriber.try_next_message_pure() {
        assert_eq!(status.plant_id, 7);
        phases.push(status.phase);
        flows.push(status.flow_ml);
    }
    assert_eq!(
        phases,
        [
            WateringPhase::Priming,
            WateringPhase::PumpOn,
            WateringPhase::Flowing,
            WateringPhase::Flowing,
            WateringPhase::Finished,
        ]
    );
    assert!(flows.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(latest.get().phase, WateringPhase::Finished);
}

#[test]
fn stalled_observer_does_not_stop_the_run() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    // Subscribed but never drained.
    let _stalled = channel.subscriber().unwrap();

    let report = WateringExecutor::new(
        MockActuators::new(),
        VecLogger::default(),
        PulseDelay::new(&pulses, STEADY_FLOW_PPS),
        &pulses,
        StatusPublisher::new(&channel, &latest, Duration::from_millis(30)),
        WateringConfig::default(),
    )
    .run(
        &[Plant::new(0, 1), Plant::new(1, 1), Plant::new(2, 1)],
        Capabilities::all(),
        CALIBRATION,
        START,
    )
    .unwrap();

    assert_eq!(report.plants.len(), 3);
    assert_eq!(latest.get().plant_id, 2);
    assert_eq!(latest.get().phase, WateringPhase::Finished);
}

// ── Bus mutex discipline ──────────────────────────────────────

/// Real expander over the simulated bus; every delay checks the lock.
struct WatchingDelay<'a> {
    bus: SharedBus<SimI2c>,
    pulses: &'a PulseCounter,
    delays: u32,
    held_during_delay: bool,
}

impl DelayNs for WatchingDelay<'_> {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.delays += 1;
        self.held_during_delay |= self.bus.is_held();
        for _ in 0..(ms * STEADY_FLOW_PPS / 1000) {
            self.pulses.on_edge();
        }
    }
}

#[test]
fn bus_is_never_held_across_a_delay() {
    let bus = SharedBus::new(SimI2c::fully_populated(), Mcp23017::new(MCP_I2C_ADDR));
    bus.with(|b| b.expander.init(&mut b.i2c)).unwrap();

    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let mut delay = WatchingDelay {
        bus: bus.clone(),
        pulses: &pulses,
        delays: 0,
        held_during_delay: false,
    };

    WateringExecutor::new(
        BusActuators::new(bus.clone()),
        VecLogger::default(),
        &mut delay,
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    )
    .run(&[Plant::new(0, 1), Plant::new(11, 1)], Capabilities::all(), CALIBRATION, START)
    .unwrap();

    assert!(delay.delays > 0);
    assert!(!delay.held_during_delay);
    assert!(!bus.is_held());
    assert_eq!(bus.with(|b| b.expander.energized()), 0);
    // Relays are active LOW: every output released.
    assert_eq!(bus.with(|b| b.i2c.mcp_register(0x14)), Some(0xFF));
    assert_eq!(bus.with(|b| b.i2c.mcp_register(0x15)), Some(0xFF));
}

#[test]
fn stop_request_lets_current_plant_finish() {
    let pulses = PulseCounter::new();
    let channel = StatusChannel::new();
    let latest = LatestStatus::new();
    let mut hw = MockActuators::new();
    let mut log = VecLogger::default();
    let mut asked = 0;

    let mut exec = WateringExecutor::new(
        &mut hw,
        &mut log,
        PulseDelay::new(&pulses, STEADY_FLOW_PPS),
        &pulses,
        StatusPublisher::new(&channel, &latest, publish_timeout()),
        WateringConfig::default(),
    );
    let plants = [Plant::new(0, 1), Plant::new(3, 1), Plant::new(5, 1)];
    let report = exec
        .run_until(&plants, Capabilities::all(), CALIBRATION, START, || {
            asked += 1;
            false
        })
        .unwrap();

    // Asked once, between the first and second plant.
    assert_eq!(asked, 1);
    assert_eq!(report.plants.len(), 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.plants[0].stop, StopReason::TargetReached);
    assert_eq!(hw.calls, bracket(0).to_vec());
    assert_eq!(log.records.len(), 1);
    assert_eq!(log.records[0].plant_id, 0);
}

//! Integration tests for the AppService: settings mutations, clock sync,
//! remote merge and the serial console.

use smartgreen::adapters::eeprom_store::EepromStore;
use smartgreen::adapters::sim_i2c::SimI2c;
use smartgreen::adapters::time::RtcClock;
use smartgreen::app::ports::SettingsStore;
use smartgreen::app::service::{AppService, Reply};
use smartgreen::bus::SharedBus;
use smartgreen::config::{Capabilities, Plant, Settings, WateringConfig};
use smartgreen::drivers::mcp23017::Mcp23017;
use smartgreen::error::{CapabilityError, Error, StorageError, ValidationError};
use smartgreen::orchestrator::{SharedState, run_watering};
use smartgreen::pins::{EEPROM_I2C_ADDR, MCP_I2C_ADDR, RTC_I2C_ADDR};

use super::mock_hw::{MemoryStore, NoDelay, ScriptedClock};

/// Monday 2024-04-22 22:30:00.
const NOW: i64 = 1_713_825_000;
const PLANTS: &str = r#"{"plants":[[0,2,1],[3,1,0]]}"#;
const DAILY_6AM: &str = r#"{"alarm":[[{"weekday":127,"hour":6,"minute":0,"status":1},{"weekday":127,"hour":6,"minute":30,"status":1}]]}"#;

fn state() -> SharedState<SimI2c> {
    let bus = SharedBus::new(SimI2c::fully_populated(), Mcp23017::new(MCP_I2C_ADDR));
    bus.with(|b| b.expander.init(&mut b.i2c)).unwrap();
    SharedState::new(bus, Settings::default(), WateringConfig::default())
}

fn text(reply: Reply) -> String {
    match reply {
        Reply::Text(t) => t,
        Reply::Restart => panic!("unexpected restart"),
    }
}

// ── Settings mutations ────────────────────────────────────────

#[test]
fn set_plants_persists_then_swaps_in() {
    let state = state();
    let mut store = MemoryStore::default();
    let mut clock = ScriptedClock::at(NOW);
    let mut svc = AppService::new(&state, &mut store, Some(&mut clock));

    assert_eq!(svc.set_plants(PLANTS).as_deref(), Ok(PLANTS));

    assert_eq!(store.saves, 1);
    let saved = store.saved.unwrap();
    assert_eq!(saved, state.settings());
    assert_eq!(saved.plants.len(), 2);
    assert_eq!(saved.last_update, NOW);
}

#[test]
fn set_alarms_echoes_stored_table() {
    let state = state();
    let mut store = MemoryStore::default();
    let mut svc = AppService::new(&state, &mut store, Some(ScriptedClock::at(NOW)));

    assert_eq!(svc.set_alarms(DAILY_6AM).as_deref(), Ok(DAILY_6AM));
    assert_eq!(state.alarms().len(), 1);
}

#[test]
fn rejected_payload_changes_nothing() {
    let state = state();
    let mut store = MemoryStore::default();
    let mut svc = AppService::new(&state, &mut store, Some(ScriptedClock::at(NOW)));

    assert_eq!(
        svc.set_plants(r#"{"plants":[[1,1,1],[1,2,1]]}"#),
        Err(Error::Validation(ValidationError::DuplicateValve(1)))
    );
    assert_eq!(
        svc.set_alarms(r#"{"alarm":[[{"weekday":1,"hour":25,"minute":0,"status":1},{"weekday":1,"hour":26,"minute":0,"status":1}]]}"#),
        Err(Error::Validation(ValidationError::OutOfRange("hour")))
    );

    assert_eq!(store.saves, 0);
    assert_eq!(state.settings(), Settings::default());
}

#[test]
fn failed_save_keeps_previous_settings() {
    let state = state();
    let mut store = MemoryStore {
        fail: true,
        ..MemoryStore::default()
    };
    let mut svc = AppService::new(&state, &mut store, Some(ScriptedClock::at(NOW)));

    assert!(matches!(
        svc.set_alarms(DAILY_6AM),
        Err(Error::Storage(StorageError::Io(_)))
    ));
    assert!(state.alarms().is_empty());
    assert_eq!(state.settings().last_update, 0);
}

#[test]
fn last_update_falls_back_to_uptime_without_rtc() {
    let state = state();
    let mut store = MemoryStore::default();
    let mut svc = AppService::new(&state, &mut store, None::<ScriptedClock>);

    svc.set_plants(PLANTS).unwrap();
    let stamp = state.settings().last_update;
    assert!((0..NOW).contains(&stamp));
}

// ── Clock sync ────────────────────────────────────────────────

#[test]
fn sync_clock_sets_rtc_and_records_sync() {
    let state = state();
    let mut store = MemoryStore::default();
    let mut clock = ScriptedClock::at(NOW);
    let mut svc = AppService::new(&state, &mut store, Some(&mut clock));

    svc.sync_clock(NOW + 3600).unwrap();

    assert_eq!(clock.sets, [NOW + 3600]);
    assert_eq!(state.settings().last_sync, NOW + 3600);
    assert_eq!(store.saves, 1);
}

#[test]
fn sync_clock_without_rtc_is_a_capability_error() {
    let state = state();
    let mut store = MemoryStore::default();
    let mut svc = AppService::new(&state, &mut store, None::<ScriptedClock>);

    assert_eq!(
        svc.sync_clock(NOW),
        Err(Error::Capability(CapabilityError::NoRtc))
    );
    assert_eq!(store.saves, 0);
}

#[test]
fn failed_save_leaves_clock_untouched() {
    let state = state();
    let mut store = MemoryStore {
        fail: true,
        ..MemoryStore::default()
    };
    let mut clock = ScriptedClock::at(NOW);
    let mut svc = AppService::new(&state, &mut store, Some(&mut clock));

    assert!(matches!(svc.sync_clock(NOW + 3600), Err(Error::Storage(StorageError::Io(_)))));

    assert!(clock.sets.is_empty());
    assert_eq!(state.settings().last_sync, Settings::default().last_sync);
}

#[test]
fn refused_clock_time_rolls_back_stored_sync() {
    let state = state();
    let before = state.settings();
    let mut store = MemoryStore::default();
    let mut clock = ScriptedClock::at(NOW);
    let mut svc = AppService::new(&state, &mut store, Some(&mut clock));

    // Before 2000-01-01: the RTC cannot hold it.
    assert_eq!(
        svc.sync_clock(900_000_000),
        Err(Error::Validation(ValidationError::OutOfRange("time")))
    );

    assert!(clock.sets.is_empty());
    assert_eq!(store.saves, 2);
    assert_eq!(store.saved.as_ref(), Some(&before));
    assert_eq!(state.settings(), before);
}

// ── Remote merge ──────────────────────────────────────────────

fn remote(last_update: i64, plants: &[Plant]) -> Settings {
    let mut s = Settings::default();
    s.last_update = last_update;
    s.device_id.clear();
    s.device_id.push_str("SG-REMOTE").unwrap();
    for &p in plants {
        s.plants.push(p).unwrap();
    }
    s
}

#[test]
fn newer_remote_settings_are_applied_keeping_identity() {
    let state = state();
    let mut local = Settings::default();
    local.capabilities = Capabilities::all();
    state.replace_settings(local.clone());

    let mut store = MemoryStore::default();
    let mut svc = AppService::new(&state, &mut store, Some(ScriptedClock::at(NOW)));
    svc.merge_remote(remote(100, &[Plant::new(4, 3)])).unwrap();

    let merged = state.settings();
    assert_eq!(merged.plants.as_slice(), &[Plant::new(4, 3)]);
    assert_eq!(merged.last_update, 100);
    assert_eq!(merged.device_id, local.device_id);
    assert_eq!(merged.capabilities, Capabilities::all());
    assert_eq!(store.saved, Some(merged));
}

#[test]
fn stale_remote_settings_are_ignored() {
    let state = state();
    let mut store = MemoryStore::default();
    let mut svc = AppService::new(&state, &mut store, Some(ScriptedClock::at(NOW)));
    svc.set_plants(PLANTS).unwrap();

    assert_eq!(
        svc.merge_remote(remote(NOW, &[])),
        Err(Error::Validation(ValidationError::Stale))
    );
    assert_eq!(state.plants().len(), 2);
}

#[test]
fn invalid_remote_settings_are_rejected() {
    let state = state();
    let mut store = MemoryStore::default();
    let mut svc = AppService::new(&state, &mut store, Some(ScriptedClock::at(NOW)));

    assert_eq!(
        svc.merge_remote(remote(100, &[Plant::new(2, 1), Plant::new(2, 2)])),
        Err(Error::Validation(ValidationError::DuplicateValve(2)))
    );
    assert_eq!(store.saves, 0);
    assert!(state.plants().is_empty());
}

// ── Console ───────────────────────────────────────────────────

#[test]
fn console_basics() {
    let state = state();
    let mut svc = AppService::new(&state, MemoryStore::default(), Some(ScriptedClock::at(NOW)));
    let mut delay = NoDelay;

    assert_eq!(text(svc.handle_line("ping", &mut delay)), "pong!");
    assert_eq!(text(svc.handle_line("fly me to the moon", &mut delay)), "Unknown input");
    assert_eq!(text(svc.handle_line("time", &mut delay)), "2024-04-22T22:30:00");
    assert_eq!(
        text(svc.handle_line("wateringStatus", &mut delay)),
        "plant=0 phase=idle flow=0.0ml elapsed=0s"
    );
    assert_eq!(text(svc.handle_line("beep:2", &mut delay)), "ok");
    assert_eq!(state.beeps(), 2);
    assert_eq!(svc.handle_line("restart", &mut delay), Reply::Restart);
}

#[test]
fn console_table_round_trip() {
    let state = state();
    let mut svc = AppService::new(&state, MemoryStore::default(), Some(ScriptedClock::at(NOW)));
    let mut delay = NoDelay;

    assert_eq!(text(svc.handle_line("plants", &mut delay)), r#"{"plants":[]}"#);
    let set = format!("setPlants:{PLANTS}");
    assert_eq!(text(svc.handle_line(&set, &mut delay)), PLANTS);
    assert_eq!(text(svc.handle_line("plants", &mut delay)), PLANTS);

    let bad = r#"setAlarms:{"alarm":[[{"weekday":1,"hour":24,"minute":0,"status":1},{"weekday":1,"hour":24,"minute":0,"status":1}]]}"#;
    assert_eq!(
        text(svc.handle_line(bad, &mut delay)),
        "error: validation: hour out of range"
    );
    assert_eq!(text(svc.handle_line("alarms", &mut delay)), r#"{"alarm":[]}"#);
}

#[test]
fn console_next_alarm() {
    let state = state();
    let mut svc = AppService::new(&state, MemoryStore::default(), Some(ScriptedClock::at(NOW)));
    let mut delay = NoDelay;

    assert_eq!(text(svc.handle_line("nextAlarm", &mut delay)), "none");
    svc.set_alarms(DAILY_6AM).unwrap();
    // 22:30 Monday → 06:00 Tuesday.
    assert_eq!(
        text(svc.handle_line("nextAlarm", &mut delay)),
        "slot 0 in 27000s"
    );
}

#[test]
fn console_reports_missing_rtc() {
    let state = state();
    let mut svc = AppService::new(&state, MemoryStore::default(), None::<ScriptedClock>);
    let mut delay = NoDelay;

    assert_eq!(
        text(svc.handle_line("time", &mut delay)),
        "error: capability: RTC not present"
    );
    assert_eq!(
        text(svc.handle_line("setRTC:2024-04-22T22:30:00", &mut delay)),
        "error: capability: RTC not present"
    );
}

#[test]
fn console_set_rtc() {
    let state = state();
    let mut clock = ScriptedClock::at(NOW);
    let mut svc = AppService::new(&state, MemoryStore::default(), Some(&mut clock));
    let mut delay = NoDelay;

    assert_eq!(text(svc.handle_line("setRTC:2024-04-23T06:00:00", &mut delay)), "ok");
    assert_eq!(clock.sets, [NOW + 27_000]);
}

#[test]
fn console_water_requests_a_run() {
    let state = state();
    let mut svc = AppService::new(&state, MemoryStore::default(), Some(ScriptedClock::at(NOW)));
    let mut delay = NoDelay;

    assert_eq!(text(svc.handle_line("water", &mut delay)), "watering requested");
    assert!(state.take_manual_request());

    let _token = state.run_guard.try_acquire().unwrap();
    assert_eq!(text(svc.handle_line("water", &mut delay)), "already watering");
    assert!(!state.take_manual_request());
}

#[test]
fn console_logs_after_a_run() {
    let state = state();
    let mut settings = Settings::default();
    settings.capabilities = Capabilities::all();
    settings.plants.push(Plant::new(0, 1)).unwrap();
    state.replace_settings(settings);

    let mut svc = AppService::new(&state, MemoryStore::default(), Some(ScriptedClock::at(NOW)));
    let mut delay = NoDelay;
    assert_eq!(text(svc.handle_line("logs", &mut delay)), "no records");

    // No flow: the plant runs for its full 32 s bound.
    run_watering(&state, NoDelay, NOW).unwrap();
    assert_eq!(
        text(svc.handle_line("logs", &mut delay)),
        format!("{},water,0,0.0,32", NOW + 32)
    );
}

// ── End to end on the simulated board ─────────────────────────

#[test]
fn eeprom_and_rtc_end_to_end() {
    let bus = SharedBus::new(SimI2c::fully_populated(), Mcp23017::new(MCP_I2C_ADDR));
    let state = SharedState::new(bus.clone(), Settings::default(), WateringConfig::default());
    let store = EepromStore::new(bus.clone(), EEPROM_I2C_ADDR, NoDelay);
    let clock = RtcClock::new(bus.clone(), RTC_I2C_ADDR);
    let mut svc = AppService::new(&state, store, Some(clock));

    svc.sync_clock(NOW).unwrap();
    svc.set_plants(PLANTS).unwrap();

    let mut reader = EepromStore::new(bus.clone(), EEPROM_I2C_ADDR, NoDelay);
    let persisted = reader.load().unwrap();
    assert_eq!(persisted, state.settings());
    assert_eq!(persisted.last_sync, NOW);
    // The RTC does not tick in simulation.
    assert_eq!(persisted.last_update, NOW);
    assert!(!bus.is_held());
}

//! Application service: settings mutations and console dispatch.
//!
//! [`AppService`] is the single writer of [`Settings`].  Every mutation
//! follows the same path:
//!
//! ```text
//!  payload ──▶ parse + validate ──▶ copy of Settings ──▶ SettingsStore::save
//!                                                            │ ok
//!                                                            ▼
//!                                               swap into SharedState
//! ```
//!
//! A payload that fails validation, or a save that fails, leaves both the
//! stored record and the in-memory settings untouched.  A clock sync saves
//! first and sets the RTC second, so an error reply always means the clock
//! was left as it was.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::config::Settings;
use crate::error::{CapabilityError, Error, ValidationError};
use crate::orchestrator::{SharedState, timestamp};
use crate::schedule::{ClockTime, next_activation_slot};

use super::commands::ConsoleCommand;
use super::payload::{alarms_json, parse_alarms, parse_plants, plants_json};
use super::ports::{ClockSource, LogRecord, SettingsStore};

/// Response to one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// The caller should reboot the device.
    Restart,
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

pub struct AppService<'a, I, S, C> {
    state: &'a SharedState<I>,
    store: S,
    clock: Option<C>,
}

impl<'a, I, S, C> AppService<'a, I, S, C>
where
    I: I2c,
    S: SettingsStore,
    C: ClockSource,
{
    /// `clock` is `None` when no RTC is fitted.
    pub fn new(state: &'a SharedState<I>, store: S, clock: Option<C>) -> Self {
        Self { state, store, clock }
    }

    // ── Settings mutations ────────────────────────────────────

    /// Replace the alarm table; returns the stored table as JSON.
    pub fn set_alarms(&mut self, json: &str) -> Result<String, Error> {
        let alarms = parse_alarms(json)?;
        let mut next = self.state.settings();
        next.alarms = alarms;
        next.last_update = timestamp(self.clock.as_ref());
        self.persist(next)?;
        info!("alarm table replaced");
        Ok(alarms_json(&self.state.alarms()))
    }

    /// Replace the plant table; returns the stored table as JSON.
    pub fn set_plants(&mut self, json: &str) -> Result<String, Error> {
        let plants = parse_plants(json)?;
        let mut next = self.state.settings();
        next.plants = plants;
        next.last_update = timestamp(self.clock.as_ref());
        self.persist(next)?;
        info!("plant table replaced");
        Ok(plants_json(&self.state.plants()))
    }

    /// Set the clock and record the sync time.
    ///
    /// The new `last_sync` is saved before the clock is touched; if the
    /// clock then refuses the time, the previous record is written back.
    pub fn sync_clock(&mut self, unix: i64) -> Result<(), Error> {
        let Some(clock) = self.clock.as_mut() else {
            return Err(CapabilityError::NoRtc.into());
        };
        let previous = self.state.settings();
        let mut next = previous.clone();
        next.last_sync = unix;

        self.store.save(&next)?;
        if let Err(e) = clock.set(unix) {
            if let Err(undo) = self.store.save(&previous) {
                warn!("clock sync failed and last_sync not rolled back: {}", undo);
            }
            return Err(e.into());
        }
        self.state.replace_settings(next);
        info!("clock synced to {}", unix);
        Ok(())
    }

    /// Apply externally sourced settings if they are newer than ours.
    ///
    /// Device identity and probed capabilities always stay local.
    pub fn merge_remote(&mut self, remote: Settings) -> Result<(), Error> {
        let local = self.state.settings();
        if remote.last_update <= local.last_update {
            warn!(
                "remote settings ignored: last_update {} not newer than {}",
                remote.last_update, local.last_update
            );
            return Err(ValidationError::Stale.into());
        }
        remote.validate()?;
        let merged = Settings {
            device_id: local.device_id,
            capabilities: local.capabilities,
            ..remote
        };
        self.persist(merged)?;
        info!("remote settings applied");
        Ok(())
    }

    fn persist(&mut self, next: Settings) -> Result<(), Error> {
        self.store.save(&next)?;
        self.state.replace_settings(next);
        Ok(())
    }

    // ── Console ───────────────────────────────────────────────

    pub fn handle_line(&mut self, line: &str, delay: &mut impl DelayNs) -> Reply {
        self.handle(ConsoleCommand::parse(line), delay)
    }

    pub fn handle(&mut self, cmd: ConsoleCommand, delay: &mut impl DelayNs) -> Reply {
        match cmd {
            ConsoleCommand::Ping => "pong!".into(),
            ConsoleCommand::Beep(n) => {
                self.state.beep(n, delay);
                "ok".into()
            }
            ConsoleCommand::Time => match self.now() {
                Ok(now) => format_clock(&now).into(),
                Err(e) => format!("error: {e}").into(),
            },
            ConsoleCommand::SetRtc(unix) => ok_or_error(self.sync_clock(unix).map(|()| "ok".into())),
            ConsoleCommand::Water => {
                if self.state.is_watering() {
                    "already watering".into()
                } else {
                    self.state.request_manual_run();
                    "watering requested".into()
                }
            }
            ConsoleCommand::WateringStatus => self.state.latest_status.get().to_string().into(),
            ConsoleCommand::NextAlarm => match self.now() {
                Ok(now) => match next_activation_slot(&self.state.alarms(), &now) {
                    Some((slot, lead)) => format!("slot {} in {}s", slot, lead.as_secs()).into(),
                    None => "none".into(),
                },
                Err(e) => format!("error: {e}").into(),
            },
            ConsoleCommand::Alarms => alarms_json(&self.state.alarms()).into(),
            ConsoleCommand::Plants => plants_json(&self.state.plants()).into(),
            ConsoleCommand::SetAlarms(json) => ok_or_error(self.set_alarms(&json)),
            ConsoleCommand::SetPlants(json) => ok_or_error(self.set_plants(&json)),
            ConsoleCommand::Logs => render_logs(&self.state.history.snapshot()).into(),
            ConsoleCommand::Restart => Reply::Restart,
            ConsoleCommand::Unknown(_) => "Unknown input".into(),
        }
    }

    fn now(&self) -> Result<ClockTime, Error> {
        let clock = self.clock.as_ref().ok_or(CapabilityError::NoRtc)?;
        Ok(clock.now()?)
    }
}

fn ok_or_error(result: Result<String, Error>) -> Reply {
    match result {
        Ok(text) => Reply::Text(text),
        Err(e) => {
            warn!("console command rejected: {}", e);
            Reply::Text(format!("error: {e}"))
        }
    }
}

/// `YYYY-MM-DDTHH:MM:SS`, the same shape `setRTC` accepts.
pub fn format_clock(now: &ClockTime) -> String {
    match time::OffsetDateTime::from_unix_timestamp(now.unix) {
        Ok(dt) => format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        ),
        Err(_) => format!("{}", now.unix),
    }
}

/// One CSV line per record: `timestamp,label,plant,volume_ml,duration_s`.
pub fn render_logs(records: &[LogRecord]) -> String {
    if records.is_empty() {
        return "no records".into();
    }
    records
        .iter()
        .map(|r| {
            format!(
                "{},{},{},{:.1},{}",
                r.timestamp, r.label, r.plant_id, r.volume_ml, r.duration_s
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

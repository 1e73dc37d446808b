//! Inbound serial-console commands.
//!
//! One command per line.  Parsing is pure; the
//! [`AppService`](super::service::AppService) interprets the result.
//!
//! | Input                   | Command                     |
//! |-------------------------|-----------------------------|
//! | `ping`                  | [`ConsoleCommand::Ping`]    |
//! | `beep` / `beep:<n>`     | [`ConsoleCommand::Beep`]    |
//! | `time`                  | [`ConsoleCommand::Time`]    |
//! | `setRTC:<iso datetime>` | [`ConsoleCommand::SetRtc`]  |
//! | `water`                 | [`ConsoleCommand::Water`]   |
//! | `wateringStatus`        | [`ConsoleCommand::WateringStatus`] |
//! | `nextAlarm`             | [`ConsoleCommand::NextAlarm`] |
//! | `alarms` / `plants`     | JSON echo of the tables     |
//! | `setAlarms:<json>`      | [`ConsoleCommand::SetAlarms`] |
//! | `setPlants:<json>`      | [`ConsoleCommand::SetPlants`] |
//! | `logs`                  | [`ConsoleCommand::Logs`]    |
//! | `restart`               | [`ConsoleCommand::Restart`] |

use time::PrimitiveDateTime;
use time::macros::format_description;

/// Largest accepted `beep:<n>` count.
pub const MAX_BEEPS: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Ping,
    Beep(u8),
    Time,
    /// Local epoch seconds parsed from `YYYY-MM-DDTHH:MM:SS`.
    SetRtc(i64),
    Water,
    WateringStatus,
    NextAlarm,
    Alarms,
    Plants,
    SetAlarms(String),
    SetPlants(String),
    Logs,
    Restart,
    /// Anything else, including a known verb with a bad argument.
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (verb, arg) = match line.split_once(':') {
            Some((verb, arg)) => (verb, Some(arg)),
            None => (line, None),
        };

        match (verb, arg) {
            ("ping", None) => Self::Ping,
            ("beep", None) => Self::Beep(1),
            ("beep", Some(n)) => match n.trim().parse::<u8>() {
                Ok(n) if (1..=MAX_BEEPS).contains(&n) => Self::Beep(n),
                _ => Self::Unknown(line.into()),
            },
            ("time", None) => Self::Time,
            ("setRTC", Some(iso)) => parse_iso(iso).map_or_else(|| Self::Unknown(line.into()), Self::SetRtc),
            ("water", None) => Self::Water,
            ("wateringStatus", None) => Self::WateringStatus,
            ("nextAlarm", None) => Self::NextAlarm,
            ("alarms", None) => Self::Alarms,
            ("plants", None) => Self::Plants,
            ("setAlarms", Some(json)) => Self::SetAlarms(json.into()),
            ("setPlants", Some(json)) => Self::SetPlants(json.into()),
            ("logs", None) => Self::Logs,
            ("restart", None) => Self::Restart,
            _ => Self::Unknown(line.into()),
        }
    }
}

/// `YYYY-MM-DDTHH:MM:SS` as local epoch seconds.
pub fn parse_iso(s: &str) -> Option<i64> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(s.trim(), format)
        .ok()
        .map(|dt| dt.assume_utc().unix_timestamp())
}

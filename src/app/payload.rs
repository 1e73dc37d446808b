//! Administrative JSON contract for the alarm and plant tables.
//!
//! ```text
//!  {"alarm":  [[{"weekday":2,"hour":6,"minute":0,"status":1},
//!               {"weekday":2,"hour":6,"minute":30,"status":1}], …]}
//!  {"plants": [[0,2,1], [3,1,0], …]}          // [valve id, size class, status]
//! ```
//!
//! Payloads are parsed into typed DTOs and validated as a whole before
//! anything is handed to the service; a rejected payload never reaches
//! [`Settings`](crate::config::Settings).  The `*_json` functions render
//! the stored tables in the same shape, so a client can compare what it
//! sent with what was stored.

use heapless::Vec as FixedVec;
use serde::{Deserialize, Serialize};

use crate::config::{MAX_ALARMS, MAX_PLANTS, Plant, Status, validate_alarms, validate_plants};
use crate::error::ValidationError;
use crate::schedule::{AlarmRecord, AlarmSlot, WeekdayMask};

pub type AlarmTable = FixedVec<AlarmSlot, MAX_ALARMS>;
pub type PlantTable = FixedVec<Plant, MAX_PLANTS>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AlarmRecordDto {
    weekday: u8,
    hour: u8,
    minute: u8,
    status: u8,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AlarmTableDto {
    alarm: Vec<[AlarmRecordDto; 2]>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlantTableDto {
    plants: Vec<[u8; 3]>,
}

fn status(v: u8) -> Result<Status, ValidationError> {
    Status::from_u8(v).ok_or(ValidationError::OutOfRange("status"))
}

impl TryFrom<&AlarmRecordDto> for AlarmRecord {
    type Error = ValidationError;

    fn try_from(dto: &AlarmRecordDto) -> Result<Self, Self::Error> {
        Ok(Self {
            weekday_mask: WeekdayMask::from_bits(dto.weekday)
                .ok_or(ValidationError::OutOfRange("weekday"))?,
            hour: dto.hour,
            minute: dto.minute,
            status: status(dto.status)?,
        })
    }
}

impl From<&AlarmRecord> for AlarmRecordDto {
    fn from(r: &AlarmRecord) -> Self {
        Self {
            weekday: r.weekday_mask.bits(),
            hour: r.hour,
            minute: r.minute,
            status: r.status.as_u8(),
        }
    }
}

/// Parse and validate a `setAlarms` payload.
pub fn parse_alarms(json: &str) -> Result<AlarmTable, ValidationError> {
    let dto: AlarmTableDto = serde_json::from_str(json).map_err(|_| ValidationError::Malformed)?;
    if dto.alarm.len() > MAX_ALARMS {
        return Err(ValidationError::TooManyEntries { max: MAX_ALARMS });
    }

    let mut table = AlarmTable::new();
    for [start, end] in &dto.alarm {
        let slot = AlarmSlot::new(start.try_into()?, end.try_into()?);
        table
            .push(slot)
            .map_err(|_| ValidationError::TooManyEntries { max: MAX_ALARMS })?;
    }
    validate_alarms(&table)?;
    Ok(table)
}

/// Parse and validate a `setPlants` payload.
pub fn parse_plants(json: &str) -> Result<PlantTable, ValidationError> {
    let dto: PlantTableDto = serde_json::from_str(json).map_err(|_| ValidationError::Malformed)?;
    if dto.plants.len() > MAX_PLANTS {
        return Err(ValidationError::TooManyEntries { max: MAX_PLANTS });
    }

    let mut table = PlantTable::new();
    for &[id, size, st] in &dto.plants {
        let plant = Plant {
            id,
            size,
            status: status(st)?,
        };
        table
            .push(plant)
            .map_err(|_| ValidationError::TooManyEntries { max: MAX_PLANTS })?;
    }
    validate_plants(&table)?;
    Ok(table)
}

pub fn alarms_json(alarms: &[AlarmSlot]) -> String {
    let dto = AlarmTableDto {
        alarm: alarms
            .iter()
            .map(|s| [AlarmRecordDto::from(&s.start), AlarmRecordDto::from(&s.end)])
            .collect(),
    };
    serde_json::to_string(&dto).unwrap_or_default()
}

pub fn plants_json(plants: &[Plant]) -> String {
    let dto = PlantTableDto {
        plants: plants
            .iter()
            .map(|p| [p.id, p.size, p.status.as_u8()])
            .collect(),
    };
    serde_json::to_string(&dto).unwrap_or_default()
}

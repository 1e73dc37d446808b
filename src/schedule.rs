//! Weekly alarm engine.
//!
//! Pure evaluation over the persisted alarm table and a wall-clock
//! reading.  Nothing here touches hardware or time sources: the
//! supervisor passes in a [`ClockTime`] and decides what to do with the
//! answer.
//!
//! ```text
//!  ClockSource::now() ──▶ ClockTime ──┬──▶ active_slot()     ──▶ rising edge?  ──▶ run
//!                                     └──▶ next_activation() ──▶ console / display
//! ```
//!
//! ## Window semantics
//!
//! A slot is evaluated hour-bucketed, *not* as a minutes-since-midnight
//! range: the hour must lie in `[start.hour, end.hour]` (both ends
//! inclusive) and, independently, the minute must lie in
//! `[start.minute, end.minute)`.  A slot 21:00 → 23:59 is therefore open
//! at 22:30 but closed at 23:59.  Stored schedules depend on this exact
//! behaviour, so it must not be "fixed" into range arithmetic.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Status;

/// Seconds in one day.
const SECS_PER_DAY: u64 = 86_400;

/// Returned by [`next_activation`] when no armed slot ever matches.
pub const NO_UPCOMING_ALARM: Duration = Duration::MAX;

/// Index of a slot in the alarm table.
pub type SlotId = usize;

// ═══════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════

/// Set of weekdays; bit *i* = weekday *i* with 0 = Sunday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    pub const NONE: Self = Self(0);
    pub const EVERY_DAY: Self = Self(0x7F);

    /// Build a mask from raw bits.  Returns `None` if bit 7 is set.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & 0x80 != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// Mask containing exactly one weekday (0 = Sunday … 6 = Saturday).
    pub const fn single(weekday: u8) -> Self {
        Self(1 << (weekday % 7))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, weekday: u8) -> bool {
        weekday < 7 && self.0 & (1 << weekday) != 0
    }
}

/// One edge (start or end) of a watering window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub weekday_mask: WeekdayMask,
    pub hour: u8,
    pub minute: u8,
    pub status: Status,
}

impl AlarmRecord {
    pub const DISABLED: Self = Self {
        weekday_mask: WeekdayMask::NONE,
        hour: 0,
        minute: 0,
        status: Status::Disabled,
    };

    pub const fn new(weekday_mask: WeekdayMask, hour: u8, minute: u8) -> Self {
        Self {
            weekday_mask,
            hour,
            minute,
            status: Status::Enabled,
        }
    }

    /// Seconds since midnight at which this record fires.
    pub fn seconds_of_day(&self) -> u64 {
        u64::from(self.hour) * 3600 + u64::from(self.minute) * 60
    }
}

/// A watering window: a (start, end) pair of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmSlot {
    pub start: AlarmRecord,
    pub end: AlarmRecord,
}

impl AlarmSlot {
    pub const fn new(start: AlarmRecord, end: AlarmRecord) -> Self {
        Self { start, end }
    }

    /// A slot only participates when both of its records are enabled.
    pub fn is_armed(&self) -> bool {
        self.start.status.is_enabled() && self.end.status.is_enabled()
    }

    /// Whether any minute of the day can fall inside the window.  Hours
    /// and minutes are bucketed separately, so `06:30 → 08:15` never opens.
    pub fn can_open(&self) -> bool {
        self.start.hour <= self.end.hour && self.start.minute < self.end.minute
    }

    /// Whether `now` falls inside this slot's window (ignores arming).
    pub fn contains(&self, now: &ClockTime) -> bool {
        self.start.weekday_mask.contains(now.weekday)
            && (self.start.hour..=self.end.hour).contains(&now.hour)
            && (self.start.minute..self.end.minute).contains(&now.minute)
    }
}

/// Wall-clock reading as delivered by the clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    /// 0 = Sunday … 6 = Saturday.
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Local civil time as seconds since the epoch.
    pub unix: i64,
}

impl ClockTime {
    /// Decompose a local-time epoch value.  `None` if out of the
    /// representable calendar range.
    pub fn from_unix(unix: i64) -> Option<Self> {
        let dt = time::OffsetDateTime::from_unix_timestamp(unix).ok()?;
        Some(Self {
            weekday: dt.weekday().number_days_from_sunday(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            unix,
        })
    }

    pub fn seconds_of_day(&self) -> u64 {
        u64::from(self.hour) * 3600 + u64::from(self.minute) * 60 + u64::from(self.second)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Evaluation
// ═══════════════════════════════════════════════════════════════

/// First armed slot (in table order) whose window contains `now`.
pub fn active_slot(alarms: &[AlarmSlot], now: &ClockTime) -> Option<SlotId> {
    alarms
        .iter()
        .position(|slot| slot.is_armed() && slot.contains(now))
}

/// Whether watering should be running at `now`.
pub fn is_active(alarms: &[AlarmSlot], now: &ClockTime) -> bool {
    active_slot(alarms, now).is_some()
}

/// Slot and lead time of the next activation strictly after `now`.
///
/// Only the coming seven day offsets (today included) are searched.
/// Today's start must lie strictly after `now`; ties between slots keep
/// the earlier table index.  Slots whose window can never open are
/// skipped, so the returned instant always lies inside a window.
pub fn next_activation_slot(alarms: &[AlarmSlot], now: &ClockTime) -> Option<(SlotId, Duration)> {
    let now_secs = now.seconds_of_day();
    let mut best: Option<(SlotId, u64)> = None;

    for (id, slot) in alarms.iter().enumerate() {
        if !slot.is_armed() || !slot.can_open() {
            continue;
        }
        let slot_secs = slot.start.seconds_of_day();

        for day_offset in 0..7u64 {
            let weekday = ((u64::from(now.weekday) + day_offset) % 7) as u8;
            if !slot.start.weekday_mask.contains(weekday) {
                continue;
            }
            if day_offset == 0 && slot_secs <= now_secs {
                continue;
            }
            let ahead = day_offset * SECS_PER_DAY + slot_secs - now_secs;
            if best.is_none_or(|(_, secs)| ahead < secs) {
                best = Some((id, ahead));
            }
            // Later offsets for the same slot are always further away.
            break;
        }
    }

    best.map(|(id, secs)| (id, Duration::from_secs(secs)))
}

/// Time until the next activation, or [`NO_UPCOMING_ALARM`].
pub fn next_activation(alarms: &[AlarmSlot], now: &ClockTime) -> Duration {
    next_activation_slot(alarms, now).map_or(NO_UPCOMING_ALARM, |(_, lead)| lead)
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

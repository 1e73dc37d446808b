//! Log-based watering sinks.
//!
//! [`HistoryLogger`] implements [`WateringLogger`] by writing each record
//! to the ESP-IDF logger (UART / USB-CDC in production) and keeping it in
//! a fixed-size [`LogHistory`] for the `logs` console command.
//! [`StatusConsole`] drains a status subscription onto the same log.

use std::sync::{Mutex, PoisonError};

use heapless::HistoryBuffer;
use log::info;

use crate::app::ports::{LogRecord, WateringLogger};
use crate::status::StatusSubscriber;

/// Records kept in memory.
pub const LOG_HISTORY_DEPTH: usize = 16;

/// Most recent watering records, oldest evicted first.
#[derive(Default)]
pub struct LogHistory(Mutex<HistoryBuffer<LogRecord, LOG_HISTORY_DEPTH>>);

impl LogHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: LogRecord) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(record);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .oldest_ordered()
            .copied()
            .collect()
    }
}

/// Logger + history adapter handed to the executor.
pub struct HistoryLogger<'a> {
    history: &'a LogHistory,
}

impl<'a> HistoryLogger<'a> {
    pub fn new(history: &'a LogHistory) -> Self {
        Self { history }
    }
}

impl WateringLogger for HistoryLogger<'_> {
    fn record(&mut self, record: LogRecord) {
        info!(
            "WATER | t={} | {} | plant={} | {:.1}ml | {}s",
            record.timestamp, record.label, record.plant_id, record.volume_ml, record.duration_s
        );
        self.history.push(record);
    }
}

/// Renders status snapshots as `STATUS | …` lines.
pub struct StatusConsole<'a> {
    subscriber: StatusSubscriber<'a>,
}

impl<'a> StatusConsole<'a> {
    pub fn new(subscriber: StatusSubscriber<'a>) -> Self {
        Self { subscriber }
    }

    /// Log every queued snapshot; returns how many were drained.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while let Some(status) = self.subscriber.try_next_message_pure() {
            info!("STATUS | {}", status);
            n += 1;
        }
        n
    }
}

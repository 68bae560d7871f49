use std::fmt;

use crate::error::StorageError;

pub const MAX_HISTORY_LINES: usize = 500;
/// Wall-clock values below this are treated as "not yet synced".
pub const UNIX_TIME_SYNCED_FROM: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryRecord {
    pub timestamp: u64,
    pub celsius: f32,
    pub sensor_id: u32,
}

impl HistoryRecord {
    pub fn new(unix_seconds: i64, uptime_ms: u64, celsius: f32, sensor_id: u32) -> Self {
        Self {
            timestamp: history_timestamp(unix_seconds, uptime_ms),
            celsius,
            sensor_id,
        }
    }
}

/// `timestamp,temp,sensor_id`
impl fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{:.2},{}", self.timestamp, self.celsius, self.sensor_id)
    }
}

/// Unix seconds once the clock is synced, uptime seconds before.
pub fn history_timestamp(unix_seconds: i64, uptime_ms: u64) -> u64 {
    if unix_seconds >= UNIX_TIME_SYNCED_FROM {
        unix_seconds as u64
    } else {
        uptime_ms / 1_000
    }
}

/// Append-only log of validated readings.
pub trait TemperatureHistory {
    fn append(&mut self, record: HistoryRecord) -> Result<(), StorageError>;

    /// Up to `limit` most recent lines, oldest first.
    fn recent(&self, limit: usize) -> Vec<String>;

    /// Drops every record. Returns whether there was anything to drop.
    fn clear(&mut self) -> Result<bool, StorageError>;
}

/// Ring buffer for targets without a filesystem. The oldest record is evicted
/// once full.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: heapless::Deque<HistoryRecord, MAX_HISTORY_LINES>,
}

impl MemoryHistory {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TemperatureHistory for MemoryHistory {
    fn append(&mut self, record: HistoryRecord) -> Result<(), StorageError> {
        if self.records.is_full() {
            self.records.pop_front();
        }
        let pushed = self.records.push_back(record);
        debug_assert!(pushed.is_ok());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Vec<String> {
        let skip = self.records.len().saturating_sub(limit);
        self.records
            .iter()
            .skip(skip)
            .map(ToString::to_string)
            .collect()
    }

    fn clear(&mut self) -> Result<bool, StorageError> {
        let had_records = !self.records.is_empty();
        self.records.clear();
        Ok(had_records)
    }
}

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;

pub const MAX_SYSTEM_LOGS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub uptime_ms: u64,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}s] {}", self.uptime_ms / 1_000, self.message)
    }
}

/// Recent system events for the local API. Clones share one buffer; once
/// full the oldest entry is dropped.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<heapless::Deque<LogEntry, MAX_SYSTEM_LOGS>>>,
}

impl EventLog {
    pub fn record(&self, uptime_ms: u64, message: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.is_full() {
            entries.pop_front();
        }
        let pushed = entries.push_back(LogEntry {
            uptime_ms,
            message: message.into(),
        });
        debug_assert!(pushed.is_ok());
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn newest_entries_come_first() {
        let log = EventLog::default();
        log.record(1_000, "booted");
        log.record(2_500, "registered");

        let messages: Vec<String> = log.entries().into_iter().map(|entry| entry.message).collect();
        assert_eq!(messages, vec!["registered".to_string(), "booted".to_string()]);
        assert_eq!(log.entries()[0].to_string(), "[2s] registered");
    }

    #[test]
    fn capacity_drops_the_oldest() {
        let log = EventLog::default();
        for i in 0..(MAX_SYSTEM_LOGS as u64 + 5) {
            log.record(i, format!("event {i}"));
        }

        let entries = log.entries();
        assert_eq!(entries.len(), MAX_SYSTEM_LOGS);
        assert_eq!(entries[0].message, format!("event {}", MAX_SYSTEM_LOGS + 4));
        assert_eq!(entries[MAX_SYSTEM_LOGS - 1].message, "event 5");
    }

    #[test]
    fn clones_share_one_buffer() {
        let log = EventLog::default();
        let handle = log.clone();
        handle.record(0, "from the server thread");

        assert_eq!(log.len(), 1);
        assert_eq!(
            serde_json::to_value(&log.entries()[0]).unwrap(),
            serde_json::json!({"uptimeMs": 0, "message": "from the server thread"})
        );
    }
}

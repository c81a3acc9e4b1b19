//! In-memory rolling log store.
//!
//! Backs the REST "read logs"/"clear logs" operations with a mutex-guarded
//! ring buffer capped at [`MAX_LOG_LINES`](crate::protocol_constants::MAX_LOG_LINES)
//! entries. Once the cap is exceeded, the oldest half is dropped — the same
//! discipline a rolling log file uses, translated to an in-process record so
//! nothing needs to be re-parsed from disk on every request.
//!
//! `log::info!`/`warn!`/`error!` calls elsewhere in the crate flow through
//! `env_logger`'s stderr sink independently; this store is a second,
//! structured consumer of the same events for API clients.

use std::sync::Mutex;

use serde::Serialize;

use crate::protocol_constants::MAX_LOG_LINES;
use crate::utils::now_millis;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Stream,
    System,
}

/// A single structured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub ts: u64,
    pub level: LogLevel,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Rolling in-memory log store.
pub struct LogStore {
    entries: Mutex<Vec<LogEntry>>,
    cap: usize,
}

impl LogStore {
    /// Creates a new store with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_LINES)
    }

    /// Creates a new store with an explicit capacity (mainly for tests).
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            cap,
        }
    }

    fn push(&self, level: LogLevel, msg: impl Into<String>, data: Option<serde_json::Value>) {
        let entry = LogEntry {
            ts: now_millis(),
            level,
            msg: msg.into(),
            data,
        };
        let mut entries = self.entries.lock().expect("log store mutex poisoned");
        if entries.len() >= self.cap {
            let half = self.cap / 2;
            let drained = entries.split_off(entries.len() - half);
            *entries = drained;
        }
        entries.push(entry);
    }

    /// Records an INFO entry.
    pub fn info(&self, msg: impl Into<String>) {
        self.push(LogLevel::Info, msg, None);
    }

    /// Records a WARN entry.
    pub fn warn(&self, msg: impl Into<String>) {
        self.push(LogLevel::Warn, msg, None);
    }

    /// Records an ERROR entry.
    pub fn error(&self, msg: impl Into<String>) {
        self.push(LogLevel::Error, msg, None);
    }

    /// Records a STREAM entry (stream worker lifecycle), optionally carrying
    /// structured data (e.g. `{cid, ip, port}`).
    pub fn stream(&self, msg: impl Into<String>, data: Option<serde_json::Value>) {
        self.push(LogLevel::Stream, msg, data);
    }

    /// Records a SYSTEM entry (server lifecycle: startup, shutdown, restart).
    pub fn system(&self, msg: impl Into<String>) {
        self.push(LogLevel::System, msg, None);
    }

    /// Returns the last `n` entries, oldest first.
    #[must_use]
    pub fn read(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().expect("log store mutex poisoned");
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.entries.lock().expect("log store mutex poisoned").clear();
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_most_recent_n_in_order() {
        let store = LogStore::new();
        for i in 0..5 {
            store.info(format!("entry {i}"));
        }
        let recent = store.read(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].msg, "entry 3");
        assert_eq!(recent[1].msg, "entry 4");
    }

    #[test]
    fn exceeding_cap_drops_oldest_half() {
        let store = LogStore::with_capacity(10);
        for i in 0..10 {
            store.info(format!("entry {i}"));
        }
        // 11th push should trigger the roll: drop oldest half (5), keep the
        // newest 5, then append the new entry.
        store.info("entry 10".to_string());

        let all = store.read(100);
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].msg, "entry 5");
        assert_eq!(all.last().unwrap().msg, "entry 10");
    }

    #[test]
    fn clear_empties_the_store() {
        let store = LogStore::new();
        store.system("starting up");
        store.clear();
        assert!(store.read(10).is_empty());
    }

    #[test]
    fn stream_entries_carry_optional_data() {
        let store = LogStore::new();
        store.stream(
            "CH01 started",
            Some(serde_json::json!({"cid": 0, "ip": "239.1.1.1"})),
        );
        let entries = store.read(1);
        assert_eq!(entries[0].level, LogLevel::Stream);
        assert!(entries[0].data.is_some());
    }
}

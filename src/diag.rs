use serde::Serialize;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub seq: u64,
    pub ts: u64,
    pub level: &'static str,
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMetrics {
    pub capacity: usize,
    pub retained: usize,
    pub total_appended: u64,
    pub dropped: u64,
    pub debug_count: usize,
    pub info_count: usize,
    pub warn_count: usize,
    pub error_count: usize,
}

/// Fixed-capacity log store: oldest entries are evicted first, sequence
/// numbers and the total-appended counter survive eviction and clears so
/// metrics reflect everything ever logged in the session.
pub struct LogBuffer {
    capacity: usize,
    next_seq: u64,
    total_appended: u64,
    dropped: u64,
    entries: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 1,
            total_appended: 0,
            dropped: 0,
            entries: VecDeque::new(),
        }
    }

    pub fn append(&mut self, level: LogLevel, source: &str, message: &str) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.total_appended += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(LogEntry {
            seq,
            ts: unix_now(),
            level: level.as_str(),
            source: source.to_string(),
            message: message.to_string(),
        });
        seq
    }

    /// Retained entries oldest-first; `limit` keeps only the newest N.
    pub fn entries(&self, limit: Option<usize>) -> Vec<LogEntry> {
        let take = limit.unwrap_or(self.entries.len()).min(self.entries.len());
        self.entries
            .iter()
            .skip(self.entries.len() - take)
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> LogMetrics {
        let count_of = |lvl: &str| self.entries.iter().filter(|e| e.level == lvl).count();
        LogMetrics {
            capacity: self.capacity,
            retained: self.entries.len(),
            total_appended: self.total_appended,
            dropped: self.dropped,
            debug_count: count_of("debug"),
            info_count: count_of("info"),
            warn_count: count_of("warn"),
            error_count: count_of("error"),
        }
    }

    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.dropped += cleared as u64;
        self.entries.clear();
        cleared
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

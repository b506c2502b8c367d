use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};

/// One captured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: log::Level,
    pub target: String,
    pub message: String,
}

struct Ring {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Ring {
    fn push(&mut self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}

fn ring() -> &'static Mutex<Ring> {
    static RING: OnceLock<Mutex<Ring>> = OnceLock::new();
    RING.get_or_init(|| Mutex::new(Ring { entries: VecDeque::new(), capacity: 0 }))
}

pub(super) fn set_capacity(capacity: usize) {
    if let Ok(mut r) = ring().lock() {
        r.capacity = capacity;
        while r.entries.len() > capacity {
            r.entries.pop_front();
        }
    }
}

pub(super) fn push_entry(entry: LogEntry) {
    if let Ok(mut r) = ring().lock() {
        r.push(entry);
    }
}

/// Returns the most recent log entries, oldest first.
pub fn recent_entries() -> Vec<LogEntry> {
    ring()
        .lock()
        .map(|r| r.entries.iter().cloned().collect())
        .unwrap_or_default()
}

/// Forwards to `env_logger` and keeps a copy of each enabled record.
pub(super) struct RingLogger {
    inner: env_logger::Logger,
}

impl RingLogger {
    pub(super) fn new(inner: env_logger::Logger) -> Self {
        Self { inner }
    }
}

impl log::Log for RingLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.inner.matches(record) {
            return;
        }
        push_entry(LogEntry {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(msg: &str) -> LogEntry {
        LogEntry { level: log::Level::Info, target: "t".into(), message: msg.into() }
    }

    #[test]
    fn ring_drops_oldest() {
        let mut r = Ring { entries: VecDeque::new(), capacity: 2 };
        r.push(entry("a"));
        r.push(entry("b"));
        r.push(entry("c"));
        let msgs: Vec<_> = r.entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, ["b", "c"]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut r = Ring { entries: VecDeque::new(), capacity: 0 };
        r.push(entry("a"));
        assert!(r.entries.is_empty());
    }
}

//! Structured kernel log service
//!
//! A fixed-size, heap-free circular buffer of structured log entries. Each
//! entry carries a sequence number, severity level, subsystem tag, and a
//! fixed-length message. The buffer sits behind a [`spin::Mutex`]; once full
//! it wraps around and silently overwrites the oldest entries.
//!
//! The [`log`] facade is bridged into the buffer: `init()` installs a
//! [`log::Log`] implementation, so kernel code logs through the standard
//! `log::debug!` / `log::warn!` macros with the subsystem as the target.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Maximum number of log entries the circular buffer can hold.
const LOG_BUFFER_CAPACITY: usize = 256;

/// Maximum length (in bytes) of a log message stored in a [`LogEntry`].
const LOG_MESSAGE_MAX_LEN: usize = 128;

/// Maximum length (in bytes) of the subsystem tag in a [`LogEntry`].
const LOG_SUBSYSTEM_MAX_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// One structured entry in the circular buffer.
#[derive(Clone, Copy)]
pub struct LogEntry {
    /// Monotonic sequence number assigned at submission.
    pub seq: u64,
    pub level: LogLevel,
    subsystem: [u8; LOG_SUBSYSTEM_MAX_LEN],
    subsystem_len: usize,
    message: [u8; LOG_MESSAGE_MAX_LEN],
    message_len: usize,
}

impl LogEntry {
    /// Subsystem tag as a string slice.
    pub fn subsystem(&self) -> &str {
        core::str::from_utf8(&self.subsystem[..self.subsystem_len]).unwrap_or("?")
    }

    /// Message text as a string slice.
    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.message[..self.message_len]).unwrap_or("?")
    }
}

struct LogBuffer {
    entries: [Option<LogEntry>; LOG_BUFFER_CAPACITY],
    head: usize,
    count: usize,
}

impl LogBuffer {
    const fn new() -> Self {
        Self {
            entries: [None; LOG_BUFFER_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        self.entries[self.head] = Some(entry);
        self.head = (self.head + 1) % LOG_BUFFER_CAPACITY;
        if self.count < LOG_BUFFER_CAPACITY {
            self.count += 1;
        }
    }
}

static LOG_BUFFER: Mutex<LogBuffer> = Mutex::new(LogBuffer::new());
static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Submit a structured entry. Over-long tags and messages are truncated.
pub fn klog(level: LogLevel, subsystem: &str, message: &str) {
    let mut entry = LogEntry {
        seq: LOG_SEQ.fetch_add(1, Ordering::Relaxed),
        level,
        subsystem: [0; LOG_SUBSYSTEM_MAX_LEN],
        subsystem_len: 0,
        message: [0; LOG_MESSAGE_MAX_LEN],
        message_len: 0,
    };

    let tag = subsystem.as_bytes();
    entry.subsystem_len = tag.len().min(LOG_SUBSYSTEM_MAX_LEN);
    entry.subsystem[..entry.subsystem_len].copy_from_slice(&tag[..entry.subsystem_len]);

    let msg = message.as_bytes();
    entry.message_len = msg.len().min(LOG_MESSAGE_MAX_LEN);
    entry.message[..entry.message_len].copy_from_slice(&msg[..entry.message_len]);

    LOG_BUFFER.lock().push(entry);
}

/// Number of entries currently retained.
pub fn log_count() -> usize {
    LOG_BUFFER.lock().count
}

/// Run `f` over every retained entry, oldest first.
pub fn for_each_entry<F: FnMut(&LogEntry)>(mut f: F) {
    let buffer = LOG_BUFFER.lock();
    let start = (buffer.head + LOG_BUFFER_CAPACITY - buffer.count) % LOG_BUFFER_CAPACITY;
    for i in 0..buffer.count {
        if let Some(ref entry) = buffer.entries[(start + i) % LOG_BUFFER_CAPACITY] {
            f(entry);
        }
    }
}

// ---------------------------------------------------------------------------
// `log` facade bridge
// ---------------------------------------------------------------------------

/// Fixed-capacity formatting target for bridging `log` records without heap
/// allocation in the logging path.
struct FixedWriter {
    buf: [u8; LOG_MESSAGE_MAX_LEN],
    len: usize,
}

impl Write for FixedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let room = LOG_MESSAGE_MAX_LEN - self.len;
        let n = bytes.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

struct KlogBridge;

impl log::Log for KlogBridge {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let level = match record.level() {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Trace,
        };
        let mut writer = FixedWriter {
            buf: [0; LOG_MESSAGE_MAX_LEN],
            len: 0,
        };
        let _ = write!(writer, "{}", record.args());
        let message = core::str::from_utf8(&writer.buf[..writer.len]).unwrap_or("?");
        klog(level, record.target(), message);
    }

    fn flush(&self) {}
}

static BRIDGE: KlogBridge = KlogBridge;

/// Install the bridge as the global `log` backend. Safe to call more than
/// once; only the first call wins.
pub fn init() {
    if log::set_logger(&BRIDGE).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_retained_in_order() {
        klog(LogLevel::Info, "test-order", "first");
        klog(LogLevel::Warn, "test-order", "second");

        extern crate std;
        use std::vec::Vec;
        let mut seen: Vec<u64> = Vec::new();
        for_each_entry(|e| {
            if e.subsystem() == "test-order" {
                seen.push(e.seq);
            }
        });
        assert!(seen.len() >= 2);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn long_message_truncated() {
        extern crate std;
        let long = std::string::String::from_utf8(std::vec![b'x'; 500]).unwrap();
        klog(LogLevel::Debug, "test-trunc", &long);
        let mut found = false;
        for_each_entry(|e| {
            if e.subsystem() == "test-trunc" {
                assert_eq!(e.message().len(), LOG_MESSAGE_MAX_LEN);
                found = true;
            }
        });
        assert!(found);
    }
}

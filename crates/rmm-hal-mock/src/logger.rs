//! Capture logger for tests
//!
//! Implements `log::Log` and keeps formatted records in memory so tests can
//! assert on what the granule core reported.

use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use log::{LevelFilter, Log, Metadata, Record};
use spin::{Mutex, Once};

/// Oldest records are dropped past this many
const MAX_RECORDS: usize = 4096;

/// Global logger instance
static LOGGER: CaptureLogger = CaptureLogger;

static RECORDS: Mutex<VecDeque<String>> = Mutex::new(VecDeque::new());

static INSTALLED: Once = Once::new();

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut records = RECORDS.lock();
            if records.len() >= MAX_RECORDS {
                records.pop_front();
            }
            records.push_back(format!("[{}] {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

/// Install the capture logger (once per process) and set the level.
pub fn init(max_level: LevelFilter) {
    INSTALLED.call_once(|| {
        // Another logger may already own the facade; records are then lost.
        let _ = log::set_logger(&LOGGER);
    });
    log::set_max_level(max_level);
}

/// Snapshot of the captured records
pub fn captured() -> Vec<String> {
    RECORDS.lock().iter().cloned().collect()
}

/// Drop all captured records
pub fn clear() {
    RECORDS.lock().clear();
}

/// Check if any captured record contains `substr`
pub fn has_log_containing(substr: &str) -> bool {
    RECORDS.lock().iter().any(|r| r.contains(substr))
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test: the capture buffer is process-global
    #[test]
    fn test_logger_captures_and_drops_oldest() {
        init(LevelFilter::Trace);
        log::info!("logger-selftest {}", 7);
        assert!(has_log_containing("logger-selftest 7"));
        assert!(captured().iter().any(|r| r.starts_with("[INFO]")));

        clear();
        assert!(captured().is_empty());
        for i in 0..=MAX_RECORDS {
            log::debug!("logger-cap {}", i);
        }

        let records = captured();
        assert_eq!(records.len(), MAX_RECORDS);
        assert_eq!(records[0], "[DEBUG] logger-cap 1");
        assert_eq!(records[MAX_RECORDS - 1], format!("[DEBUG] logger-cap {}", MAX_RECORDS));
    }
}

//! Console output for the log stream.
//!
//! The control loop only pushes into [`LogStream`]; this module formats the
//! entries and writes them to whatever console the firmware has (stdout on
//! ESP-IDF, which is routed to UART0). Never call it from inside a
//! component's `poll`.

use core::fmt::Write;

use crate::logging::{LogEntry, LogStream};

/// Report dropped entries at most this often.
pub const DROPPED_REPORT_INTERVAL_US: u64 = 10_000_000;

/// Format log entry to a byte buffer.
///
/// Format: `[timestamp_us] LEVEL Source: message\n`
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    let mut writer = crate::logging::SliceWriter { buf, pos: 0 };

    let _ = write!(
        writer,
        "[{:10}] {} {}: {}\n",
        entry.timestamp_us,
        entry.level.as_str(),
        entry.source.as_str(),
        entry.message()
    );

    writer.pos
}

/// Drains a [`LogStream`] into a text sink.
pub struct LogDrain {
    last_dropped_report_us: u64,
}

impl LogDrain {
    pub const fn new() -> Self {
        Self { last_dropped_report_us: 0 }
    }

    /// Write every pending entry to `out`.
    ///
    /// Returns the number of entries written. Every
    /// [`DROPPED_REPORT_INTERVAL_US`] a warning line with the dropped count
    /// is appended (and the counter reset) if anything was lost.
    pub fn drain_to<const N: usize>(
        &mut self,
        stream: &LogStream<N>,
        now_us: u64,
        out: &mut dyn Write,
    ) -> usize {
        let mut format_buf = [0u8; 192];
        let mut written = 0;

        while let Some(entry) = stream.drain() {
            let len = format_log_entry(&entry, &mut format_buf);
            if let Ok(text) = core::str::from_utf8(&format_buf[..len]) {
                let _ = out.write_str(text);
            }
            written += 1;
        }

        if now_us.saturating_sub(self.last_dropped_report_us) >= DROPPED_REPORT_INTERVAL_US {
            let dropped = stream.dropped();
            if dropped > 0 {
                let _ = writeln!(out, "[{:10}] WARN System: dropped {} log entries", now_us, dropped);
                stream.reset_dropped();
            }
            self.last_dropped_report_us = now_us;
        }

        written
    }
}

impl Default for LogDrain {
    fn default() -> Self {
        Self::new()
    }
}

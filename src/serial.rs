//! Live scale reader.
//!
//! While it owns the channel, every completed line is run through the
//! weight extractor and published with origin [`origin::SERIAL_HW`].
//!
//! The reader can be parked for two independent reasons (diagnostics mode,
//! a running diagnostic test). It reopens the channel only once no reason
//! remains.

use alloc::string::String;
use serde::{Deserialize, Serialize};

use crate::channel::{read_lines, LinkContext, Owner};
use crate::config::{
    sanitize_baud_rate, sanitize_data_bits, sanitize_parity, sanitize_stop_bits, valid_pattern, SerialLinkConfig,
    MAX_PATTERN_LEN,
};
use crate::extract::extract_weight;
use crate::hal::UartPort;
use crate::line::LineAssembler;
use crate::logging::LogSource;
use crate::state::{origin, StateUpdateResult, Topic};
use crate::{link_debug, link_info, link_warn};

/// Longest scale line accepted.
pub const READER_LINE_BUDGET: usize = 512;

/// Heartbeat log period.
pub const HEARTBEAT_INTERVAL_US: u64 = 10_000_000;

/// Why the reader was asked to give up the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspendReason {
    /// Link is in diagnostics mode.
    Mode,
    /// A diagnostic test holds the channel.
    Diagnostics,
}

/// Control surface the arbiter and the diagnostics engine use to park the
/// reader. Both calls are idempotent.
pub trait SerialControl<P: UartPort> {
    fn suspend(&mut self, reason: SuspendReason, cx: &mut LinkContext<'_, P>);
    fn resume(&mut self, reason: SuspendReason, cx: &mut LinkContext<'_, P>);
}

/// Last line seen from the scale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveReadingState {
    pub last_line: String,
    /// Empty if the pattern did not match.
    pub extracted_value: String,
    pub timestamp_ms: u64,
}

/// Serial topic as served to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SerialSnapshot {
    pub last_line: String,
    pub weight: String,
    pub timestamp: u64,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: u8,
    pub regex_pattern: String,
}

/// Partial configuration update. Absent fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SerialUpdate {
    pub baud_rate: Option<u32>,
    pub data_bits: Option<u32>,
    pub stop_bits: Option<u32>,
    pub parity: Option<u32>,
    pub regex_pattern: Option<String>,
}

fn narrow(v: u32) -> u8 {
    u8::try_from(v).unwrap_or(u8::MAX)
}

impl SerialUpdate {
    /// Apply onto `config`, replacing invalid values by their default.
    pub fn apply_to(&self, config: &mut SerialLinkConfig) -> bool {
        let before = config.clone();

        if let Some(v) = self.baud_rate {
            config.baud_rate = sanitize_baud_rate(v);
        }
        if let Some(v) = self.data_bits {
            config.data_bits = sanitize_data_bits(narrow(v));
        }
        if let Some(v) = self.stop_bits {
            config.stop_bits = sanitize_stop_bits(narrow(v));
        }
        if let Some(v) = self.parity {
            config.parity = sanitize_parity(narrow(v));
        }
        if let Some(pattern) = &self.regex_pattern {
            if valid_pattern(pattern) {
                config.extraction_pattern.clone_from(pattern);
            } else {
                config.extraction_pattern.clear();
            }
        }

        *config != before
    }
}

/// Continuous line reader for the scale.
pub struct LiveSerialReader {
    config: SerialLinkConfig,
    reading: LiveReadingState,
    assembler: LineAssembler<READER_LINE_BUDGET>,
    begun: bool,
    parked_by_mode: bool,
    parked_by_diagnostics: bool,
    last_heartbeat_us: u64,
}

impl LiveSerialReader {
    pub fn new(config: SerialLinkConfig) -> Self {
        Self {
            config: config.sanitized(),
            reading: LiveReadingState::default(),
            assembler: LineAssembler::new(),
            begun: false,
            parked_by_mode: false,
            parked_by_diagnostics: false,
            last_heartbeat_us: 0,
        }
    }

    pub fn config(&self) -> &SerialLinkConfig {
        &self.config
    }

    /// Replace the configuration without touching the channel.
    pub fn set_config(&mut self, config: SerialLinkConfig) {
        self.config = config.sanitized();
    }

    pub fn reading(&self) -> &LiveReadingState {
        &self.reading
    }

    pub fn is_suspended(&self) -> bool {
        self.parked_by_mode || self.parked_by_diagnostics
    }

    pub fn is_suspended_for(&self, reason: SuspendReason) -> bool {
        match reason {
            SuspendReason::Mode => self.parked_by_mode,
            SuspendReason::Diagnostics => self.parked_by_diagnostics,
        }
    }

    /// Clear runtime state and take the channel unless parked.
    pub fn begin<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        link_info!(
            LogSource::Serial,
            cx.now_us,
            "Loaded config: {}, pattern='{}'",
            self.config.params(),
            self.config.extraction_pattern
        );
        self.reading = LiveReadingState::default();
        self.assembler.clear();
        self.begun = true;
        self.last_heartbeat_us = cx.now_us;

        if !self.is_suspended() {
            self.open_channel(cx);
        }
    }

    fn open_channel<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        self.assembler.clear();
        let params = self.config.params();
        match cx.channel.open(Owner::LiveReader, &params) {
            Ok(()) => link_info!(LogSource::Serial, cx.now_us, "UART started: {}", params),
            Err(e) => link_warn!(LogSource::Serial, cx.now_us, "No hardware access: {}", e),
        }
    }

    fn close_channel<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        if cx.channel.is_open_by(Owner::LiveReader) {
            cx.channel.close(Owner::LiveReader);
            link_info!(LogSource::Serial, cx.now_us, "UART stopped");
        }
        self.assembler.clear();
    }

    /// Read whatever arrived and publish each completed line.
    pub fn poll<P: UartPort>(&mut self, cx: &mut LinkContext<'_, P>) {
        if cx.now_us.saturating_sub(self.last_heartbeat_us) >= HEARTBEAT_INTERVAL_US {
            self.last_heartbeat_us = cx.now_us;
            link_debug!(
                LogSource::Serial,
                cx.now_us,
                "Heartbeat: open={}, suspended={}, buffered={} bytes",
                cx.channel.is_open_by(Owner::LiveReader),
                self.is_suspended(),
                self.assembler.len()
            );
        }

        if !cx.channel.is_open_by(Owner::LiveReader) {
            return;
        }

        let batch = match read_lines(cx.channel, Owner::LiveReader, &mut self.assembler) {
            Ok(batch) => batch,
            Err(e) => {
                link_warn!(LogSource::Serial, cx.now_us, "Read failed: {}", e);
                return;
            }
        };

        for _ in 0..batch.overflows {
            link_warn!(
                LogSource::Serial,
                cx.now_us,
                "Line exceeded {} bytes, discarded",
                READER_LINE_BUDGET
            );
        }

        for line in batch.lines {
            let weight = extract_weight(&self.config.extraction_pattern, &line);
            link_debug!(LogSource::Serial, cx.now_us, "Line '{}' -> '{}'", line, weight);
            self.reading.extracted_value = String::from(weight);
            self.reading.last_line = line;
            self.reading.timestamp_ms = cx.now_us / 1000;
            cx.sink.state_changed(Topic::Serial, origin::SERIAL_HW);
        }
    }

    /// Apply a configuration update.
    ///
    /// A change reopens the channel if the reader holds it; while parked the
    /// new values are used on resume. Updates from [`origin::SERIAL_HW`] or
    /// [`origin::INIT`] never reopen.
    pub fn update<P: UartPort>(
        &mut self,
        update: &SerialUpdate,
        update_origin: &str,
        cx: &mut LinkContext<'_, P>,
    ) -> StateUpdateResult {
        if let Some(pattern) = update.regex_pattern.as_deref().filter(|p| !valid_pattern(p)) {
            link_warn!(
                LogSource::Serial,
                cx.now_us,
                "Pattern of {} bytes exceeds {}, cleared",
                pattern.len(),
                MAX_PATTERN_LEN
            );
        }
        if !update.apply_to(&mut self.config) {
            return StateUpdateResult::Unchanged;
        }

        cx.sink.state_changed(Topic::Serial, update_origin);

        if update_origin != origin::SERIAL_HW
            && update_origin != origin::INIT
            && cx.channel.is_open_by(Owner::LiveReader)
        {
            link_info!(LogSource::Serial, cx.now_us, "Reconfiguring UART");
            self.close_channel(cx);
            self.open_channel(cx);
        }

        StateUpdateResult::Changed
    }

    pub fn read_state(&self) -> SerialSnapshot {
        SerialSnapshot {
            last_line: self.reading.last_line.clone(),
            weight: self.reading.extracted_value.clone(),
            timestamp: self.reading.timestamp_ms,
            baud_rate: self.config.baud_rate,
            data_bits: self.config.data_bits,
            stop_bits: self.config.stop_bits,
            parity: self.config.parity.as_u8(),
            regex_pattern: self.config.extraction_pattern.clone(),
        }
    }
}

impl<P: UartPort> SerialControl<P> for LiveSerialReader {
    fn suspend(&mut self, reason: SuspendReason, cx: &mut LinkContext<'_, P>) {
        if self.is_suspended_for(reason) {
            return;
        }
        match reason {
            SuspendReason::Mode => self.parked_by_mode = true,
            SuspendReason::Diagnostics => self.parked_by_diagnostics = true,
        }
        link_info!(LogSource::Serial, cx.now_us, "Suspended ({:?})", reason);
        self.close_channel(cx);
    }

    fn resume(&mut self, reason: SuspendReason, cx: &mut LinkContext<'_, P>) {
        match reason {
            SuspendReason::Mode => self.parked_by_mode = false,
            SuspendReason::Diagnostics => self.parked_by_diagnostics = false,
        }

        if !self.begun || self.is_suspended() || cx.channel.is_open_by(Owner::LiveReader) {
            return;
        }
        link_info!(LogSource::Serial, cx.now_us, "Resuming ({:?})", reason);
        self.open_channel(cx);
    }
}

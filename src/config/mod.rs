//! Module: config
//!
//! Purpose: persisted settings of the UART link.
//!
//! - [`SerialLinkConfig`]: line parameters and weight extraction pattern
//! - [`Mode`]: which consumer may own the UART
//! - [`nvs`]: versioned flash persistence
//!
//! Every value coming from flash or from a client goes through
//! [`SerialLinkConfig::sanitized`]: invalid fields fall back to their
//! default, nothing is rejected.

use alloc::string::String;
use serde::{Deserialize, Serialize};

use crate::hal::{LinkParams, Parity};

pub mod nvs;

pub use nvs::{MemoryStore, MigrationResult, SettingsStore, StoreError, CURRENT_SCHEMA_VERSION, MAX_PATTERN_LEN};

#[cfg(target_os = "espidf")]
pub use nvs::NvsStore;

pub const MIN_BAUD_RATE: u32 = 300;
pub const MAX_BAUD_RATE: u32 = 2_000_000;
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_DATA_BITS: u8 = 8;
pub const DEFAULT_STOP_BITS: u8 = 1;

/// Scale link configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialLinkConfig {
    pub baud_rate: u32,
    /// 5..=8
    pub data_bits: u8,
    /// 1 or 2
    pub stop_bits: u8,
    pub parity: Parity,
    /// `<prefix>(<placeholder>)`, see [`crate::extract`].
    pub extraction_pattern: String,
}

impl Default for SerialLinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            stop_bits: DEFAULT_STOP_BITS,
            parity: Parity::None,
            extraction_pattern: String::new(),
        }
    }
}

#[inline]
pub fn valid_baud_rate(v: u32) -> bool {
    (MIN_BAUD_RATE..=MAX_BAUD_RATE).contains(&v)
}

#[inline]
pub fn valid_data_bits(v: u8) -> bool {
    (5..=8).contains(&v)
}

#[inline]
pub fn valid_stop_bits(v: u8) -> bool {
    v == 1 || v == 2
}

/// Patterns longer than this are not stored in flash.
#[inline]
pub fn valid_pattern(p: &str) -> bool {
    p.len() <= MAX_PATTERN_LEN
}

/// Baud rate, or the default if out of range.
pub fn sanitize_baud_rate(v: u32) -> u32 {
    if valid_baud_rate(v) { v } else { DEFAULT_BAUD_RATE }
}

pub fn sanitize_data_bits(v: u8) -> u8 {
    if valid_data_bits(v) { v } else { DEFAULT_DATA_BITS }
}

pub fn sanitize_stop_bits(v: u8) -> u8 {
    if valid_stop_bits(v) { v } else { DEFAULT_STOP_BITS }
}

/// Parity from its wire value, `None` parity for unknown values.
pub fn sanitize_parity(v: u8) -> Parity {
    Parity::from_u8(v).unwrap_or(Parity::None)
}

impl SerialLinkConfig {
    /// Copy with every out-of-range field replaced by its default.
    pub fn sanitized(mut self) -> Self {
        self.baud_rate = sanitize_baud_rate(self.baud_rate);
        self.data_bits = sanitize_data_bits(self.data_bits);
        self.stop_bits = sanitize_stop_bits(self.stop_bits);
        if !valid_pattern(&self.extraction_pattern) {
            self.extraction_pattern.clear();
        }
        self
    }

    /// Line parameters for opening the port.
    pub fn params(&self) -> LinkParams {
        LinkParams {
            baud_rate: sanitize_baud_rate(self.baud_rate),
            data_bits: sanitize_data_bits(self.data_bits),
            stop_bits: sanitize_stop_bits(self.stop_bits),
            parity: self.parity,
        }
    }
}

/// Which logical consumer is allowed to own the UART.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    /// Live reader parses scale lines.
    #[default]
    #[serde(rename = "live")]
    LiveMonitoring = 0,
    /// Live reader parked; tests may be started.
    #[serde(rename = "diagnostics")]
    Diagnostics = 1,
}

impl Mode {
    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::LiveMonitoring => "live",
            Mode::Diagnostics => "diagnostics",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "live" => Some(Mode::LiveMonitoring),
            "diagnostics" => Some(Mode::Diagnostics),
            _ => None,
        }
    }

    /// Decode the stored value; anything unknown is live monitoring.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Mode::Diagnostics,
            _ => Mode::LiveMonitoring,
        }
    }
}

/// Everything that survives a restart.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PersistedSettings {
    pub mode: Mode,
    pub serial: SerialLinkConfig,
}

impl PersistedSettings {
    pub fn sanitized(self) -> Self {
        Self {
            mode: self.mode,
            serial: self.serial.sanitized(),
        }
    }
}

//! Flash persistence for the link settings with schema versioning.
//!
//! # Version History
//!
//! - **v1** (current): mode, baud_rate, data_bits, stop_bits, parity,
//!   extraction pattern
//!
//! # Future Migration
//!
//! When adding fields in v2:
//! 1. Increment CURRENT_SCHEMA_VERSION to 2
//! 2. Add a `(1, 2)` arm to [`migration_path`]
//! 3. Read the new keys in `NvsStore::load`, write them in `NvsStore::save`

use core::cmp::Ordering;
use core::fmt;

use super::PersistedSettings;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::EspError;

/// Current NVS schema version for the link settings
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// NVS namespace for the link settings
pub const NVS_NAMESPACE: &str = "uart_link";

/// NVS keys (max 15 chars each).
pub mod nvs_keys {
    pub const VERSION: &str = "schema_ver";
    pub const MODE: &str = "mode";
    pub const BAUD_RATE: &str = "baud";
    pub const DATA_BITS: &str = "data_bits";
    pub const STOP_BITS: &str = "stop_bits";
    pub const PARITY: &str = "parity";
    pub const PATTERN: &str = "pattern";
}

/// Longest extraction pattern stored in flash.
pub const MAX_PATTERN_LEN: usize = 64;

/// Outcome of loading the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationResult {
    /// Nothing stored yet, defaults in use
    FreshInstall,
    /// Schema up-to-date, loaded successfully
    UpToDate,
    /// Migrated from older version
    Migrated { from_version: u32, to_version: u32 },
}

/// Settings storage errors
#[derive(Debug)]
pub enum StoreError {
    /// NVS partition or namespace could not be opened
    #[cfg(target_os = "espidf")]
    InitFailed(EspError),
    /// NVS read/write error
    #[cfg(target_os = "espidf")]
    Io(EspError),
    /// Schema version too new (downgrade not supported)
    TooNew { stored_version: u32 },
    /// Unsupported migration path
    UnsupportedMigration { from: u32, to: u32 },
    /// Storage not available on this platform
    NotAvailable,
}

#[cfg(target_os = "espidf")]
impl From<EspError> for StoreError {
    fn from(e: EspError) -> Self {
        StoreError::Io(e)
    }
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            #[cfg(target_os = "espidf")]
            Self::InitFailed(_) => "S01",
            #[cfg(target_os = "espidf")]
            Self::Io(_) => "S02",
            Self::TooNew { .. } => "S03",
            Self::UnsupportedMigration { .. } => "S04",
            Self::NotAvailable => "S05",
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(target_os = "espidf")]
            Self::InitFailed(e) => write!(f, "{}: NVS init failed: {}", self.code(), e),
            #[cfg(target_os = "espidf")]
            Self::Io(e) => write!(f, "{}: NVS I/O error: {}", self.code(), e),
            Self::TooNew { stored_version } => write!(
                f,
                "{}: stored schema v{} is newer than v{}",
                self.code(),
                stored_version,
                CURRENT_SCHEMA_VERSION
            ),
            Self::UnsupportedMigration { from, to } => {
                write!(f, "{}: no migration from v{} to v{}", self.code(), from, to)
            }
            Self::NotAvailable => write!(f, "{}: storage not available", self.code()),
        }
    }
}

/// Durable storage for [`PersistedSettings`].
///
/// Called once at start and after every mode or configuration change.
pub trait SettingsStore {
    /// Fill `settings` from storage. Fields missing in storage keep the
    /// value already in `settings`.
    fn load(&mut self, settings: &mut PersistedSettings) -> Result<MigrationResult, StoreError>;

    fn save(&mut self, settings: &PersistedSettings) -> Result<(), StoreError>;
}

/// Decide how to treat a stored schema version.
///
/// `Ok(None)` means "nothing to migrate".
pub fn migration_path(stored_version: u32) -> Result<Option<MigrationResult>, StoreError> {
    match stored_version.cmp(&CURRENT_SCHEMA_VERSION) {
        Ordering::Equal => Ok(None),
        Ordering::Less if stored_version == 0 => Ok(Some(MigrationResult::FreshInstall)),
        Ordering::Less => {
            // Router for migration paths, e.g. (1, 2) => migrate_v1_to_v2()
            Err(StoreError::UnsupportedMigration {
                from: stored_version,
                to: CURRENT_SCHEMA_VERSION,
            })
        }
        Ordering::Greater => Err(StoreError::TooNew { stored_version }),
    }
}

/// RAM-only store for host builds and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    saved: Option<PersistedSettings>,
    save_count: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded as if written by an earlier boot.
    pub fn with_settings(settings: PersistedSettings) -> Self {
        Self {
            saved: Some(settings),
            save_count: 0,
        }
    }

    pub fn saved(&self) -> Option<&PersistedSettings> {
        self.saved.as_ref()
    }

    pub fn save_count(&self) -> u32 {
        self.save_count
    }
}

impl SettingsStore for MemoryStore {
    fn load(&mut self, settings: &mut PersistedSettings) -> Result<MigrationResult, StoreError> {
        match &self.saved {
            Some(saved) => {
                *settings = saved.clone();
                Ok(MigrationResult::UpToDate)
            }
            None => Ok(MigrationResult::FreshInstall),
        }
    }

    fn save(&mut self, settings: &PersistedSettings) -> Result<(), StoreError> {
        self.saved = Some(settings.clone());
        self.save_count += 1;
        Ok(())
    }
}

/// NVS-backed store on the default partition.
#[cfg(target_os = "espidf")]
pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

#[cfg(target_os = "espidf")]
impl NvsStore {
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, StoreError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true).map_err(StoreError::InitFailed)?;
        Ok(Self { nvs })
    }
}

#[cfg(target_os = "espidf")]
impl SettingsStore for NvsStore {
    fn load(&mut self, settings: &mut PersistedSettings) -> Result<MigrationResult, StoreError> {
        let stored_version = self.nvs.get_u32(nvs_keys::VERSION)?.unwrap_or(0);
        if let Some(result) = migration_path(stored_version)? {
            return Ok(result);
        }

        if let Some(mode) = self.nvs.get_u8(nvs_keys::MODE)? {
            settings.mode = super::Mode::from_u8(mode);
        }
        let serial = &mut settings.serial;
        if let Some(baud) = self.nvs.get_u32(nvs_keys::BAUD_RATE)? {
            serial.baud_rate = baud;
        }
        if let Some(bits) = self.nvs.get_u8(nvs_keys::DATA_BITS)? {
            serial.data_bits = bits;
        }
        if let Some(bits) = self.nvs.get_u8(nvs_keys::STOP_BITS)? {
            serial.stop_bits = bits;
        }
        if let Some(parity) = self.nvs.get_u8(nvs_keys::PARITY)? {
            serial.parity = super::sanitize_parity(parity);
        }
        let mut pattern_buf = [0u8; MAX_PATTERN_LEN + 1];
        if let Some(pattern) = self.nvs.get_str(nvs_keys::PATTERN, &mut pattern_buf)? {
            serial.extraction_pattern = pattern.into();
        }

        Ok(MigrationResult::UpToDate)
    }

    fn save(&mut self, settings: &PersistedSettings) -> Result<(), StoreError> {
        // Write version first
        self.nvs.set_u32(nvs_keys::VERSION, CURRENT_SCHEMA_VERSION)?;

        self.nvs.set_u8(nvs_keys::MODE, settings.mode as u8)?;
        let serial = &settings.serial;
        self.nvs.set_u32(nvs_keys::BAUD_RATE, serial.baud_rate)?;
        self.nvs.set_u8(nvs_keys::DATA_BITS, serial.data_bits)?;
        self.nvs.set_u8(nvs_keys::STOP_BITS, serial.stop_bits)?;
        self.nvs.set_u8(nvs_keys::PARITY, serial.parity.as_u8())?;

        let pattern = serial.extraction_pattern.as_str();
        let end = pattern
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|&end| end <= MAX_PATTERN_LEN)
            .last()
            .unwrap_or(0);
        self.nvs.set_str(nvs_keys::PATTERN, &pattern[..end])?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mode, SerialLinkConfig};

    #[test]
    fn test_schema_version_constant() {
        assert_eq!(CURRENT_SCHEMA_VERSION, 1);
    }

    #[test]
    fn test_migration_path() {
        assert!(matches!(migration_path(1), Ok(None)));
        assert!(matches!(
            migration_path(0),
            Ok(Some(MigrationResult::FreshInstall))
        ));
        assert!(matches!(
            migration_path(2),
            Err(StoreError::TooNew { stored_version: 2 })
        ));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        let mut loaded = PersistedSettings::default();
        assert_eq!(store.load(&mut loaded).unwrap(), MigrationResult::FreshInstall);

        let settings = PersistedSettings {
            mode: Mode::Diagnostics,
            serial: SerialLinkConfig {
                baud_rate: 9600,
                ..Default::default()
            },
        };
        store.save(&settings).unwrap();
        assert_eq!(store.save_count(), 1);

        assert_eq!(store.load(&mut loaded).unwrap(), MigrationResult::UpToDate);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_nvs_key_lengths() {
        for key in [
            nvs_keys::VERSION,
            nvs_keys::MODE,
            nvs_keys::BAUD_RATE,
            nvs_keys::DATA_BITS,
            nvs_keys::STOP_BITS,
            nvs_keys::PARITY,
            nvs_keys::PATTERN,
        ] {
            assert!(key.len() <= 15, "NVS key '{}' too long", key);
        }
        assert!(NVS_NAMESPACE.len() <= 15);
    }
}

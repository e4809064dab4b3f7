//! Persisted operator settings.
//!
//! The record is written as TOML together with a CRC-32 over a fixed
//! little-endian layout of its fields. A missing file, a parse failure or a
//! checksum mismatch all fall back to [`Settings::default`].
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;

/// Bytes reserved for the serial identifier in the checksummed layout
/// (12 characters plus a terminating zero).
pub const SERIAL_LEN: usize = 13;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub serial_id: String,
    pub differential_sensor_type: u16,
    /// Encoder zero register captured by the last actuator zeroing.
    pub actuator_home_offset: u16,
    pub tidal_volume: u16,
    pub respiration_rate: u8,
    pub peep_limit: u8,
    pub pip_limit: u8,
    pub plateau_time: u16,
    pub ie_ratio_left: f64,
    pub ie_ratio_right: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serial_id: "210000A0000".into(),
            differential_sensor_type: 0,
            actuator_home_offset: 0,
            tidal_volume: 1060,
            respiration_rate: 8,
            peep_limit: 5,
            pip_limit: 40,
            plateau_time: 100,
            ie_ratio_left: 1.0,
            ie_ratio_right: 1.0,
        }
    }
}

impl Settings {
    /// Fixed-layout byte image the checksum is computed over.
    pub fn record_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SERIAL_LEN + 29);
        let mut serial = [0u8; SERIAL_LEN];
        for (dst, src) in serial
            .iter_mut()
            .zip(self.serial_id.as_bytes().iter().take(SERIAL_LEN - 1))
        {
            *dst = *src;
        }
        out.extend_from_slice(&serial);
        out.extend_from_slice(&self.differential_sensor_type.to_le_bytes());
        out.extend_from_slice(&self.actuator_home_offset.to_le_bytes());
        out.extend_from_slice(&self.tidal_volume.to_le_bytes());
        out.push(self.respiration_rate);
        out.push(self.peep_limit);
        out.push(self.pip_limit);
        out.extend_from_slice(&self.plateau_time.to_le_bytes());
        out.extend_from_slice(&self.ie_ratio_left.to_le_bytes());
        out.extend_from_slice(&self.ie_ratio_right.to_le_bytes());
        out
    }

    /// CRC-32 (IEEE) over [`Self::record_bytes`].
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.record_bytes())
    }
}

/// Persistence collaborator for [`Settings`].
pub trait SettingsStore {
    /// Load the stored record, or defaults when it is missing or corrupt.
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> eyre::Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    checksum: u32,
    settings: Settings,
}

/// Settings stored in a single TOML file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and verify the record, reporting why it could not be used.
    pub fn try_load(&self) -> eyre::Result<Settings> {
        let text = std::fs::read_to_string(&self.path)
            .wrap_err_with(|| format!("read settings {}", self.path.display()))?;
        let file: SettingsFile = toml::from_str(&text)
            .wrap_err_with(|| format!("parse settings {}", self.path.display()))?;
        let calc = file.settings.checksum();
        if calc != file.checksum {
            eyre::bail!(
                "settings checksum mismatch: stored {:#010x}, calculated {:#010x}",
                file.checksum,
                calc
            );
        }
        Ok(file.settings)
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Settings {
        match self.try_load() {
            Ok(s) => {
                tracing::debug!(path = %self.path.display(), "settings loaded");
                s
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "settings unavailable; using defaults");
                Settings::default()
            }
        }
    }

    fn save(&self, settings: &Settings) -> eyre::Result<()> {
        let file = SettingsFile {
            checksum: settings.checksum(),
            settings: settings.clone(),
        };
        let text = toml::to_string(&file).wrap_err("serialize settings")?;
        write_atomic(&self.path, text.as_bytes())
            .wrap_err_with(|| format!("write settings {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), checksum = file.checksum, "settings saved");
        Ok(())
    }
}

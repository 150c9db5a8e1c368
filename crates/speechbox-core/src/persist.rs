//! Persistence of the device's restorable settings.
//!
//! The only setting that survives a device teardown is the volume
//! byte, and only when it differs from the default. A default volume
//! serializes to an empty document, so freshly placed and never-touched
//! devices persist nothing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpeechResult;
use crate::{DEFAULT_VOLUME, MAX_VOLUME};

/// Snapshot of the device settings worth keeping across teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume: Option<u8>,
}

impl PersistedConfig {
    /// Capture the current volume, storing nothing when it is the default.
    #[must_use]
    pub fn capture(volume: u8) -> Self {
        Self {
            volume: (volume != DEFAULT_VOLUME).then_some(volume),
        }
    }

    /// The volume to restore, falling back to the default when absent.
    ///
    /// Values above the maximum (possible in a hand-edited document) are
    /// clamped on the way out.
    #[must_use]
    pub fn volume(self) -> u8 {
        self.volume.unwrap_or(DEFAULT_VOLUME).min(MAX_VOLUME)
    }

    /// Whether this snapshot carries no explicit settings.
    #[must_use]
    pub const fn is_default(self) -> bool {
        self.volume.is_none()
    }

    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(self) -> SpeechResult<String> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Deserialize from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON for this shape.
    pub fn from_json(json: &str) -> SpeechResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the snapshot to a file as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the filesystem write fails.
    pub fn save(self, path: &Path) -> SpeechResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a snapshot back from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> SpeechResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

use crate::error::{CompassError, CompassResult};
use crate::platform::LocationRequest;
use crate::preferences::SampleRate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Host-side settings. Every field has a default so a partial file is fine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassConfig {
    // ── Location policy ──
    pub location: LocationRequest,

    // ── Preferences ──
    /// JSON preference file; in-memory preferences when unset
    pub preferences_path: Option<PathBuf>,
    /// Rate written to a fresh store before the aggregator starts
    pub initial_sample_rate: Option<SampleRate>,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            location: LocationRequest::default(),
            preferences_path: None,
            initial_sample_rate: None,
        }
    }
}

impl CompassConfig {
    pub fn load(path: impl AsRef<Path>) -> CompassResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompassError::InvalidParameters(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> CompassResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CompassError::InvalidParameters(format!("config: {}", e)))
    }
}

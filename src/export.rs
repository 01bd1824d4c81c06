use crate::direction::CardinalDirection;
use crate::display::{HeadingReadout, LocationReadout};
use crate::preferences::DisplayPreferences;
use crate::state::CompassState;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current snapshot plus what the panels would show (JSON-serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotExport {
    pub exported_at: String,
    pub state: CompassState,
    pub direction: CardinalDirection,
    pub preferences: DisplayPreferences,
    pub heading: HeadingReadout,
    pub location: LocationReadout,
}

impl SnapshotExport {
    pub fn new(state: CompassState, preferences: DisplayPreferences) -> Self {
        SnapshotExport {
            exported_at: Utc::now().to_rfc3339(),
            direction: state.direction(),
            heading: HeadingReadout::new(&state, &preferences),
            location: LocationReadout::new(&state, &preferences),
            state,
            preferences,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize to JSON bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

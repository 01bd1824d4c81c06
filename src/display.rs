//! Text readouts for the heading and location panels, filtered by the
//! display flags. Layout belongs to the host; these carry only what is shown.

use crate::format::{
    format_altitude, format_coordinate, format_degrees_with, format_magnetic_field, format_speed,
};
use crate::preferences::DisplayPreferences;
use crate::state::CompassState;
use serde::{Deserialize, Serialize};

pub const NO_HEADING_DATA: &str = "No heading data enabled";

pub const CALIBRATION_TITLE: &str = "Compass Calibration";

pub const CALIBRATION_GUIDANCE: &str = "To calibrate your compass, move your device in a \
figure-eight motion several times until the compass reading stabilizes. Ensure you are away \
from strong magnetic fields (like speakers or large metal objects).";

/// Heading panel. `None` fields are hidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingReadout {
    /// Whole degrees and sector, e.g. "99° E"
    pub heading: Option<String>,
    pub speed: Option<String>,
    pub magnetic_field: Option<String>,
    /// Rotation to apply to the needle artwork
    pub needle_rotation_degrees: f32,
}

impl HeadingReadout {
    pub fn new(state: &CompassState, prefs: &DisplayPreferences) -> Self {
        Self {
            heading: prefs.show_heading.then(|| {
                format!(
                    "{} {}",
                    format_degrees_with(state.azimuth_degrees, 0),
                    state.direction()
                )
            }),
            speed: prefs
                .show_speed
                .then(|| format_speed(state.position.speed_meters_per_second)),
            magnetic_field: prefs
                .show_magnetic_field
                .then(|| format_magnetic_field(state.magnetic_field_micro_tesla)),
            needle_rotation_degrees: -state.azimuth_degrees,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heading.is_none() && self.speed.is_none() && self.magnetic_field.is_none()
    }

    /// Divider between heading and the secondary column
    pub fn has_divider(&self) -> bool {
        self.heading.is_some() && (self.speed.is_some() || self.magnetic_field.is_some())
    }

    pub fn lines(&self) -> Vec<String> {
        if self.is_empty() {
            return vec![NO_HEADING_DATA.to_string()];
        }
        [&self.heading, &self.speed, &self.magnetic_field]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReadout {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub altitude: Option<String>,
    pub address: Option<String>,
}

impl LocationReadout {
    pub fn new(state: &CompassState, prefs: &DisplayPreferences) -> Self {
        let position = &state.position;
        Self {
            latitude: prefs
                .show_latitude
                .then(|| format_coordinate(position.latitude)),
            longitude: prefs
                .show_longitude
                .then(|| format_coordinate(position.longitude)),
            altitude: position
                .altitude
                .filter(|_| prefs.show_altitude)
                .map(format_altitude),
            address: position.address.clone().filter(|_| prefs.show_address),
        }
    }

    /// Labelled values in panel order
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (label, value) in [
            ("Latitude", &self.latitude),
            ("Longitude", &self.longitude),
            ("Altitude", &self.altitude),
        ] {
            if let Some(value) = value {
                lines.push(format!("{}: {}", label, value));
            }
        }
        if let Some(address) = &self.address {
            lines.push(address.clone());
        }
        lines
    }
}

/// Both panels, heading first
pub fn render_lines(state: &CompassState, prefs: &DisplayPreferences) -> Vec<String> {
    let mut lines = HeadingReadout::new(state, prefs).lines();
    lines.extend(LocationReadout::new(state, prefs).lines());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::PositionFix;
    use crate::orientation::OrientationSample;
    use crate::preferences::DisplayFlag;

    fn new_york() -> CompassState {
        CompassState::default()
            .with_orientation(&OrientationSample::new(98.765, 49.123))
            .with_position(PositionFix {
                latitude: 40.7128,
                longitude: -74.0060,
                altitude: Some(121.4),
                speed_meters_per_second: 1.23,
                address: Some("New York, NY, USA".to_string()),
            })
    }

    #[test]
    fn test_everything_shown_by_default() {
        let lines = render_lines(&new_york(), &DisplayPreferences::default());
        assert_eq!(
            lines,
            vec![
                "99° E",
                "1.2 m/s",
                "49.1 μT",
                "Latitude: 40.71°",
                "Longitude: -74.01°",
                "Altitude: 121.40 m",
                "New York, NY, USA",
            ]
        );
    }

    #[test]
    fn test_all_heading_flags_off() {
        let mut prefs = DisplayPreferences::default();
        prefs.set_shown(DisplayFlag::Heading, false);
        prefs.set_shown(DisplayFlag::Speed, false);
        prefs.set_shown(DisplayFlag::MagneticField, false);

        let readout = HeadingReadout::new(&new_york(), &prefs);
        assert!(readout.is_empty());
        assert!(!readout.has_divider());
        assert_eq!(readout.lines(), vec![NO_HEADING_DATA]);
    }

    #[test]
    fn test_divider_needs_heading_and_secondary() {
        let mut prefs = DisplayPreferences::default();
        prefs.set_shown(DisplayFlag::Speed, false);
        assert!(HeadingReadout::new(&new_york(), &prefs).has_divider());

        prefs.set_shown(DisplayFlag::MagneticField, false);
        assert!(!HeadingReadout::new(&new_york(), &prefs).has_divider());
    }

    #[test]
    fn test_altitude_needs_fix_and_flag() {
        let prefs = DisplayPreferences::default();
        let mut state = new_york();
        state.position.altitude = None;
        assert_eq!(LocationReadout::new(&state, &prefs).altitude, None);

        let mut hidden = prefs;
        hidden.set_shown(DisplayFlag::Altitude, false);
        assert_eq!(LocationReadout::new(&new_york(), &hidden).altitude, None);
        assert_eq!(
            LocationReadout::new(&new_york(), &prefs).altitude.as_deref(),
            Some("121.40 m")
        );
    }

    #[test]
    fn test_needle_turns_against_heading() {
        let readout = HeadingReadout::new(&new_york(), &DisplayPreferences::default());
        assert_eq!(readout.needle_rotation_degrees, -98.765);
    }

    #[test]
    fn test_no_address_no_line() {
        let mut state = new_york();
        state.position.address = None;
        let lines = LocationReadout::new(&state, &DisplayPreferences::default()).lines();
        assert_eq!(lines.len(), 3);
    }
}

use crate::direction::CardinalDirection;
use crate::location::PositionFix;
use crate::orientation::OrientationSample;
use serde::{Deserialize, Serialize};

/// Snapshot of everything the compass screen shows.
///
/// Updates never mutate a published snapshot; they build a new one with a
/// single field group replaced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompassState {
    pub azimuth_degrees: f32,
    pub magnetic_field_micro_tesla: f32,
    pub position: PositionFix,
}

impl CompassState {
    pub fn with_orientation(&self, sample: &OrientationSample) -> Self {
        Self {
            azimuth_degrees: sample.azimuth_degrees,
            magnetic_field_micro_tesla: sample.magnetic_field_micro_tesla,
            position: self.position.clone(),
        }
    }

    pub fn with_position(&self, position: PositionFix) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    pub fn without_position(&self) -> Self {
        self.with_position(PositionFix::default())
    }

    pub fn direction(&self) -> CardinalDirection {
        CardinalDirection::from_azimuth(self.azimuth_degrees)
    }
}

//! Contracts of the platform services the compass core talks to.
//!
//! The host (Android via JNI, the simulator, or a test) provides these. All
//! callbacks may arrive on any thread the host chooses.

use crate::error::CompassResult;
use crate::preferences::SampleRate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Physical sensors the orientation pipeline needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Accelerometer,
    MagneticField,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Accelerometer => write!(f, "accelerometer"),
            SensorKind::MagneticField => write!(f, "magnetometer"),
        }
    }
}

/// Raw three-axis reading delivered by the sensor service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub kind: SensorKind,
    pub values: [f32; 3],
}

impl SensorEvent {
    pub fn new(kind: SensorKind, x: f32, y: f32, z: f32) -> Self {
        Self {
            kind,
            values: [x, y, z],
        }
    }
}

/// Identifies one listener registration with a platform service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u64);

pub trait SensorListener: Send + Sync {
    fn on_sensor_changed(&self, event: &SensorEvent);
}

pub trait SensorService: Send + Sync {
    /// Whether the device has a default sensor of this kind
    fn has_sensor(&self, kind: SensorKind) -> bool;

    /// Register a listener for one sensor at the given rate tier
    fn register_listener(
        &self,
        kind: SensorKind,
        rate: SampleRate,
        listener: Arc<dyn SensorListener>,
    ) -> CompassResult<RegistrationId>;

    fn unregister_listener(&self, id: RegistrationId);
}

/// Accuracy/power trade-off requested from the location provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPriority {
    HighAccuracy,
    BalancedPowerAccuracy,
    LowPower,
}

/// Periodic location update policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationRequest {
    pub priority: LocationPriority,
    /// Target interval between fixes
    pub interval_ms: u64,
    /// Fastest rate the provider may deliver fixes at
    pub min_update_interval_ms: u64,
}

impl LocationRequest {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn min_update_interval(&self) -> Duration {
        Duration::from_millis(self.min_update_interval_ms)
    }
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            priority: LocationPriority::HighAccuracy,
            interval_ms: 2000,
            min_update_interval_ms: 1000,
        }
    }
}

/// Fix as reported by the platform, before geocoding
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: f32,
}

pub trait LocationListener: Send + Sync {
    fn on_location(&self, location: RawLocation);

    /// The provider gave up; no further fixes follow
    fn on_failure(&self, reason: &str);
}

pub trait LocationService: Send + Sync {
    fn request_updates(
        &self,
        request: &LocationRequest,
        listener: Arc<dyn LocationListener>,
    ) -> CompassResult<RegistrationId>;

    fn remove_updates(&self, id: RegistrationId);
}

/// Reverse geocoding of a coordinate into a single address line
pub trait Geocoder: Send + Sync {
    fn reverse_geocode(&self, latitude: f64, longitude: f64) -> CompassResult<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_location_request_policy() {
        let request = LocationRequest::default();
        assert_eq!(request.priority, LocationPriority::HighAccuracy);
        assert_eq!(request.interval(), Duration::from_secs(2));
        assert_eq!(request.min_update_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_location_request_partial_json() {
        let request: LocationRequest = serde_json::from_str(r#"{"interval_ms": 5000}"#).unwrap();
        assert_eq!(request.interval_ms, 5000);
        assert_eq!(request.min_update_interval_ms, 1000);
    }
}

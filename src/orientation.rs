//! Accelerometer + magnetometer fusion into a compass azimuth.

use crate::error::{CompassError, CompassResult};
use crate::platform::{SensorEvent, SensorKind, SensorListener, SensorService};
use crate::preferences::SampleRate;
use crate::subscription::{EventStream, Subscription};
use log::{debug, error, info};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Standard gravity, m/s²
pub const STANDARD_GRAVITY: f32 = 9.81;

/// Below this fraction of g² the device is treated as falling
const FREE_FALL_GRAVITY_SQUARED: f32 = 0.01 * STANDARD_GRAVITY * STANDARD_GRAVITY;

/// Horizontal field norm under which no heading is defined
const MIN_HORIZONTAL_FIELD: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrientationSample {
    /// Heading in [0, 360), 0 = magnetic north, clockwise
    pub azimuth_degrees: f32,
    pub magnetic_field_micro_tesla: f32,
}

impl OrientationSample {
    pub fn new(azimuth_degrees: f32, magnetic_field_micro_tesla: f32) -> Self {
        Self {
            azimuth_degrees,
            magnetic_field_micro_tesla,
        }
    }
}

/// Rotation from device coordinates to the world frame (east, north, up).
///
/// Rows are the east, north and up axes expressed in device coordinates.
/// Returns `None` in free fall or when gravity and the field are parallel.
pub fn rotation_matrix(gravity: &Vector3<f32>, geomagnetic: &Vector3<f32>) -> Option<Matrix3<f32>> {
    if gravity.norm_squared() < FREE_FALL_GRAVITY_SQUARED {
        return None;
    }

    let east = geomagnetic.cross(gravity);
    let east_norm = east.norm();
    if east_norm < MIN_HORIZONTAL_FIELD {
        return None;
    }
    let east = east / east_norm;
    let up = gravity.normalize();
    let north = up.cross(&east);

    Some(Matrix3::from_rows(&[
        east.transpose(),
        north.transpose(),
        up.transpose(),
    ]))
}

/// Azimuth, pitch and roll in radians
pub fn orientation_angles(rotation: &Matrix3<f32>) -> [f32; 3] {
    let azimuth = rotation[(0, 1)].atan2(rotation[(1, 1)]);
    let pitch = (-rotation[(2, 1)]).asin();
    let roll = (-rotation[(2, 0)]).atan2(rotation[(2, 2)]);
    [azimuth, pitch, roll]
}

/// Radians to a heading in [0, 360)
pub fn normalize_azimuth(radians: f32) -> f32 {
    let degrees = (radians as f64).to_degrees() as f32;
    (degrees + 360.0) % 360.0
}

/// Fixed buffers updated in place on every raw event
struct FusionBuffers {
    accelerometer: Vector3<f32>,
    magnetometer: Vector3<f32>,
    rotation: Matrix3<f32>,
}

impl FusionBuffers {
    fn new() -> Self {
        Self {
            accelerometer: Vector3::zeros(),
            magnetometer: Vector3::zeros(),
            rotation: Matrix3::zeros(),
        }
    }

    fn apply(&mut self, event: &SensorEvent) -> OrientationSample {
        let reading = Vector3::from(event.values);
        match event.kind {
            SensorKind::Accelerometer => self.accelerometer.copy_from(&reading),
            SensorKind::MagneticField => self.magnetometer.copy_from(&reading),
        }

        // A degenerate reading keeps the last good rotation
        if let Some(rotation) = rotation_matrix(&self.accelerometer, &self.magnetometer) {
            self.rotation.copy_from(&rotation);
        }

        let [azimuth, _, _] = orientation_angles(&self.rotation);
        OrientationSample::new(normalize_azimuth(azimuth), self.magnetometer.norm())
    }
}

/// Gate shared by one listener pair and its subscription.
///
/// `active` is only read or written with the buffers lock held, so once
/// cancellation flips it no emission can be running.
struct OrientationListener {
    buffers: Arc<Mutex<FusionBuffers>>,
    active: Arc<Mutex<bool>>,
    on_sample: Box<dyn Fn(OrientationSample) + Send + Sync>,
    poison_reported: AtomicBool,
}

impl OrientationListener {
    fn report_poisoned(&self, what: &str) {
        if !self.poison_reported.swap(true, Ordering::Relaxed) {
            error!("{}, orientation samples stopped", CompassError::lock(what));
        }
    }
}

impl SensorListener for OrientationListener {
    fn on_sensor_changed(&self, event: &SensorEvent) {
        let Ok(mut buffers) = self.buffers.lock() else {
            self.report_poisoned("fusion buffers");
            return;
        };
        let Ok(active) = self.active.lock() else {
            self.report_poisoned("orientation gate");
            return;
        };
        if !*active {
            return;
        }
        let sample = buffers.apply(event);
        (self.on_sample)(sample);
    }
}

/// Produces orientation samples from the platform sensor service
pub struct OrientationSampler {
    sensors: Arc<dyn SensorService>,
    buffers: Arc<Mutex<FusionBuffers>>,
}

impl OrientationSampler {
    pub fn new(sensors: Arc<dyn SensorService>) -> Self {
        Self {
            sensors,
            buffers: Arc::new(Mutex::new(FusionBuffers::new())),
        }
    }

    /// Register with both sensors at `rate`; every raw event from either
    /// yields one sample. Fails if either sensor is missing.
    pub fn subscribe<F>(&self, rate: SampleRate, on_sample: F) -> CompassResult<Subscription>
    where
        F: Fn(OrientationSample) + Send + Sync + 'static,
    {
        for kind in [SensorKind::Accelerometer, SensorKind::MagneticField] {
            if !self.sensors.has_sensor(kind) {
                return Err(CompassError::SensorUnavailable(kind));
            }
        }

        let active = Arc::new(Mutex::new(true));
        let listener: Arc<dyn SensorListener> = Arc::new(OrientationListener {
            buffers: Arc::clone(&self.buffers),
            active: Arc::clone(&active),
            on_sample: Box::new(on_sample),
            poison_reported: AtomicBool::new(false),
        });

        let accel_id =
            self.sensors
                .register_listener(SensorKind::Accelerometer, rate, Arc::clone(&listener))?;
        let mag_id = match self
            .sensors
            .register_listener(SensorKind::MagneticField, rate, listener)
        {
            Ok(id) => id,
            Err(e) => {
                self.sensors.unregister_listener(accel_id);
                return Err(e);
            }
        };
        info!("Orientation listeners registered at {} rate", rate);

        let sensors = Arc::clone(&self.sensors);
        let buffers = Arc::clone(&self.buffers);
        Ok(Subscription::new("orientation", move || {
            {
                // Waits out any emission in progress
                let _buffers = buffers.lock();
                *active.lock().unwrap_or_else(PoisonError::into_inner) = false;
            }
            sensors.unregister_listener(accel_id);
            sensors.unregister_listener(mag_id);
            debug!("Orientation listeners unregistered ({} rate)", rate);
        }))
    }

    /// Iterator form of [`OrientationSampler::subscribe`]
    pub fn stream(&self, rate: SampleRate) -> CompassResult<EventStream<OrientationSample>> {
        EventStream::open(|sink| self.subscribe(rate, move |sample| sink(sample)))
    }
}

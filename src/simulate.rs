//! Synthetic sensor and location feeds for the simulator binary.

use compass_core::{HostGeocoder, PushSensorHub, RawLocation, SampleRate, SensorKind};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, Interval};

/// Horizontal and vertical geomagnetic components (μT)
const FIELD_NORTH: f32 = 22.0;
const FIELD_DOWN: f32 = 40.0;

/// Device turns this many degrees per second
const TURN_RATE_DEG: f32 = 15.0;

const MIN_PERIOD: Duration = Duration::from_millis(5);

fn ticker(rate: SampleRate) -> Interval {
    interval(rate.nominal_period().max(MIN_PERIOD))
}

fn heading_at(t: f32) -> f32 {
    (t * TURN_RATE_DEG).to_radians()
}

/// Accelerometer of a device lying flat, with a little hand tremor
pub async fn accel_loop(hub: Arc<PushSensorHub>, mut rates: watch::Receiver<SampleRate>) {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let mut ticks = ticker(*rates.borrow_and_update());
    loop {
        ticks.tick().await;
        if rates.has_changed().unwrap_or(false) {
            ticks = ticker(*rates.borrow_and_update());
        }
        let t = COUNTER.fetch_add(1, Ordering::Relaxed) as f32 * 0.02;
        hub.push_sensor(
            SensorKind::Accelerometer,
            [
                (t * 2.0 * PI).sin() * 0.05,
                (t * 2.0 * PI).cos() * 0.03,
                9.81 + (t * PI).sin() * 0.01,
            ],
        );
    }
}

/// Magnetometer of the same device slowly turning clockwise
pub async fn mag_loop(
    hub: Arc<PushSensorHub>,
    mut rates: watch::Receiver<SampleRate>,
    started: tokio::time::Instant,
) {
    let mut ticks = ticker(*rates.borrow_and_update());
    loop {
        ticks.tick().await;
        if rates.has_changed().unwrap_or(false) {
            ticks = ticker(*rates.borrow_and_update());
        }
        let heading = heading_at(started.elapsed().as_secs_f32());
        hub.push_sensor(
            SensorKind::MagneticField,
            [
                -FIELD_NORTH * heading.sin(),
                FIELD_NORTH * heading.cos(),
                -FIELD_DOWN,
            ],
        );
    }
}

/// Walking fix every `period`, with an address for every other fix
pub async fn gps_loop(hub: Arc<PushSensorHub>, geocoder: Arc<HostGeocoder>, period: Duration) {
    let mut ticks = interval(period);
    let mut seq = 0u64;
    loop {
        ticks.tick().await;
        let step = seq as f64;
        let fix = RawLocation {
            latitude: 37.7749 + step * 0.00001,
            longitude: -122.4194 + step * 0.00001,
            altitude: (seq % 3 != 0).then_some(16.0 + (step * 0.3).sin()),
            speed: 1.4 + (step * 0.5).sin() as f32 * 0.2,
        };
        if seq % 2 == 0 {
            geocoder.provide(fix.latitude, fix.longitude, "Market St, San Francisco, CA, USA");
        }
        hub.push_location(fix);
        seq += 1;
    }
}

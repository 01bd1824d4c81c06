use crate::aggregator::{CompassAggregator, CompassSources};
use crate::error::{throw_java_exception, CompassError, CompassResult};
use crate::export::SnapshotExport;
use crate::location::{HostGeocoder, LocationSampler};
use crate::orientation::OrientationSampler;
use crate::platform::{LocationRequest, RawLocation, SensorKind};
use crate::preferences::{DisplayFlag, JsonFilePreferenceStore, PreferenceStore, SampleRate};
use crate::push::PushSensorHub;
use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jdouble, jfloat, jint, jstring, JNI_FALSE};
use jni::JNIEnv;
use log::{debug, info};
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

/// Everything one running compass needs on the Rust side
struct AndroidCompass {
    hub: Arc<PushSensorHub>,
    geocoder: Arc<HostGeocoder>,
    // Declared before the runtime so its tasks are aborted first
    aggregator: CompassAggregator,
    _runtime: Runtime,
}

impl AndroidCompass {
    fn new(preferences: Arc<dyn PreferenceStore>, request: LocationRequest) -> CompassResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("compass-prefs")
            .enable_all()
            .build()
            .map_err(|e| CompassError::Internal(format!("Failed to build runtime: {}", e)))?;

        let hub = Arc::new(PushSensorHub::new());
        let geocoder = Arc::new(HostGeocoder::new());
        let aggregator = CompassAggregator::start(
            runtime.handle(),
            CompassSources {
                orientation: OrientationSampler::new(hub.clone()),
                location: LocationSampler::new(hub.clone(), geocoder.clone(), request),
                preferences,
            },
        )?;

        Ok(Self {
            hub,
            geocoder,
            aggregator,
            _runtime: runtime,
        })
    }

    /// Addresses are only handed over while a subscription will consume them
    fn push_location(&self, fix: RawLocation, address: Option<String>) {
        if !self.aggregator.location_active() {
            debug!("Dropping fix, location updates are not running");
            return;
        }
        if let Some(address) = address {
            self.geocoder.provide(fix.latitude, fix.longitude, address);
        }
        self.hub.push_location(fix);
    }
}

// Global compass state - stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_COMPASS: Arc<Mutex<Option<Arc<AndroidCompass>>>> = Arc::new(Mutex::new(None));
}

fn get_compass() -> CompassResult<Arc<AndroidCompass>> {
    let guard = GLOBAL_COMPASS
        .lock()
        .map_err(|_| CompassError::lock("global compass"))?;
    guard.as_ref().map(Arc::clone).ok_or(CompassError::NotRunning)
}

fn new_java_string(env: &mut JNIEnv, value: &str) -> jstring {
    match env.new_string(value) {
        Ok(jstr) => jstr.into_raw(),
        Err(_) => {
            let _ = throw_java_exception(
                env,
                &CompassError::JniError("Failed to create Java string".to_string()),
            );
            std::ptr::null_mut()
        }
    }
}

fn optional_string(env: &mut JNIEnv, value: &JString) -> CompassResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    let value = env
        .get_string(value)
        .map_err(|e| CompassError::JniError(format!("Invalid Java string: {}", e)))?;
    Ok(Some(value.into()))
}

/// JNI: Start the compass with preferences persisted at `preferencesPath`
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_start(
    mut env: JNIEnv,
    _class: JClass,
    preferences_path: JString,
) -> jint {
    match start_impl(&mut env, &preferences_path) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn start_impl(env: &mut JNIEnv, preferences_path: &JString) -> CompassResult<()> {
    let _ = env_logger::try_init();

    let mut guard = GLOBAL_COMPASS
        .lock()
        .map_err(|_| CompassError::lock("global compass"))?;
    if guard.is_some() {
        return Err(CompassError::AlreadyRunning);
    }

    let path = optional_string(env, preferences_path)?.ok_or_else(|| {
        CompassError::InvalidParameters("preferences path is required".to_string())
    })?;
    let preferences: Arc<dyn PreferenceStore> = Arc::new(JsonFilePreferenceStore::open(&path)?);

    *guard = Some(Arc::new(AndroidCompass::new(
        preferences,
        LocationRequest::default(),
    )?));
    info!("Compass started (preferences at {})", path);
    Ok(())
}

/// JNI: Push accelerometer reading (m/s²)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_pushAccelerometer(
    mut env: JNIEnv,
    _class: JClass,
    x: jfloat,
    y: jfloat,
    z: jfloat,
) -> jint {
    match push_sensor_impl(SensorKind::Accelerometer, [x, y, z]) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Push magnetometer reading (μT)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_pushMagnetometer(
    mut env: JNIEnv,
    _class: JClass,
    x: jfloat,
    y: jfloat,
    z: jfloat,
) -> jint {
    match push_sensor_impl(SensorKind::MagneticField, [x, y, z]) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn push_sensor_impl(kind: SensorKind, values: [f32; 3]) -> CompassResult<()> {
    let compass = get_compass()?;
    compass.hub.push_sensor(kind, values);
    Ok(())
}

/// JNI: Push a location fix
/// Parameters: latitude, longitude, altitude (m, NaN when unknown), speed (m/s),
/// address (nullable, already reverse-geocoded by the host)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_pushLocation(
    mut env: JNIEnv,
    _class: JClass,
    latitude: jdouble,
    longitude: jdouble,
    altitude: jdouble,
    speed: jfloat,
    address: JString,
) -> jint {
    match push_location_impl(&mut env, latitude, longitude, altitude, speed, &address) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn push_location_impl(
    env: &mut JNIEnv,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    speed: f32,
    address: &JString,
) -> CompassResult<()> {
    let compass = get_compass()?;
    let address = optional_string(env, address)?;
    compass.push_location(
        RawLocation {
            latitude,
            longitude,
            altitude: (!altitude.is_nan()).then_some(altitude),
            speed,
        },
        address,
    );
    Ok(())
}

/// JNI: Report that the location provider stopped
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_pushLocationFailure(
    mut env: JNIEnv,
    _class: JClass,
    reason: JString,
) -> jint {
    match push_location_failure_impl(&mut env, &reason) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn push_location_failure_impl(env: &mut JNIEnv, reason: &JString) -> CompassResult<()> {
    let compass = get_compass()?;
    let reason = optional_string(env, reason)?.unwrap_or_else(|| "unknown".to_string());
    compass.hub.push_location_failure(&reason);
    Ok(())
}

/// JNI: Persist the sensor delay code (Fastest=0, Game=1, Ui=2, Normal=3)
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_setSampleRate(
    mut env: JNIEnv,
    _class: JClass,
    code: jint,
) -> jint {
    match set_sample_rate_impl(code) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn set_sample_rate_impl(code: i32) -> CompassResult<()> {
    let compass = get_compass()?;
    let rate = SampleRate::from_code(code as i64).ok_or_else(|| {
        CompassError::InvalidParameters(format!("Unknown sensor delay {}", code))
    })?;
    compass.aggregator.preferences().set_sample_rate(rate)
}

/// JNI: Persist one display flag by its preference key
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_setDisplayFlag(
    mut env: JNIEnv,
    _class: JClass,
    key: JString,
    enabled: jboolean,
) -> jint {
    match set_display_flag_impl(&mut env, &key, enabled != JNI_FALSE) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn set_display_flag_impl(env: &mut JNIEnv, key: &JString, enabled: bool) -> CompassResult<()> {
    let compass = get_compass()?;
    let key = optional_string(env, key)?.unwrap_or_default();
    let flag = DisplayFlag::from_key(&key)
        .ok_or_else(|| CompassError::InvalidParameters(format!("Unknown display flag {}", key)))?;
    compass.aggregator.preferences().set_flag(flag, enabled)
}

/// JNI: Start location updates once the host holds location permission
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_startLocationUpdates(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match get_compass().and_then(|compass| compass.aggregator.start_location_updates()) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Stop location updates and clear the position
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_stopLocationUpdates(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match get_compass().and_then(|compass| compass.aggregator.stop_location_updates()) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Export current snapshot as JSON string
/// Returns: JSON string or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_getStateJson(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match get_state_json_impl() {
        Ok(json) => new_java_string(&mut env, &json),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

fn get_state_json_impl() -> CompassResult<String> {
    let compass = get_compass()?;
    let export = SnapshotExport::new(
        compass.aggregator.state(),
        compass.aggregator.display_preferences(),
    );
    export
        .to_json()
        .map_err(|_| CompassError::Internal("JSON serialization failed".to_string()))
}

/// JNI: Current cardinal direction label
/// Returns: "N", "NE", ... or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_getDirection(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match get_compass() {
        Ok(compass) => {
            let label = compass.aggregator.state().direction().label();
            new_java_string(&mut env, label)
        }
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

/// JNI: Release sensors, location and background tasks
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_compass_CompassBinding_shutdown(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match shutdown_impl() {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn shutdown_impl() -> CompassResult<()> {
    let compass = GLOBAL_COMPASS
        .lock()
        .map_err(|_| CompassError::lock("global compass"))?
        .take()
        .ok_or(CompassError::NotRunning)?;
    // In-flight JNI calls may still hold a clone; the last one drops it
    drop(compass);
    info!("Compass shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferenceStore;

    fn compass() -> AndroidCompass {
        AndroidCompass::new(
            Arc::new(MemoryPreferenceStore::new()),
            LocationRequest::default(),
        )
        .unwrap()
    }

    fn fix(latitude: f64) -> RawLocation {
        RawLocation {
            latitude,
            longitude: -74.0060,
            altitude: None,
            speed: 0.0,
        }
    }

    #[test]
    fn test_address_reaches_snapshot_while_running() {
        let compass = compass();
        compass.push_location(fix(40.7128), Some("New York, NY, USA".to_string()));

        let state = compass.aggregator.state();
        assert_eq!(state.position.latitude, 40.7128);
        assert_eq!(state.position.address.as_deref(), Some("New York, NY, USA"));
        assert!(!compass.geocoder.has_pending());
    }

    #[test]
    fn test_fixes_after_stop_leave_nothing_behind() {
        let compass = compass();
        compass.aggregator.stop_location_updates().unwrap();

        for i in 0..1000 {
            compass.push_location(fix(i as f64), Some(format!("Stop {}", i)));
        }
        assert!(!compass.geocoder.has_pending());
        assert_eq!(compass.aggregator.state().position.latitude, 0.0);
    }

    #[test]
    fn test_location_resumes_after_provider_failure() {
        let compass = compass();
        compass.hub.push_location_failure("provider disabled");
        compass.push_location(fix(1.0), Some("Ignored".to_string()));
        assert!(!compass.geocoder.has_pending());

        compass.aggregator.start_location_updates().unwrap();
        compass.push_location(fix(2.0), Some("Resumed".to_string()));
        let state = compass.aggregator.state();
        assert_eq!(state.position.latitude, 2.0);
        assert_eq!(state.position.address.as_deref(), Some("Resumed"));
    }
}

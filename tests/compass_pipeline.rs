use approx::assert_relative_eq;
use compass_core::{
    render_lines, AggregatorState, CompassAggregator, CompassSources, DisplayFlag,
    HostGeocoder, JsonFilePreferenceStore, LocationRequest, LocationSampler, OrientationSampler,
    PreferenceStore, PushSensorHub, RawLocation, SampleRate, SensorKind, SnapshotExport,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;

const LEVEL: [f32; 3] = [0.0, 0.0, 9.81];

fn magnetometer_for(heading_deg: f32) -> [f32; 3] {
    let heading = heading_deg.to_radians();
    [-22.0 * heading.sin(), 22.0 * heading.cos(), -40.0]
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_pipeline_with_persisted_preferences() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compass.json");

    {
        let store = JsonFilePreferenceStore::open(&path).unwrap();
        store.set_sample_rate(SampleRate::Game).unwrap();
        store.set_flag(DisplayFlag::Address, false).unwrap();
    }

    let hub = Arc::new(PushSensorHub::new());
    let geocoder = Arc::new(HostGeocoder::new());
    let store: Arc<dyn PreferenceStore> = Arc::new(JsonFilePreferenceStore::open(&path).unwrap());
    let aggregator = CompassAggregator::start(
        &Handle::current(),
        CompassSources {
            orientation: OrientationSampler::new(hub.clone()),
            location: LocationSampler::new(hub.clone(), geocoder.clone(), LocationRequest::default()),
            preferences: store.clone(),
        },
    )
    .unwrap();

    // Stored rate is used from the first subscription on
    assert_eq!(aggregator.active_sample_rate(), Some(SampleRate::Game));
    assert_eq!(hub.registered_rates(), vec![SampleRate::Game, SampleRate::Game]);
    assert!(!aggregator.flag_enabled(DisplayFlag::Address));

    // Platform callbacks arrive on their own threads
    let sensors = hub.clone();
    thread::spawn(move || {
        for _ in 0..50 {
            sensors.push_sensor(SensorKind::Accelerometer, LEVEL);
            sensors.push_sensor(SensorKind::MagneticField, magnetometer_for(135.0));
        }
    })
    .join()
    .unwrap();

    geocoder.provide(40.7128, -74.0060, "New York, NY, USA");
    let locations = hub.clone();
    thread::spawn(move || {
        locations.push_location(RawLocation {
            latitude: 40.7128,
            longitude: -74.0060,
            altitude: Some(121.4),
            speed: 1.23,
        });
    })
    .join()
    .unwrap();

    let state = aggregator.state();
    assert_relative_eq!(state.azimuth_degrees, 135.0, epsilon = 1e-2);
    assert_eq!(state.position.address.as_deref(), Some("New York, NY, USA"));

    let lines = render_lines(&state, &aggregator.display_preferences());
    assert_eq!(lines[0], "135° SE");
    assert!(lines.contains(&"Altitude: 121.40 m".to_string()));
    assert!(!lines.iter().any(|line| line.contains("New York")));

    // Changing the rate re-subscribes exactly once
    store.set_sample_rate(SampleRate::Ui).unwrap();
    let rates = hub.clone();
    wait_for(|| rates.registered_rates() == vec![SampleRate::Ui, SampleRate::Ui]).await;
    assert_eq!(hub.active_sensor_registrations(), 2);

    hub.push_sensor(SensorKind::MagneticField, magnetometer_for(10.0));
    assert_eq!(aggregator.state().direction().label(), "N");

    aggregator.stop_location_updates().unwrap();
    assert_eq!(aggregator.lifecycle().unwrap(), AggregatorState::Stopped);
    let json = SnapshotExport::new(aggregator.state(), aggregator.display_preferences())
        .to_json()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["state"]["position"]["latitude"], 0.0);
    assert_eq!(value["preferences"]["sample_rate"], "Ui");

    aggregator.shutdown();
    assert_eq!(hub.active_sensor_registrations(), 0);
    assert_eq!(hub.active_location_registrations(), 0);

    // Persisted across the run
    let reopened = JsonFilePreferenceStore::open(&path).unwrap();
    assert_eq!(reopened.snapshot().sample_rate, SampleRate::Ui);
    assert!(!reopened.snapshot().show_address);
}

#[tokio::test]
async fn test_concurrent_sources_never_tear_snapshot() {
    let hub = Arc::new(PushSensorHub::new());
    let aggregator = CompassAggregator::start(
        &Handle::current(),
        CompassSources {
            orientation: OrientationSampler::new(hub.clone()),
            location: LocationSampler::new(
                hub.clone(),
                Arc::new(HostGeocoder::new()),
                LocationRequest::default(),
            ),
            preferences: Arc::new(compass_core::MemoryPreferenceStore::new()),
        },
    )
    .unwrap();

    let sensors = hub.clone();
    let orientation = thread::spawn(move || {
        for i in 0..200 {
            sensors.push_sensor(SensorKind::Accelerometer, LEVEL);
            sensors.push_sensor(SensorKind::MagneticField, magnetometer_for(i as f32));
        }
    });
    let locations = hub.clone();
    let location = thread::spawn(move || {
        for i in 0..200 {
            let value = i as f64;
            locations.push_location(RawLocation {
                latitude: value,
                longitude: value,
                altitude: Some(value),
                speed: i as f32,
            });
        }
    });
    orientation.join().unwrap();
    location.join().unwrap();

    let state = aggregator.state();
    // Each position group comes from a single fix
    assert_eq!(state.position.latitude, 199.0);
    assert_eq!(state.position.longitude, state.position.latitude);
    assert_eq!(state.position.altitude, Some(state.position.latitude));
    assert_relative_eq!(state.azimuth_degrees, 199.0, epsilon = 1e-2);
}

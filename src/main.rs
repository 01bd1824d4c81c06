use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use compass_core::{
    render_lines, AggregatorState, CompassAggregator, CompassConfig, CompassSources,
    HostGeocoder, JsonFilePreferenceStore, LocationSampler, MemoryPreferenceStore,
    OrientationSampler, PreferenceStore, PushSensorHub, SampleRate, SensorKind, SnapshotExport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::time::{sleep, Duration, Instant};

mod simulate;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RateArg {
    Slow,
    Normal,
    Fast,
    Fastest,
}

impl From<RateArg> for SampleRate {
    fn from(arg: RateArg) -> Self {
        match arg {
            RateArg::Slow => SampleRate::Ui,
            RateArg::Normal => SampleRate::Normal,
            RateArg::Fast => SampleRate::Game,
            RateArg::Fastest => SampleRate::Fastest,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "compass_sim")]
#[command(about = "Drive the compass core with a simulated turning device", long_about = None)]
struct Args {
    /// Duration in seconds
    #[arg(value_name = "SECONDS", default_value = "10")]
    duration: u64,

    /// Sensor rate to store before starting
    #[arg(long, value_enum)]
    rate: Option<RateArg>,

    /// Preference file (in-memory when omitted)
    #[arg(long)]
    preferences: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the location update interval
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Simulate a device without a magnetometer
    #[arg(long)]
    no_magnetometer: bool,

    /// Print JSON snapshots instead of readout lines
    #[arg(long)]
    raw: bool,

    /// Seconds after which location updates are stopped (0 = at the end)
    #[arg(long, default_value = "0")]
    stop_location_after: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CompassConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CompassConfig::default(),
    };
    if let Some(interval_ms) = args.interval_ms {
        config.location.interval_ms = interval_ms;
        config.location.min_update_interval_ms = config.location.min_update_interval_ms.min(interval_ms);
    }
    if let Some(path) = &args.preferences {
        config.preferences_path = Some(path.clone());
    }
    if let Some(rate) = args.rate {
        config.initial_sample_rate = Some(rate.into());
    }

    println!("[{}] Compass simulator starting", ts_now());
    println!("  Duration: {} seconds", args.duration);
    println!("  Location interval: {} ms", config.location.interval_ms);
    println!("  Magnetometer: {}", !args.no_magnetometer);

    let preferences: Arc<dyn PreferenceStore> = match &config.preferences_path {
        Some(path) => Arc::new(
            JsonFilePreferenceStore::open(path)
                .with_context(|| format!("opening preferences {}", path.display()))?,
        ),
        None => Arc::new(MemoryPreferenceStore::new()),
    };
    if let Some(rate) = config.initial_sample_rate {
        preferences.set_sample_rate(rate)?;
    }

    let hub = Arc::new(if args.no_magnetometer {
        PushSensorHub::with_sensors(&[SensorKind::Accelerometer])
    } else {
        PushSensorHub::new()
    });
    let geocoder = Arc::new(HostGeocoder::new());

    let aggregator = CompassAggregator::start(
        &Handle::current(),
        CompassSources {
            orientation: OrientationSampler::new(hub.clone()),
            location: LocationSampler::new(hub.clone(), geocoder.clone(), config.location.clone()),
            preferences: Arc::clone(&preferences),
        },
    )?;
    if let Some(e) = aggregator.orientation_failure().borrow().as_ref() {
        println!("[{}] Heading unavailable: {}", ts_now(), e);
    }

    // Spawn feeds (hold handles to abort them at the end)
    let started = Instant::now();
    let feeds = vec![
        tokio::spawn(simulate::accel_loop(hub.clone(), preferences.sample_rate())),
        tokio::spawn(simulate::mag_loop(hub.clone(), preferences.sample_rate(), started)),
        tokio::spawn(simulate::gps_loop(
            hub.clone(),
            geocoder.clone(),
            config.location.interval(),
        )),
    ];

    let mut updates = aggregator.subscribe_state();
    let mut snapshots = 0u64;
    let deadline = started + Duration::from_secs(args.duration);

    while Instant::now() < deadline {
        sleep(Duration::from_secs(1)).await;

        if args.stop_location_after > 0
            && started.elapsed().as_secs() >= args.stop_location_after
            && aggregator.lifecycle()? == AggregatorState::Active
        {
            aggregator.stop_location_updates()?;
            println!("[{}] Location updates stopped", ts_now());
        }

        if updates.has_changed().unwrap_or(false) {
            snapshots += 1;
        }
        let state = updates.borrow_and_update().clone();
        let prefs = aggregator.display_preferences();

        if args.raw {
            println!("{}", SnapshotExport::new(state, prefs).to_json()?);
        } else {
            println!("[{}] {}", ts_now(), render_lines(&state, &prefs).join(" | "));
        }
        if let Some(e) = aggregator.location_failure().borrow().as_ref() {
            println!("[{}] Location failed: {}", ts_now(), e);
        }
    }

    for feed in feeds {
        feed.abort();
    }
    if aggregator.lifecycle()? == AggregatorState::Active {
        aggregator.stop_location_updates()?;
    }

    let final_state = aggregator.state();
    println!("\n=== Final Stats ===");
    println!("Ticks with new state: {}", snapshots);
    println!(
        "Sample rate: {}",
        aggregator
            .active_sample_rate()
            .map(|rate| rate.display_name())
            .unwrap_or("none")
    );
    println!("Heading: {:.1}° {}", final_state.azimuth_degrees, final_state.direction());
    aggregator.shutdown();

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

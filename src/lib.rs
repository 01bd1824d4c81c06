// Compass core library
// Heading, position and display preferences for a mobile compass, driven by
// platform sensor and location callbacks. Exposed to Kotlin via JNI.

pub mod aggregator;
pub mod android_jni;
pub mod config;
pub mod direction;
pub mod display;
pub mod error;
pub mod export;
pub mod format;
pub mod location;
pub mod orientation;
pub mod platform;
pub mod preferences;
pub mod push;
pub mod state;
pub mod subscription;

pub use aggregator::{AggregatorState, CompassAggregator, CompassSources};
pub use config::CompassConfig;
pub use direction::{cardinal_direction, CardinalDirection};
pub use display::{render_lines, HeadingReadout, LocationReadout};
pub use error::{CompassError, CompassResult};
pub use export::SnapshotExport;
pub use format::{format_degrees, format_magnetic_field, format_speed};
pub use location::{HostGeocoder, LocationSampler, NoGeocoder, PositionFix};
pub use orientation::{OrientationSample, OrientationSampler};
pub use platform::{
    Geocoder, LocationRequest, LocationService, RawLocation, SensorKind, SensorService,
};
pub use preferences::{
    DisplayFlag, DisplayPreferences, JsonFilePreferenceStore, MemoryPreferenceStore,
    PreferenceStore, SampleRate,
};
pub use push::PushSensorHub;
pub use state::CompassState;
pub use subscription::{EventStream, Subscription};

//! User display preferences as observable, persisted key-value state.
//!
//! Keys are stable across versions; renaming one loses the user's setting.

use crate::error::{CompassError, CompassResult};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

pub const SAMPLE_RATE_KEY: &str = "sensor_delay";

/// Sensor delay tier requested from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    Ui,
    Normal,
    Game,
    #[default]
    Fastest,
}

impl SampleRate {
    /// Slider order, slowest first
    pub const ALL: [SampleRate; 4] = [
        SampleRate::Ui,
        SampleRate::Normal,
        SampleRate::Game,
        SampleRate::Fastest,
    ];

    /// Platform delay constant stored under `sensor_delay`
    pub fn code(self) -> i64 {
        match self {
            SampleRate::Fastest => 0,
            SampleRate::Game => 1,
            SampleRate::Ui => 2,
            SampleRate::Normal => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(SampleRate::Fastest),
            1 => Some(SampleRate::Game),
            2 => Some(SampleRate::Ui),
            3 => Some(SampleRate::Normal),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SampleRate::Fastest => "Fastest",
            SampleRate::Game => "Fast",
            SampleRate::Normal => "Normal",
            SampleRate::Ui => "Slow",
        }
    }

    pub fn slider_position(self) -> usize {
        match self {
            SampleRate::Ui => 0,
            SampleRate::Normal => 1,
            SampleRate::Game => 2,
            SampleRate::Fastest => 3,
        }
    }

    /// Unknown slider positions fall back to Normal
    pub fn from_slider_position(position: usize) -> Self {
        Self::ALL.get(position).copied().unwrap_or(SampleRate::Normal)
    }

    /// Nominal delay between sensor events at this tier
    pub fn nominal_period(self) -> Duration {
        match self {
            SampleRate::Fastest => Duration::ZERO,
            SampleRate::Game => Duration::from_millis(20),
            SampleRate::Ui => Duration::from_millis(60),
            SampleRate::Normal => Duration::from_millis(200),
        }
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Individually toggleable readouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayFlag {
    Latitude,
    Longitude,
    Altitude,
    Address,
    Heading,
    MagneticField,
    Speed,
}

impl DisplayFlag {
    pub const ALL: [DisplayFlag; 7] = [
        DisplayFlag::Latitude,
        DisplayFlag::Longitude,
        DisplayFlag::Altitude,
        DisplayFlag::Address,
        DisplayFlag::Heading,
        DisplayFlag::MagneticField,
        DisplayFlag::Speed,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DisplayFlag::Latitude => "latitude_enabled",
            DisplayFlag::Longitude => "longitude_enabled",
            DisplayFlag::Altitude => "altitude_enabled",
            DisplayFlag::Address => "address_enabled",
            DisplayFlag::Heading => "heading_enabled",
            DisplayFlag::MagneticField => "magnetic_field_enabled",
            DisplayFlag::Speed => "speed_enabled",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.key() == key)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Point-in-time copy of every preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPreferences {
    pub sample_rate: SampleRate,
    pub show_latitude: bool,
    pub show_longitude: bool,
    pub show_altitude: bool,
    pub show_address: bool,
    pub show_heading: bool,
    pub show_magnetic_field: bool,
    pub show_speed: bool,
}

impl DisplayPreferences {
    pub fn is_shown(&self, flag: DisplayFlag) -> bool {
        match flag {
            DisplayFlag::Latitude => self.show_latitude,
            DisplayFlag::Longitude => self.show_longitude,
            DisplayFlag::Altitude => self.show_altitude,
            DisplayFlag::Address => self.show_address,
            DisplayFlag::Heading => self.show_heading,
            DisplayFlag::MagneticField => self.show_magnetic_field,
            DisplayFlag::Speed => self.show_speed,
        }
    }

    pub fn set_shown(&mut self, flag: DisplayFlag, shown: bool) {
        let slot = match flag {
            DisplayFlag::Latitude => &mut self.show_latitude,
            DisplayFlag::Longitude => &mut self.show_longitude,
            DisplayFlag::Altitude => &mut self.show_altitude,
            DisplayFlag::Address => &mut self.show_address,
            DisplayFlag::Heading => &mut self.show_heading,
            DisplayFlag::MagneticField => &mut self.show_magnetic_field,
            DisplayFlag::Speed => &mut self.show_speed,
        };
        *slot = shown;
    }
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::default(),
            show_latitude: true,
            show_longitude: true,
            show_altitude: true,
            show_address: true,
            show_heading: true,
            show_magnetic_field: true,
            show_speed: true,
        }
    }
}

/// Observable preference storage.
///
/// Every field is its own observable so a change to one does not wake
/// observers of another.
pub trait PreferenceStore: Send + Sync {
    fn sample_rate(&self) -> watch::Receiver<SampleRate>;
    fn flag(&self, flag: DisplayFlag) -> watch::Receiver<bool>;
    fn set_sample_rate(&self, rate: SampleRate) -> CompassResult<()>;
    fn set_flag(&self, flag: DisplayFlag, enabled: bool) -> CompassResult<()>;

    fn snapshot(&self) -> DisplayPreferences {
        let mut prefs = DisplayPreferences {
            sample_rate: *self.sample_rate().borrow(),
            ..DisplayPreferences::default()
        };
        for flag in DisplayFlag::ALL {
            prefs.set_shown(flag, *self.flag(flag).borrow());
        }
        prefs
    }
}

/// Watch channels behind a store. Publishing only notifies on a real change.
struct PreferenceCells {
    sample_rate: watch::Sender<SampleRate>,
    flags: Vec<watch::Sender<bool>>,
}

impl PreferenceCells {
    fn new(initial: &DisplayPreferences) -> Self {
        Self {
            sample_rate: watch::Sender::new(initial.sample_rate),
            flags: DisplayFlag::ALL
                .iter()
                .map(|flag| watch::Sender::new(initial.is_shown(*flag)))
                .collect(),
        }
    }

    fn publish_rate(&self, rate: SampleRate) {
        self.sample_rate.send_if_modified(|current| {
            if *current == rate {
                return false;
            }
            *current = rate;
            true
        });
    }

    fn publish_flag(&self, flag: DisplayFlag, enabled: bool) {
        self.flags[flag.index()].send_if_modified(|current| {
            if *current == enabled {
                return false;
            }
            *current = enabled;
            true
        });
    }
}

/// Volatile store, used by tests and the simulator
pub struct MemoryPreferenceStore {
    cells: PreferenceCells,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::with_preferences(DisplayPreferences::default())
    }

    pub fn with_preferences(initial: DisplayPreferences) -> Self {
        Self {
            cells: PreferenceCells::new(&initial),
        }
    }
}

impl Default for MemoryPreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn sample_rate(&self) -> watch::Receiver<SampleRate> {
        self.cells.sample_rate.subscribe()
    }

    fn flag(&self, flag: DisplayFlag) -> watch::Receiver<bool> {
        self.cells.flags[flag.index()].subscribe()
    }

    fn set_sample_rate(&self, rate: SampleRate) -> CompassResult<()> {
        self.cells.publish_rate(rate);
        Ok(())
    }

    fn set_flag(&self, flag: DisplayFlag, enabled: bool) -> CompassResult<()> {
        self.cells.publish_flag(flag, enabled);
        Ok(())
    }
}

/// Store persisted as one flat JSON object.
///
/// Keys this crate does not know are kept untouched on rewrite.
pub struct JsonFilePreferenceStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    cells: PreferenceCells,
}

impl JsonFilePreferenceStore {
    /// Open the store at `path`. A missing file means all defaults.
    pub fn open(path: impl AsRef<Path>) -> CompassResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(CompassError::StorageError(format!(
                        "{} does not hold a JSON object",
                        path.display()
                    )))
                }
                Err(e) => {
                    return Err(CompassError::StorageError(format!(
                        "failed to parse {}: {}",
                        path.display(),
                        e
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No preferences at {}, using defaults", path.display());
                Map::new()
            }
            Err(e) => {
                return Err(CompassError::StorageError(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let initial = decode(&values);
        Ok(Self {
            path,
            values: Mutex::new(values),
            cells: PreferenceCells::new(&initial),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `key` to disk, then run `publish` while the values lock is held.
    ///
    /// The in-memory map only takes the new value once the file rename
    /// succeeded, so a failed write leaves both map and file untouched.
    fn persist(&self, key: &str, value: Value, publish: impl FnOnce()) -> CompassResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| CompassError::lock("preference values"))?;
        let mut next = values.clone();
        next.insert(key.to_string(), value);

        let json = serde_json::to_vec_pretty(&next)
            .map_err(|e| CompassError::StorageError(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                CompassError::StorageError(format!("failed to write {}: {}", self.path.display(), e))
            })?;

        *values = next;
        publish();
        debug!("Persisted {} to {}", key, self.path.display());
        Ok(())
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn sample_rate(&self) -> watch::Receiver<SampleRate> {
        self.cells.sample_rate.subscribe()
    }

    fn flag(&self, flag: DisplayFlag) -> watch::Receiver<bool> {
        self.cells.flags[flag.index()].subscribe()
    }

    fn set_sample_rate(&self, rate: SampleRate) -> CompassResult<()> {
        self.persist(SAMPLE_RATE_KEY, Value::from(rate.code()), || {
            self.cells.publish_rate(rate)
        })
    }

    fn set_flag(&self, flag: DisplayFlag, enabled: bool) -> CompassResult<()> {
        self.persist(flag.key(), Value::Bool(enabled), || {
            self.cells.publish_flag(flag, enabled)
        })
    }
}

/// Read known keys, defaulting anything missing or mistyped
fn decode(values: &Map<String, Value>) -> DisplayPreferences {
    let mut prefs = DisplayPreferences::default();

    if let Some(value) = values.get(SAMPLE_RATE_KEY) {
        match value.as_i64().and_then(SampleRate::from_code) {
            Some(rate) => prefs.sample_rate = rate,
            None => warn!("Ignoring invalid {} value {}", SAMPLE_RATE_KEY, value),
        }
    }

    for flag in DisplayFlag::ALL {
        if let Some(value) = values.get(flag.key()) {
            match value.as_bool() {
                Some(enabled) => prefs.set_shown(flag, enabled),
                None => warn!("Ignoring invalid {} value {}", flag.key(), value),
            }
        }
    }

    prefs
}

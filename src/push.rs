//! In-process platform services fed by pushed events.
//!
//! A host that receives sensor and location callbacks itself (the JNI
//! bridge, the simulator, tests) pushes them here and the hub fans them out
//! to whatever the compass core has registered.

use crate::error::{CompassError, CompassResult};
use crate::platform::{
    LocationListener, LocationRequest, LocationService, RawLocation, RegistrationId, SensorEvent,
    SensorKind, SensorListener, SensorService,
};
use crate::preferences::SampleRate;
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct SensorRegistration {
    kind: SensorKind,
    rate: SampleRate,
    listener: Arc<dyn SensorListener>,
}

struct LocationRegistration {
    request: LocationRequest,
    listener: Arc<dyn LocationListener>,
}

struct HubInner {
    available: HashSet<SensorKind>,
    sensor_listeners: BTreeMap<RegistrationId, SensorRegistration>,
    location_listeners: BTreeMap<RegistrationId, LocationRegistration>,
    failing_sensor: Option<SensorKind>,
    location_denied: Option<String>,
}

pub struct PushSensorHub {
    inner: Mutex<HubInner>,
    next_id: AtomicU64,
}

impl PushSensorHub {
    /// Hub with both compass sensors present
    pub fn new() -> Self {
        Self::with_sensors(&[SensorKind::Accelerometer, SensorKind::MagneticField])
    }

    pub fn with_sensors(available: &[SensorKind]) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                available: available.iter().copied().collect(),
                sensor_listeners: BTreeMap::new(),
                location_listeners: BTreeMap::new(),
                failing_sensor: None,
                location_denied: None,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add or remove a sensor, e.g. one that shows up after a driver reload
    pub fn set_sensor_available(&self, kind: SensorKind, available: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            if available {
                inner.available.insert(kind);
            } else {
                inner.available.remove(&kind);
            }
        }
    }

    /// Make registration for `kind` fail while it is set
    pub fn fail_registrations_for(&self, kind: Option<SensorKind>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_sensor = kind;
        }
    }

    /// Refuse location registration with `reason`, e.g. missing permission
    pub fn deny_location(&self, reason: Option<&str>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.location_denied = reason.map(str::to_string);
        }
    }

    /// Deliver a sensor reading to every listener registered for its kind
    pub fn push_sensor(&self, kind: SensorKind, values: [f32; 3]) {
        let event = SensorEvent { kind, values };
        let listeners: Vec<Arc<dyn SensorListener>> = match self.inner.lock() {
            Ok(inner) => inner
                .sensor_listeners
                .values()
                .filter(|reg| reg.kind == kind)
                .map(|reg| Arc::clone(&reg.listener))
                .collect(),
            Err(_) => return,
        };
        // Dispatch outside the lock so listeners may unregister
        for listener in listeners {
            listener.on_sensor_changed(&event);
        }
    }

    pub fn push_location(&self, location: RawLocation) {
        for listener in self.location_listeners() {
            listener.on_location(location);
        }
    }

    pub fn push_location_failure(&self, reason: &str) {
        for listener in self.location_listeners() {
            listener.on_failure(reason);
        }
    }

    pub fn active_sensor_registrations(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.sensor_listeners.len())
            .unwrap_or(0)
    }

    /// Rates of live sensor registrations, in registration order
    pub fn registered_rates(&self) -> Vec<SampleRate> {
        self.inner
            .lock()
            .map(|inner| inner.sensor_listeners.values().map(|reg| reg.rate).collect())
            .unwrap_or_default()
    }

    pub fn active_location_registrations(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.location_listeners.len())
            .unwrap_or(0)
    }

    pub fn location_requests(&self) -> Vec<LocationRequest> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .location_listeners
                    .values()
                    .map(|reg| reg.request.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn location_listeners(&self) -> Vec<Arc<dyn LocationListener>> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .location_listeners
                    .values()
                    .map(|reg| Arc::clone(&reg.listener))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn allocate_id(&self) -> RegistrationId {
        RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PushSensorHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorService for PushSensorHub {
    fn has_sensor(&self, kind: SensorKind) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.available.contains(&kind))
            .unwrap_or(false)
    }

    fn register_listener(
        &self,
        kind: SensorKind,
        rate: SampleRate,
        listener: Arc<dyn SensorListener>,
    ) -> CompassResult<RegistrationId> {
        let mut inner = self.inner.lock().map_err(|_| CompassError::lock("sensor hub"))?;
        if !inner.available.contains(&kind) {
            return Err(CompassError::SensorUnavailable(kind));
        }
        if inner.failing_sensor == Some(kind) {
            return Err(CompassError::Internal(format!(
                "{} registration rejected",
                kind
            )));
        }
        let id = self.allocate_id();
        inner
            .sensor_listeners
            .insert(id, SensorRegistration { kind, rate, listener });
        debug!("Registered {} listener {:?} at {}", kind, id, rate);
        Ok(id)
    }

    fn unregister_listener(&self, id: RegistrationId) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.sensor_listeners.remove(&id).is_some() {
                debug!("Unregistered sensor listener {:?}", id);
            }
        }
    }
}

impl LocationService for PushSensorHub {
    fn request_updates(
        &self,
        request: &LocationRequest,
        listener: Arc<dyn LocationListener>,
    ) -> CompassResult<RegistrationId> {
        let mut inner = self.inner.lock().map_err(|_| CompassError::lock("sensor hub"))?;
        if let Some(reason) = &inner.location_denied {
            return Err(CompassError::LocationProviderFailure(reason.clone()));
        }
        let id = self.allocate_id();
        inner.location_listeners.insert(
            id,
            LocationRegistration {
                request: request.clone(),
                listener,
            },
        );
        debug!(
            "Location updates requested {:?} every {}ms",
            id, request.interval_ms
        );
        Ok(id)
    }

    fn remove_updates(&self, id: RegistrationId) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.location_listeners.remove(&id).is_some() {
                debug!("Location updates removed {:?}", id);
            }
        }
    }
}

//! Position fixes from the platform location provider.

use crate::error::{CompassError, CompassResult};
use crate::platform::{Geocoder, LocationListener, LocationRequest, LocationService, RawLocation};
use crate::subscription::{EventStream, Subscription};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed_meters_per_second: f32,
    pub address: Option<String>,
}

impl PositionFix {
    pub fn has_altitude(&self) -> bool {
        self.altitude.is_some()
    }

    fn from_raw(raw: RawLocation, address: Option<String>) -> Self {
        Self {
            latitude: raw.latitude,
            longitude: raw.longitude,
            altitude: raw.altitude,
            speed_meters_per_second: raw.speed,
            address,
        }
    }
}

/// Geocoder that never resolves an address
pub struct NoGeocoder;

impl Geocoder for NoGeocoder {
    fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> CompassResult<Option<String>> {
        Ok(None)
    }
}

/// Address resolved by the host and handed over before the fix is pushed.
///
/// Only the latest entry is kept, keyed by its exact coordinates, and it is
/// consumed by the lookup for those coordinates.
#[derive(Default)]
pub struct HostGeocoder {
    pending: Mutex<Option<((u64, u64), String)>>,
}

impl HostGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any address not yet looked up
    pub fn provide(&self, latitude: f64, longitude: f64, address: impl Into<String>) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some((key(latitude, longitude), address.into()));
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.is_some())
            .unwrap_or(false)
    }
}

fn key(latitude: f64, longitude: f64) -> (u64, u64) {
    (latitude.to_bits(), longitude.to_bits())
}

impl Geocoder for HostGeocoder {
    fn reverse_geocode(&self, latitude: f64, longitude: f64) -> CompassResult<Option<String>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| CompassError::lock("geocoder"))?;
        let wanted = key(latitude, longitude);
        match pending.take() {
            Some((at, address)) if at == wanted => Ok(Some(address)),
            other => {
                *pending = other;
                Ok(None)
            }
        }
    }
}

/// Best-effort address lookup; any failure or blank result is `None`
fn lookup_address(geocoder: &dyn Geocoder, raw: &RawLocation) -> Option<String> {
    match geocoder.reverse_geocode(raw.latitude, raw.longitude) {
        Ok(Some(address)) if !address.trim().is_empty() => Some(address),
        Ok(_) => None,
        Err(e) => {
            debug!("Reverse geocode failed, continuing without address: {}", e);
            None
        }
    }
}

type FixCallback = Box<dyn Fn(CompassResult<PositionFix>) + Send + Sync>;

/// `open` is held across geocoding and delivery so fixes leave in the order
/// they arrived and nothing is delivered after cancellation.
struct PositionListener {
    geocoder: Arc<dyn Geocoder>,
    open: Arc<Mutex<bool>>,
    on_fix: FixCallback,
}

impl LocationListener for PositionListener {
    fn on_location(&self, location: RawLocation) {
        let Ok(open) = self.open.lock() else {
            return;
        };
        if !*open {
            return;
        }
        let address = lookup_address(self.geocoder.as_ref(), &location);
        (self.on_fix)(Ok(PositionFix::from_raw(location, address)));
    }

    fn on_failure(&self, reason: &str) {
        let Ok(mut open) = self.open.lock() else {
            return;
        };
        if !*open {
            return;
        }
        *open = false;
        warn!("Location provider failed: {}", reason);
        (self.on_fix)(Err(CompassError::LocationProviderFailure(reason.to_string())));
    }
}

pub struct LocationSampler {
    service: Arc<dyn LocationService>,
    geocoder: Arc<dyn Geocoder>,
    request: LocationRequest,
}

impl LocationSampler {
    pub fn new(
        service: Arc<dyn LocationService>,
        geocoder: Arc<dyn Geocoder>,
        request: LocationRequest,
    ) -> Self {
        Self {
            service,
            geocoder,
            request,
        }
    }

    pub fn request(&self) -> &LocationRequest {
        &self.request
    }

    /// Start periodic updates. Caller must hold location permission.
    ///
    /// A provider failure is delivered once as `Err` and ends the sequence.
    pub fn subscribe<F>(&self, on_fix: F) -> CompassResult<Subscription>
    where
        F: Fn(CompassResult<PositionFix>) + Send + Sync + 'static,
    {
        let open = Arc::new(Mutex::new(true));
        let listener = Arc::new(PositionListener {
            geocoder: Arc::clone(&self.geocoder),
            open: Arc::clone(&open),
            on_fix: Box::new(on_fix),
        });

        let id = self.service.request_updates(&self.request, listener)?;
        info!(
            "Location updates started ({}ms interval, {}ms min)",
            self.request.interval_ms, self.request.min_update_interval_ms
        );

        let service = Arc::clone(&self.service);
        Ok(Subscription::new("location", move || {
            if let Ok(mut open) = open.lock() {
                *open = false;
            }
            service.remove_updates(id);
        }))
    }

    /// Iterator form of [`LocationSampler::subscribe`]
    pub fn stream(&self) -> CompassResult<EventStream<CompassResult<PositionFix>>> {
        EventStream::open(|sink| self.subscribe(move |fix| sink(fix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::PushSensorHub;

    struct FailingGeocoder;

    impl Geocoder for FailingGeocoder {
        fn reverse_geocode(&self, _lat: f64, _lon: f64) -> CompassResult<Option<String>> {
            Err(CompassError::GeocodeLookupFailure("service not available".to_string()))
        }
    }

    struct FixedGeocoder(&'static str);

    impl Geocoder for FixedGeocoder {
        fn reverse_geocode(&self, _lat: f64, _lon: f64) -> CompassResult<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn nyc() -> RawLocation {
        RawLocation {
            latitude: 40.7128,
            longitude: -74.0060,
            altitude: Some(121.4),
            speed: 1.5,
        }
    }

    #[test]
    fn test_fix_carries_geocoded_address() {
        let hub = Arc::new(PushSensorHub::new());
        let sampler = LocationSampler::new(
            hub.clone(),
            Arc::new(FixedGeocoder("New York, NY, USA")),
            LocationRequest::default(),
        );
        let stream = sampler.stream().unwrap();

        hub.push_location(nyc());
        let fix = stream.try_next().unwrap().unwrap();
        assert_eq!(fix.latitude, 40.7128);
        assert_eq!(fix.altitude, Some(121.4));
        assert!(fix.has_altitude());
        assert_eq!(fix.speed_meters_per_second, 1.5);
        assert_eq!(fix.address.as_deref(), Some("New York, NY, USA"));
    }

    #[test]
    fn test_geocode_failure_and_blank_address_yield_none() {
        let hub = Arc::new(PushSensorHub::new());
        let failing = LocationSampler::new(
            hub.clone(),
            Arc::new(FailingGeocoder),
            LocationRequest::default(),
        );
        let blank = LocationSampler::new(
            hub.clone(),
            Arc::new(FixedGeocoder("   ")),
            LocationRequest::default(),
        );
        let failing_stream = failing.stream().unwrap();
        let blank_stream = blank.stream().unwrap();

        hub.push_location(nyc());
        assert_eq!(failing_stream.try_next().unwrap().unwrap().address, None);
        assert_eq!(blank_stream.try_next().unwrap().unwrap().address, None);
    }

    #[test]
    fn test_host_geocoder_consumes_matching_entry() {
        let geocoder = HostGeocoder::new();
        geocoder.provide(1.0, 2.0, "Somewhere");
        assert_eq!(geocoder.reverse_geocode(1.0, 2.5).unwrap(), None);
        assert_eq!(
            geocoder.reverse_geocode(1.0, 2.0).unwrap().as_deref(),
            Some("Somewhere")
        );
        assert_eq!(geocoder.reverse_geocode(1.0, 2.0).unwrap(), None);
        assert!(!geocoder.has_pending());
    }

    #[test]
    fn test_host_geocoder_keeps_only_latest_address() {
        let geocoder = HostGeocoder::new();
        for i in 0..1000 {
            geocoder.provide(i as f64, 0.0, format!("Stop {}", i));
        }
        assert_eq!(geocoder.reverse_geocode(0.0, 0.0).unwrap(), None);
        assert_eq!(
            geocoder.reverse_geocode(999.0, 0.0).unwrap().as_deref(),
            Some("Stop 999")
        );
        assert!(!geocoder.has_pending());
    }

    #[test]
    fn test_provider_failure_ends_sequence() {
        let hub = Arc::new(PushSensorHub::new());
        let sampler =
            LocationSampler::new(hub.clone(), Arc::new(NoGeocoder), LocationRequest::default());
        let stream = sampler.stream().unwrap();

        hub.push_location_failure("provider disabled");
        hub.push_location(nyc());
        hub.push_location_failure("again");

        assert_eq!(
            stream.try_next().unwrap(),
            Err(CompassError::LocationProviderFailure("provider disabled".to_string()))
        );
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_cancel_removes_updates() {
        let hub = Arc::new(PushSensorHub::new());
        let request = LocationRequest {
            interval_ms: 5000,
            ..LocationRequest::default()
        };
        let sampler = LocationSampler::new(hub.clone(), Arc::new(NoGeocoder), request.clone());
        let mut stream = sampler.stream().unwrap();
        assert_eq!(hub.location_requests(), vec![request]);

        stream.cancel();
        assert_eq!(hub.active_location_registrations(), 0);
        hub.push_location(nyc());
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_registration_failure_is_returned() {
        let hub = Arc::new(PushSensorHub::new());
        hub.deny_location(Some("permission denied"));
        let sampler =
            LocationSampler::new(hub.clone(), Arc::new(NoGeocoder), LocationRequest::default());
        assert!(matches!(
            sampler.subscribe(|_| {}),
            Err(CompassError::LocationProviderFailure(_))
        ));
    }
}

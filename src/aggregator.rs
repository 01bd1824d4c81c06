//! Merges orientation, location and preferences into one observable
//! [`CompassState`].
//!
//! Sensor and location callbacks publish straight from whatever thread the
//! platform delivers on. Preference changes are followed by tasks spawned on
//! the runtime handle passed to [`CompassAggregator::start`].

use crate::error::{CompassError, CompassResult};
use crate::location::LocationSampler;
use crate::orientation::OrientationSampler;
use crate::preferences::{DisplayFlag, DisplayPreferences, PreferenceStore, SampleRate};
use crate::state::CompassState;
use crate::subscription::Subscription;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Aggregator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregatorState {
    /// Subscriptions being set up
    Initializing,
    /// Steady state
    Active,
    /// Location stopped for good; orientation still flows
    Stopped,
}

/// Everything the aggregator consumes
pub struct CompassSources {
    pub orientation: OrientationSampler,
    pub location: LocationSampler,
    pub preferences: Arc<dyn PreferenceStore>,
}

/// Holds the one live orientation subscription and swaps it on rate change
struct OrientationSwitch {
    sampler: OrientationSampler,
    current: Mutex<Option<(SampleRate, Subscription)>>,
    state: Arc<watch::Sender<CompassState>>,
    failure: Arc<watch::Sender<Option<CompassError>>>,
}

impl OrientationSwitch {
    /// Cancel the current subscription, then subscribe at `rate`.
    ///
    /// A failed subscribe leaves no subscription and the snapshot as it was.
    fn replace(&self, rate: SampleRate) -> CompassResult<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| CompassError::lock("orientation subscription"))?;

        if let Some((old_rate, old)) = current.take() {
            old.cancel();
            info!("Orientation resubscribing: {} -> {}", old_rate, rate);
        }

        let state = Arc::clone(&self.state);
        let subscribed = self.sampler.subscribe(rate, move |sample| {
            state.send_modify(|snapshot| *snapshot = snapshot.with_orientation(&sample));
        });

        match subscribed {
            Ok(subscription) => {
                *current = Some((rate, subscription));
                self.failure.send_replace(None);
            }
            Err(e) => {
                error!("Orientation unavailable, heading frozen: {}", e);
                self.failure.send_replace(Some(e));
            }
        }
        Ok(())
    }

    fn active_rate(&self) -> Option<SampleRate> {
        self.current
            .lock()
            .ok()
            .and_then(|current| current.as_ref().map(|(rate, _)| *rate))
    }

    fn release(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some((_, subscription)) = current.take() {
                subscription.cancel();
            }
        }
    }
}

pub struct CompassAggregator {
    state: Arc<watch::Sender<CompassState>>,
    lifecycle: Mutex<AggregatorState>,
    orientation: Arc<OrientationSwitch>,
    location_sampler: LocationSampler,
    location: Arc<Mutex<Option<Subscription>>>,
    location_failure: Arc<watch::Sender<Option<CompassError>>>,
    flags: Vec<watch::Sender<bool>>,
    preferences: Arc<dyn PreferenceStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl CompassAggregator {
    /// Subscribe to every source and go Active.
    ///
    /// Orientation at the currently stored rate and location are subscribed
    /// before this returns. A missing orientation sensor only freezes the
    /// heading; a location registration failure is returned.
    pub fn start(runtime: &Handle, sources: CompassSources) -> CompassResult<Self> {
        let CompassSources {
            orientation,
            location,
            preferences,
        } = sources;

        let state = Arc::new(watch::Sender::new(CompassState::default()));
        let orientation = Arc::new(OrientationSwitch {
            sampler: orientation,
            current: Mutex::new(None),
            state: Arc::clone(&state),
            failure: Arc::new(watch::Sender::new(None)),
        });

        let mut aggregator = Self {
            state,
            lifecycle: Mutex::new(AggregatorState::Initializing),
            orientation,
            location_sampler: location,
            location: Arc::new(Mutex::new(None)),
            location_failure: Arc::new(watch::Sender::new(None)),
            flags: Vec::with_capacity(DisplayFlag::ALL.len()),
            preferences,
            tasks: Vec::new(),
        };

        let mut rate_rx = aggregator.preferences.sample_rate();
        let initial_rate = *rate_rx.borrow_and_update();
        aggregator.orientation.replace(initial_rate)?;
        aggregator.tasks.push(runtime.spawn(follow_sample_rate(
            rate_rx,
            Arc::clone(&aggregator.orientation),
        )));

        aggregator.subscribe_location()?;

        for flag in DisplayFlag::ALL {
            let mut source = aggregator.preferences.flag(flag);
            let mirror = watch::Sender::new(*source.borrow_and_update());
            aggregator
                .tasks
                .push(runtime.spawn(mirror_flag(flag, source, mirror.clone())));
            aggregator.flags.push(mirror);
        }

        aggregator.set_lifecycle(AggregatorState::Active)?;
        info!("Compass aggregator active");
        Ok(aggregator)
    }

    /// Latest snapshot
    pub fn state(&self) -> CompassState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CompassState> {
        self.state.subscribe()
    }

    pub fn lifecycle(&self) -> CompassResult<AggregatorState> {
        let lifecycle = self
            .lifecycle
            .lock()
            .map_err(|_| CompassError::lock("lifecycle"))?;
        Ok(*lifecycle)
    }

    /// Mirrored display flag, observable on its own
    pub fn flag(&self, flag: DisplayFlag) -> watch::Receiver<bool> {
        self.flags[flag as usize].subscribe()
    }

    pub fn flag_enabled(&self, flag: DisplayFlag) -> bool {
        *self.flags[flag as usize].borrow()
    }

    pub fn display_preferences(&self) -> DisplayPreferences {
        let mut prefs = DisplayPreferences {
            sample_rate: *self.preferences.sample_rate().borrow(),
            ..DisplayPreferences::default()
        };
        for flag in DisplayFlag::ALL {
            prefs.set_shown(flag, self.flag_enabled(flag));
        }
        prefs
    }

    pub fn preferences(&self) -> &Arc<dyn PreferenceStore> {
        &self.preferences
    }

    /// Rate of the live orientation subscription, if any
    pub fn active_sample_rate(&self) -> Option<SampleRate> {
        self.orientation.active_rate()
    }

    /// Last orientation subscribe failure; cleared by a successful resubscribe
    pub fn orientation_failure(&self) -> watch::Receiver<Option<CompassError>> {
        self.orientation.failure.subscribe()
    }

    pub fn location_failure(&self) -> watch::Receiver<Option<CompassError>> {
        self.location_failure.subscribe()
    }

    /// Whether a location subscription is registered and has not failed
    pub fn location_active(&self) -> bool {
        let subscribed = self
            .location
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        subscribed && self.location_failure.borrow().is_none()
    }

    /// Resume location after the caller obtained permission
    pub fn start_location_updates(&self) -> CompassResult<()> {
        // Held across the subscribe; a stop must not interleave
        let lifecycle = self
            .lifecycle
            .lock()
            .map_err(|_| CompassError::lock("lifecycle"))?;
        match *lifecycle {
            AggregatorState::Active => self.subscribe_location(),
            AggregatorState::Stopped => Err(CompassError::InvalidState(
                "location updates were stopped".to_string(),
            )),
            AggregatorState::Initializing => Err(CompassError::InvalidState(
                "aggregator not started".to_string(),
            )),
        }
    }

    /// Cancel location and clear the position. Heading is left as is.
    pub fn stop_location_updates(&self) -> CompassResult<()> {
        {
            let mut lifecycle = self
                .lifecycle
                .lock()
                .map_err(|_| CompassError::lock("lifecycle"))?;
            match *lifecycle {
                AggregatorState::Active => *lifecycle = AggregatorState::Stopped,
                AggregatorState::Stopped => return Err(CompassError::NotRunning),
                AggregatorState::Initializing => {
                    return Err(CompassError::InvalidState(
                        "aggregator not started".to_string(),
                    ))
                }
            }
        }

        let subscription = self
            .location
            .lock()
            .map_err(|_| CompassError::lock("location subscription"))?
            .take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
        self.state
            .send_modify(|snapshot| *snapshot = snapshot.without_position());
        info!("Location updates stopped");
        Ok(())
    }

    /// Release every subscription and stop following preferences
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn subscribe_location(&self) -> CompassResult<()> {
        let mut slot = self
            .location
            .lock()
            .map_err(|_| CompassError::lock("location subscription"))?;
        if slot.is_some() {
            // A subscription whose provider failed is finished; replace it
            if self.location_failure.borrow().is_none() {
                return Err(CompassError::AlreadyRunning);
            }
            if let Some(finished) = slot.take() {
                finished.cancel();
            }
        }

        // Cleared first: the provider may fail before subscribe returns
        self.location_failure.send_replace(None);

        let state = Arc::clone(&self.state);
        let failure = Arc::clone(&self.location_failure);
        let subscription = self.location_sampler.subscribe(move |fix| match fix {
            Ok(position) => {
                state.send_modify(|snapshot| *snapshot = snapshot.with_position(position));
            }
            Err(e) => {
                error!("Location stream ended: {}", e);
                failure.send_replace(Some(e));
            }
        })?;

        *slot = Some(subscription);
        Ok(())
    }

    fn set_lifecycle(&self, next: AggregatorState) -> CompassResult<()> {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .map_err(|_| CompassError::lock("lifecycle"))?;
        *lifecycle = next;
        Ok(())
    }

    fn teardown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.orientation.release();
        if let Ok(mut location) = self.location.lock() {
            if let Some(subscription) = location.take() {
                subscription.cancel();
            }
        }
    }
}

impl Drop for CompassAggregator {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Switch-latest: each new rate replaces the orientation subscription
async fn follow_sample_rate(mut rates: watch::Receiver<SampleRate>, switch: Arc<OrientationSwitch>) {
    while rates.changed().await.is_ok() {
        let rate = *rates.borrow_and_update();
        if let Err(e) = switch.replace(rate) {
            warn!("Could not switch orientation to {}: {}", rate, e);
        }
    }
}

async fn mirror_flag(
    flag: DisplayFlag,
    mut source: watch::Receiver<bool>,
    mirror: watch::Sender<bool>,
) {
    while source.changed().await.is_ok() {
        let enabled = *source.borrow_and_update();
        let changed = mirror.send_if_modified(|current| {
            if *current == enabled {
                return false;
            }
            *current = enabled;
            true
        });
        if changed {
            info!("{} -> {}", flag.key(), enabled);
        }
    }
}

//! Cancelable subscriptions over callback-driven platform services.
//!
//! A [`Subscription`] owns the release action of whatever it registered.
//! Release runs exactly once: on [`Subscription::cancel`] or on drop.

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use log::debug;
use std::time::Duration;

pub struct Subscription {
    name: &'static str,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(name: &'static str, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name,
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Release the underlying registration. Returns once the source has
    /// stopped delivering.
    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            debug!("[{}] subscription released", self.name);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Pull-style view of a subscription: an unbounded channel fed by the
/// callback, iterated until cancelled.
pub struct EventStream<T> {
    receiver: Receiver<T>,
    subscription: Option<Subscription>,
}

impl<T: Send + 'static> EventStream<T> {
    /// Wire `subscribe` to a channel. The callback handed to `subscribe`
    /// forwards every event into the stream.
    pub fn open<E>(
        subscribe: impl FnOnce(Box<dyn Fn(T) + Send + Sync>) -> Result<Subscription, E>,
    ) -> Result<Self, E> {
        let (tx, rx) = channel::unbounded();
        let subscription = subscribe(Box::new(move |event| {
            // Receiver gone means the stream was dropped mid-delivery.
            let _ = tx.send(event);
        }))?;
        Ok(Self {
            receiver: rx,
            subscription: Some(subscription),
        })
    }
}

impl<T> EventStream<T> {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_next(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Stop the source. Events already queued can still be drained.
    pub fn cancel(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.subscription.is_none()
    }
}

impl<T> Iterator for EventStream<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.subscription.is_none() {
            return self.receiver.try_recv().ok();
        }
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_release_runs_once_on_cancel() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let sub = Subscription::new("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_runs_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&released);
            let _sub = Subscription::new("test", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_stream_yields_pushed_events() {
        let mut sink_slot = None;
        let mut stream = EventStream::<u32>::open(|sink| {
            sink_slot = Some(sink);
            Ok::<_, ()>(Subscription::new("numbers", || {}))
        })
        .unwrap();

        let sink = sink_slot.unwrap();
        sink(1);
        sink(2);

        assert_eq!(stream.next(), Some(1));
        assert_eq!(stream.try_next(), Some(2));
        assert_eq!(stream.try_next(), None);

        stream.cancel();
        assert!(stream.is_cancelled());
        sink(3);
        // Queued after cancel but still drainable without blocking
        assert_eq!(stream.next(), Some(3));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn test_event_stream_propagates_subscribe_error() {
        let result = EventStream::<u32>::open(|_sink| Err::<Subscription, _>("unavailable"));
        assert!(matches!(result, Err("unavailable")));
    }
}

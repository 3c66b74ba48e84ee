use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::sync::futures::OwnedNotified;

/// Coalesces concurrent creations of the same artifact.
///
/// The first caller for a key becomes the leader and does the work; callers
/// arriving while it runs get a future that resolves once the leader's
/// [`FlightGuard`] is dropped, after which they re-check the cache.
#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    inflight: Mutex<HashMap<String, Arc<Notify>>>,
}

pub(crate) enum Flight {
    Leader(FlightGuard),
    Follower(OwnedNotified),
}

impl SingleFlight {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn join(self: &Arc<Self>, key: &str) -> Flight {
        let mut inflight = self.inflight.lock();
        if let Some(notify) = inflight.get(key) {
            // Created under the lock, so the leader's notify_waiters cannot
            // be missed even before the future is first polled.
            return Flight::Follower(Arc::clone(notify).notified_owned());
        }
        inflight.insert(key.to_string(), Arc::new(Notify::new()));
        Flight::Leader(FlightGuard {
            flights: Arc::clone(self),
            key: key.to_string(),
        })
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Held by the leader. Dropping it (success, failure or cancellation)
/// releases every waiter.
pub(crate) struct FlightGuard {
    flights: Arc<SingleFlight>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some(notify) = self.flights.inflight.lock().remove(&self.key) {
            notify.notify_waiters();
        }
    }
}

//! Session-scoped holder of the shared point-of-interest.
//!
//! A [`LocationStore`] keeps the last published [`Point`] and fans every publish out to its
//! subscribers, synchronously and in registration order. Publishes issued while a
//! notification pass is running (from inside a callback, or from another thread) are queued
//! and delivered by that pass once the current point has reached every subscriber, so
//! re-entrant publishes never recurse.
//!
//! Late subscribers do not receive the current value; read [`LocationStore::current`] for it.

use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use shared::{
    domain::{Point, SubscriptionId},
    error::CoordinateError,
};
use tracing::{debug, trace, warn};

type Callback = Arc<dyn Fn(Point) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

#[derive(Default)]
struct StoreState {
    current: Option<Point>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    pending: VecDeque<Point>,
    delivering: bool,
}

#[derive(Default)]
pub struct LocationStore {
    state: Mutex<StoreState>,
}

impl LocationStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn current(&self) -> Option<Point> {
        self.lock().current
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Validates the pair and publishes it. The store is left untouched on error.
    pub fn set_location(&self, longitude: f64, latitude: f64) -> Result<Point, CoordinateError> {
        let point = Point::new(longitude, latitude)?;
        self.publish(point);
        Ok(point)
    }

    pub fn publish(&self, point: Point) {
        {
            let mut state = self.lock();
            state.current = Some(point);
            state.pending.push_back(point);
            debug!(
                longitude = point.longitude(),
                latitude = point.latitude(),
                subscribers = state.subscribers.len(),
                "location: published"
            );
            if state.delivering {
                trace!(
                    queued = state.pending.len(),
                    "location: queued behind active delivery"
                );
                return;
            }
            state.delivering = true;
        }

        // The queue is always drained; the first subscriber panic is re-raised afterwards.
        let mut first_panic = None;
        while let Some((point, recipients)) = self.next_delivery() {
            for (id, callback) in recipients {
                // A callback earlier in this pass may have unsubscribed this one.
                if !self.is_subscribed(id) {
                    continue;
                }
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(point))) {
                    warn!(
                        subscription = id.0,
                        "location: subscriber panicked during delivery"
                    );
                    first_panic.get_or_insert(payload);
                }
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(Point) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        state.subscribers.push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        debug!(subscription = id.0, "location: subscribed");
        Subscription {
            id,
            store: Arc::downgrade(self),
        }
    }

    /// Removes the subscriber. Returns `false` when it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|subscriber| subscriber.id != id);
        let removed = state.subscribers.len() != before;
        if removed {
            debug!(subscription = id.0, "location: unsubscribed");
        }
        removed
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.lock()
            .subscribers
            .iter()
            .any(|subscriber| subscriber.id == id)
    }

    fn next_delivery(&self) -> Option<(Point, Vec<(SubscriptionId, Callback)>)> {
        let mut state = self.lock();
        let Some(point) = state.pending.pop_front() else {
            state.delivering = false;
            return None;
        };
        let recipients = state
            .subscribers
            .iter()
            .map(|subscriber| (subscriber.id, Arc::clone(&subscriber.callback)))
            .collect();
        Some((point, recipients))
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one registered callback. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    store: Weak<LocationStore>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.store
            .upgrade()
            .is_some_and(|store| store.is_subscribed(self.id))
    }

    /// Idempotent; also a no-op once the store itself is gone.
    pub fn unsubscribe(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
        self.store = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

//! Controller behind the two-field coordinate form.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use location_store::{LocationStore, Subscription};
use serde::Serialize;
use shared::{
    domain::{parse_axis, Axis, Point},
    error::CoordinateError,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const DEFAULT_FORM_TITLE: &str = "Locator";
const FORM_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormEvent {
    Located(Point),
}

struct FormState {
    location: Option<Point>,
    longitude: Option<f64>,
    latitude: Option<f64>,
    subscription: Option<Subscription>,
}

struct FormInner {
    title: String,
    store: Arc<LocationStore>,
    state: Mutex<FormState>,
    events: broadcast::Sender<FormEvent>,
}

impl FormInner {
    fn state(&self) -> MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_point(&self, point: Point) {
        let mut state = self.state();
        state.location = Some(point);
        state.longitude = Some(point.longitude());
        state.latitude = Some(point.latitude());
    }
}

#[derive(Clone)]
pub struct LocatorFormController {
    inner: Arc<FormInner>,
}

impl LocatorFormController {
    pub fn new(store: Arc<LocationStore>, title: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(FORM_EVENT_CAPACITY);
        Self {
            inner: Arc::new(FormInner {
                title: title.into(),
                store,
                state: Mutex::new(FormState {
                    location: None,
                    longitude: None,
                    latitude: None,
                    subscription: None,
                }),
                events,
            }),
        }
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FormEvent> {
        self.inner.events.subscribe()
    }

    /// Overwrites both fields from `point`. Touches view state only.
    pub fn set_point(&self, point: Point) {
        self.inner.set_point(point);
    }

    pub fn locate_point(&self) -> Option<Point> {
        self.inner.state().location
    }

    /// Current `(longitude, latitude)` field values; empty until set.
    pub fn fields(&self) -> (Option<f64>, Option<f64>) {
        let state = self.inner.state();
        (state.longitude, state.latitude)
    }

    pub fn set_field(&self, axis: Axis, value: f64) {
        let mut state = self.inner.state();
        match axis {
            Axis::Longitude => state.longitude = Some(value),
            Axis::Latitude => state.latitude = Some(value),
        }
    }

    /// Text typed into a field. Unparseable input leaves the field as it was.
    pub fn set_field_text(&self, axis: Axis, raw: &str) -> Result<(), CoordinateError> {
        let value = parse_axis(axis, raw)?;
        self.set_field(axis, value);
        Ok(())
    }

    /// Reads both fields, validates them, then emits `Located` and publishes into the store.
    /// Rejected input leaves the store and the last located point untouched.
    pub fn submit(&self) -> Result<Point, CoordinateError> {
        let point = {
            let mut state = self.inner.state();
            let point = match (state.longitude, state.latitude) {
                (Some(longitude), Some(latitude)) => Point::new(longitude, latitude),
                (None, _) => Err(CoordinateError::Missing(Axis::Longitude)),
                (_, None) => Err(CoordinateError::Missing(Axis::Latitude)),
            }
            .inspect_err(|err| warn!(error = %err, "locator: rejected submission"))?;
            state.location = Some(point);
            point
        };

        let _ = self.inner.events.send(FormEvent::Located(point));
        self.inner.store.publish(point);
        info!(%point, "locator: located");
        Ok(point)
    }

    /// Keeps the fields in step with every later store publish. Idempotent.
    pub fn attach(&self) {
        let mut state = self.inner.state();
        if state.subscription.is_some() {
            return;
        }
        let form = Arc::downgrade(&self.inner);
        state.subscription = Some(self.inner.store.subscribe(move |point| {
            if let Some(form) = form.upgrade() {
                form.set_point(point);
            }
        }));
        debug!("locator: attached to location store");
    }

    pub fn is_attached(&self) -> bool {
        self.inner.state().subscription.is_some()
    }

    /// Releases the store subscription if there is one.
    pub fn detach(&self) {
        let subscription = self.inner.state().subscription.take();
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
            debug!("locator: detached from location store");
        }
    }
}

#[cfg(test)]
#[path = "tests/locator_form_tests.rs"]
mod tests;

//! Controller for the asynchronously initialized map surface.
//!
//! Lifecycle: `Uninitialized -> Initializing -> Ready -> Destroyed`, with
//! `Initializing -> Failed` on any engine error. While `Ready` the controller keeps exactly one
//! marker on its graphics layer, positioned at the store's current point. All session
//! mutations run under one per-controller lock, and that lock is never held while publishing
//! to the store.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use location_store::{LocationStore, Subscription};
use map_engine::{
    Graphic, GraphicsLayer, MapEngine, MapOptions, MapView, ViewEvent, ViewOptions,
};
use serde::Serialize;
use shared::{
    domain::{Basemap, GraphicHandle, Point},
    error::CoordinateError,
};
use thiserror::Error;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub const DEFAULT_ZOOM: u8 = 10;
pub const DEFAULT_CENTER: Point = Point::LONDON;
pub const ENGINE_MODULES: &[&str] = &["map", "views/map-view", "graphic", "layers/graphics-layer"];
const SURFACE_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    pub zoom: u8,
    pub center: Point,
    pub basemap: Basemap,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            center: DEFAULT_CENTER,
            basemap: Basemap::Streets,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceEvent {
    Loaded(bool),
    LocationChanged(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    ModuleLoad,
    MapConstruction,
    ViewReadiness,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitStage::ModuleLoad => "module load",
            InitStage::MapConstruction => "map construction",
            InitStage::ViewReadiness => "view readiness",
        })
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("surface initialization failed during {stage}: {source}")]
    InitializationFailure {
        stage: InitStage,
        source: anyhow::Error,
    },
    #[error("surface is not ready (state: {0:?})")]
    NotReady(SurfaceState),
    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),
}

fn init_failure(stage: InitStage) -> impl FnOnce(anyhow::Error) -> SurfaceError {
    move |source| SurfaceError::InitializationFailure { stage, source }
}

struct SurfaceParts {
    view: Arc<dyn MapView>,
    layer: Arc<dyn GraphicsLayer>,
    marker: GraphicHandle,
}

struct SurfaceSession {
    state: SurfaceState,
    center: Point,
    view: Option<Arc<dyn MapView>>,
    layer: Option<Arc<dyn GraphicsLayer>>,
    marker: Option<GraphicHandle>,
    subscription: Option<Subscription>,
    click_task: Option<JoinHandle<()>>,
}

impl Drop for SurfaceSession {
    fn drop(&mut self) {
        if let Some(task) = self.click_task.take() {
            task.abort();
        }
    }
}

struct SurfaceInner {
    store: Arc<LocationStore>,
    engine: Arc<dyn MapEngine>,
    config: SurfaceConfig,
    session: Mutex<SurfaceSession>,
    events: broadcast::Sender<SurfaceEvent>,
}

#[derive(Clone)]
pub struct MapSurfaceController {
    inner: Arc<SurfaceInner>,
}

impl MapSurfaceController {
    pub fn new(
        store: Arc<LocationStore>,
        engine: Arc<dyn MapEngine>,
        config: SurfaceConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(SURFACE_EVENT_CAPACITY);
        let session = SurfaceSession {
            state: SurfaceState::Uninitialized,
            center: config.center,
            view: None,
            layer: None,
            marker: None,
            subscription: None,
            click_task: None,
        };
        Self {
            inner: Arc::new(SurfaceInner {
                store,
                engine,
                config,
                session: Mutex::new(session),
                events,
            }),
        }
    }

    pub fn zoom(&self) -> u8 {
        self.inner.config.zoom
    }

    pub fn basemap(&self) -> Basemap {
        self.inner.config.basemap
    }

    pub fn state(&self) -> SurfaceState {
        self.inner.session().state
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == SurfaceState::Ready
    }

    /// The controller's local copy of the point it last centered on.
    pub fn center(&self) -> Point {
        self.inner.session().center
    }

    pub fn marker(&self) -> Option<GraphicHandle> {
        self.inner.session().marker
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.inner.events.subscribe()
    }

    /// Runs initialization to `Ready` or `Failed` and returns the settled state. Engine errors
    /// are reported through `Loaded(false)` and the log, never returned.
    pub async fn initialize(&self) -> SurfaceState {
        {
            let mut session = self.inner.session();
            if session.state != SurfaceState::Uninitialized {
                warn!(state = ?session.state, "map: initialize called more than once; ignoring");
                return session.state;
            }
            session.state = SurfaceState::Initializing;
        }
        info!(
            "map: initializing surface basemap={} zoom={} center={}",
            self.inner.config.basemap, self.inner.config.zoom, self.inner.config.center
        );

        match self.inner.build_surface().await {
            Ok(parts) => self.inner.finish_ready(parts),
            Err(err) => self.inner.finish_failed(err),
        }
    }

    /// Starts initialization on the runtime without waiting for it to settle.
    pub fn start(&self) -> JoinHandle<SurfaceState> {
        let controller = self.clone();
        tokio::spawn(async move { controller.initialize().await })
    }

    /// A user click at `map_point`: recenter, publish, then notify observers.
    pub fn handle_click(&self, map_point: Point) -> Result<(), SurfaceError> {
        self.inner.handle_click(map_point)
    }

    /// Same as [`handle_click`](Self::handle_click) for a raw coordinate pair.
    pub fn click_at(&self, longitude: f64, latitude: f64) -> Result<(), SurfaceError> {
        let map_point = Point::new(longitude, latitude)?;
        self.inner.handle_click(map_point)
    }

    /// Safe in every state and idempotent. A surface still initializing is discarded when it
    /// finishes loading.
    pub fn destroy(&self) {
        let (previous, view, subscription, click_task) = {
            let mut session = self.inner.session();
            if session.state == SurfaceState::Destroyed {
                return;
            }
            let previous = std::mem::replace(&mut session.state, SurfaceState::Destroyed);
            session.marker = None;
            session.layer = None;
            (
                previous,
                session.view.take(),
                session.subscription.take(),
                session.click_task.take(),
            )
        };

        if let Some(view) = view {
            view.detach_container();
        }
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
        }
        if let Some(task) = click_task {
            task.abort();
        }
        info!(?previous, "map: surface destroyed");
    }
}

impl SurfaceInner {
    fn session(&self) -> MutexGuard<'_, SurfaceSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn build_surface(&self) -> Result<SurfaceParts, SurfaceError> {
        self.engine
            .load_modules(ENGINE_MODULES)
            .await
            .map_err(init_failure(InitStage::ModuleLoad))?;

        let map = self
            .engine
            .create_map(MapOptions {
                basemap: self.config.basemap,
            })
            .map_err(init_failure(InitStage::MapConstruction))?;
        let layer = self
            .engine
            .create_graphics_layer()
            .map_err(init_failure(InitStage::MapConstruction))?;
        let marker = layer.add(Graphic::location_marker(self.config.center));
        map.add_layer(Arc::clone(&layer));

        let view = self
            .engine
            .create_view(ViewOptions {
                map,
                center: self.config.center,
                zoom: self.config.zoom,
            })
            .await
            .map_err(init_failure(InitStage::ViewReadiness))?;

        Ok(SurfaceParts {
            view,
            layer,
            marker,
        })
    }

    fn finish_failed(&self, err: SurfaceError) -> SurfaceState {
        {
            let mut session = self.session();
            if session.state == SurfaceState::Destroyed {
                debug!(error = %err, "map: initialization failed after teardown");
                return SurfaceState::Destroyed;
            }
            session.state = SurfaceState::Failed;
        }
        error!(error = %err, "map: surface initialization failed");
        let _ = self.events.send(SurfaceEvent::Loaded(false));
        SurfaceState::Failed
    }

    fn finish_ready(self: &Arc<Self>, parts: SurfaceParts) -> SurfaceState {
        let SurfaceParts {
            view,
            layer,
            marker,
        } = parts;
        {
            let mut session = self.session();
            if session.state == SurfaceState::Destroyed {
                view.detach_container();
                info!("map: surface finished loading after teardown; discarding it");
                return SurfaceState::Destroyed;
            }
            session.state = SurfaceState::Ready;
            session.click_task = Some(self.spawn_click_pump(view.subscribe_events()));
            session.view = Some(view);
            session.layer = Some(layer);
            session.marker = Some(marker);
            session.subscription = Some(self.subscribe_to_store());
        }
        info!("map: view ready");
        let _ = self.events.send(SurfaceEvent::Loaded(true));

        // A value published while we were loading wins over the configured center.
        match self.store.current() {
            Some(latest) => {
                debug!(%latest, "map: adopting location published during initialization");
                self.apply_store_update(latest);
            }
            None => {
                let still_ready = self.session().state == SurfaceState::Ready;
                if still_ready {
                    self.store.publish(self.config.center);
                }
            }
        }
        SurfaceState::Ready
    }

    fn subscribe_to_store(self: &Arc<Self>) -> Subscription {
        let surface = Arc::downgrade(self);
        self.store.subscribe(move |point| {
            if let Some(surface) = surface.upgrade() {
                surface.apply_store_update(point);
            }
        })
    }

    fn spawn_click_pump(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ViewEvent>,
    ) -> JoinHandle<()> {
        let surface = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ViewEvent::Click { map_point }) => {
                        let Some(surface) = surface.upgrade() else {
                            break;
                        };
                        if let Err(err) = surface.handle_click(map_point) {
                            debug!(error = %err, "map: click dropped");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "map: click pump lagged behind view events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn handle_click(&self, map_point: Point) -> Result<(), SurfaceError> {
        {
            let mut session = self.session();
            if session.state != SurfaceState::Ready {
                return Err(SurfaceError::NotReady(session.state));
            }
            info!(
                "map: clicked on {},{}",
                map_point.latitude(),
                map_point.longitude()
            );
            if let Some(view) = &session.view {
                view.go_to(map_point);
            }
            session.center = map_point;
        }

        self.store.publish(map_point);
        let _ = self.events.send(SurfaceEvent::LocationChanged(map_point));
        Ok(())
    }

    /// Recenters and swaps the single marker for one at `point`. Our own publishes come back
    /// through here as well; replacing a marker with an identical one is harmless.
    fn apply_store_update(&self, point: Point) {
        let mut session = self.session();
        if session.state != SurfaceState::Ready {
            debug!(state = ?session.state, "map: ignoring store update outside ready state");
            return;
        }
        let (Some(view), Some(layer)) = (session.view.clone(), session.layer.clone()) else {
            return;
        };

        session.center = point;
        view.go_to(point);
        if let Some(previous) = session.marker.take() {
            if !layer.remove(previous) {
                warn!(marker = previous.0, "map: tracked marker was already gone from the layer");
            }
        }
        let marker = layer.add(Graphic::location_marker(point));
        session.marker = Some(marker);
        debug!(marker = marker.0, %point, "map: marker replaced");
    }
}

#[cfg(test)]
#[path = "tests/map_surface_tests.rs"]
mod tests;

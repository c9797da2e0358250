//! Headless engine: keeps graphics and view state in memory and lets the caller decide when
//! (and whether) views finish loading.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{Basemap, GraphicHandle, Point};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::{
    Graphic, GraphicsLayer, MapEngine, MapHandle, MapOptions, MapView, ViewEvent, ViewOptions,
};

const VIEW_EVENT_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFailure {
    ModuleLoad(String),
    MapConstruction(String),
    ViewConstruction(String),
}

/// Releases every view of a gated engine that is waiting to finish loading.
pub struct ReadinessGate {
    tx: watch::Sender<bool>,
}

impl ReadinessGate {
    pub fn open(&self) {
        self.tx.send_replace(true);
    }
}

pub struct InMemoryEngine {
    readiness: watch::Receiver<bool>,
    _always_ready: Option<watch::Sender<bool>>,
    ready_delay: Duration,
    failure: Option<EngineFailure>,
    loaded_modules: Mutex<Vec<String>>,
    maps: Mutex<Vec<Arc<InMemoryMap>>>,
    layers: Mutex<Vec<Arc<InMemoryLayer>>>,
    views: Mutex<Vec<Arc<InMemoryView>>>,
}

impl InMemoryEngine {
    pub fn new() -> Arc<Self> {
        Self::with_ready_delay(Duration::ZERO)
    }

    pub fn with_ready_delay(ready_delay: Duration) -> Arc<Self> {
        let (tx, rx) = watch::channel(true);
        Arc::new(Self::build(rx, Some(tx), ready_delay, None))
    }

    /// Views stay loading until the returned gate is opened. Dropping the gate unopened
    /// fails them.
    pub fn gated() -> (Arc<Self>, ReadinessGate) {
        let (tx, rx) = watch::channel(false);
        let engine = Arc::new(Self::build(rx, None, Duration::ZERO, None));
        (engine, ReadinessGate { tx })
    }

    pub fn failing(failure: EngineFailure) -> Arc<Self> {
        let (tx, rx) = watch::channel(true);
        Arc::new(Self::build(rx, Some(tx), Duration::ZERO, Some(failure)))
    }

    fn build(
        readiness: watch::Receiver<bool>,
        always_ready: Option<watch::Sender<bool>>,
        ready_delay: Duration,
        failure: Option<EngineFailure>,
    ) -> Self {
        Self {
            readiness,
            _always_ready: always_ready,
            ready_delay,
            failure,
            loaded_modules: Mutex::new(Vec::new()),
            maps: Mutex::new(Vec::new()),
            layers: Mutex::new(Vec::new()),
            views: Mutex::new(Vec::new()),
        }
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        lock(&self.loaded_modules).clone()
    }

    pub fn last_map(&self) -> Option<Arc<InMemoryMap>> {
        lock(&self.maps).last().cloned()
    }

    pub fn last_layer(&self) -> Option<Arc<InMemoryLayer>> {
        lock(&self.layers).last().cloned()
    }

    /// The most recently constructed view, loaded or not.
    pub fn last_view(&self) -> Option<Arc<InMemoryView>> {
        lock(&self.views).last().cloned()
    }
}

#[async_trait]
impl MapEngine for InMemoryEngine {
    async fn load_modules(&self, modules: &[&str]) -> Result<()> {
        if let Some(EngineFailure::ModuleLoad(reason)) = &self.failure {
            return Err(anyhow!("failed to load engine modules: {reason}"));
        }
        let mut loaded = lock(&self.loaded_modules);
        for module in modules {
            if !loaded.iter().any(|existing| existing == module) {
                loaded.push((*module).to_string());
            }
        }
        debug!(modules = modules.len(), "engine: modules loaded");
        Ok(())
    }

    fn create_map(&self, options: MapOptions) -> Result<Arc<dyn MapHandle>> {
        if let Some(EngineFailure::MapConstruction(reason)) = &self.failure {
            return Err(anyhow!("failed to construct map: {reason}"));
        }
        let map = Arc::new(InMemoryMap {
            basemap: options.basemap,
            layers: Mutex::new(Vec::new()),
        });
        lock(&self.maps).push(Arc::clone(&map));
        Ok(map)
    }

    fn create_graphics_layer(&self) -> Result<Arc<dyn GraphicsLayer>> {
        let layer = Arc::new(InMemoryLayer::default());
        lock(&self.layers).push(Arc::clone(&layer));
        Ok(layer)
    }

    async fn create_view(&self, options: ViewOptions) -> Result<Arc<dyn MapView>> {
        if let Some(EngineFailure::ViewConstruction(reason)) = &self.failure {
            return Err(anyhow!("failed to construct view: {reason}"));
        }

        let view = Arc::new(InMemoryView::new(options));
        lock(&self.views).push(Arc::clone(&view));

        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay).await;
        }
        let mut readiness = self.readiness.clone();
        let loaded = readiness.wait_for(|ready| *ready).await.is_ok();
        if !loaded {
            return Err(anyhow!("view readiness gate closed before the view loaded"));
        }

        view.ready.store(true, Ordering::SeqCst);
        debug!(center = %view.center(), zoom = view.zoom, "engine: view ready");
        Ok(view)
    }
}

pub struct InMemoryMap {
    basemap: Basemap,
    layers: Mutex<Vec<Arc<dyn GraphicsLayer>>>,
}

impl InMemoryMap {
    pub fn layer_count(&self) -> usize {
        lock(&self.layers).len()
    }
}

impl MapHandle for InMemoryMap {
    fn basemap(&self) -> Basemap {
        self.basemap
    }

    fn add_layer(&self, layer: Arc<dyn GraphicsLayer>) {
        lock(&self.layers).push(layer);
    }
}

#[derive(Default)]
pub struct InMemoryLayer {
    graphics: Mutex<Vec<(GraphicHandle, Graphic)>>,
    next_handle: AtomicU64,
}

impl InMemoryLayer {
    pub fn graphics(&self) -> Vec<Graphic> {
        lock(&self.graphics)
            .iter()
            .map(|(_, graphic)| *graphic)
            .collect()
    }

    pub fn graphic(&self, handle: GraphicHandle) -> Option<Graphic> {
        lock(&self.graphics)
            .iter()
            .find(|(existing, _)| *existing == handle)
            .map(|(_, graphic)| *graphic)
    }
}

impl GraphicsLayer for InMemoryLayer {
    fn add(&self, graphic: Graphic) -> GraphicHandle {
        let handle = GraphicHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.graphics).push((handle, graphic));
        handle
    }

    fn remove(&self, handle: GraphicHandle) -> bool {
        let mut graphics = lock(&self.graphics);
        let before = graphics.len();
        graphics.retain(|(existing, _)| *existing != handle);
        graphics.len() != before
    }

    fn item_at(&self, index: usize) -> Option<GraphicHandle> {
        lock(&self.graphics).get(index).map(|(handle, _)| *handle)
    }

    fn len(&self) -> usize {
        lock(&self.graphics).len()
    }
}

pub struct InMemoryView {
    map: Arc<dyn MapHandle>,
    center: Mutex<Point>,
    zoom: u8,
    ready: AtomicBool,
    attached: AtomicBool,
    navigations: AtomicUsize,
    events: broadcast::Sender<ViewEvent>,
}

impl InMemoryView {
    fn new(options: ViewOptions) -> Self {
        let (events, _) = broadcast::channel(VIEW_EVENT_CAPACITY);
        Self {
            map: options.map,
            center: Mutex::new(options.center),
            zoom: options.zoom,
            ready: AtomicBool::new(false),
            attached: AtomicBool::new(true),
            navigations: AtomicUsize::new(0),
            events,
        }
    }

    pub fn basemap(&self) -> Basemap {
        self.map.basemap()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Number of `go_to` calls since construction.
    pub fn navigation_count(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    /// Emits a click at `map_point`; returns how many listeners received it.
    pub fn simulate_click(&self, map_point: Point) -> usize {
        if !self.is_attached() {
            return 0;
        }
        self.events
            .send(ViewEvent::Click { map_point })
            .unwrap_or(0)
    }
}

impl MapView for InMemoryView {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn center(&self) -> Point {
        *lock(&self.center)
    }

    fn zoom(&self) -> u8 {
        self.zoom
    }

    fn go_to(&self, target: Point) {
        *lock(&self.center) = target;
        self.navigations.fetch_add(1, Ordering::SeqCst);
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    fn detach_container(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;

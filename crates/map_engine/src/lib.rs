//! Capability surface of the external map rendering engine.
//!
//! Only creation of the view is asynchronous: [`MapEngine::create_view`] resolves once the
//! view reports it has finished loading, or fails. Everything else is synchronous.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{Basemap, GraphicHandle, Point};
use tokio::sync::broadcast;

pub mod memory;

pub use memory::{EngineFailure, InMemoryEngine, InMemoryLayer, InMemoryView, ReadinessGate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOptions {
    pub basemap: Basemap,
}

#[derive(Clone)]
pub struct ViewOptions {
    pub map: Arc<dyn MapHandle>,
    pub center: Point,
    pub zoom: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerSymbol {
    pub color: Rgb,
    pub outline_color: Rgb,
    pub outline_width: f32,
}

impl MarkerSymbol {
    /// Orange pin with a thin white outline.
    pub const fn location_pin() -> Self {
        Self {
            color: Rgb(226, 119, 40),
            outline_color: Rgb(255, 255, 255),
            outline_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Graphic {
    pub geometry: Point,
    pub symbol: MarkerSymbol,
}

impl Graphic {
    pub fn location_marker(geometry: Point) -> Self {
        Self {
            geometry,
            symbol: MarkerSymbol::location_pin(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewEvent {
    Click { map_point: Point },
}

pub trait GraphicsLayer: Send + Sync {
    fn add(&self, graphic: Graphic) -> GraphicHandle;
    /// Returns `false` when the handle is not on the layer.
    fn remove(&self, handle: GraphicHandle) -> bool;
    fn item_at(&self, index: usize) -> Option<GraphicHandle>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait MapHandle: Send + Sync {
    fn basemap(&self) -> Basemap;
    fn add_layer(&self, layer: Arc<dyn GraphicsLayer>);
}

pub trait MapView: Send + Sync {
    fn is_ready(&self) -> bool;
    fn center(&self) -> Point;
    fn zoom(&self) -> u8;
    fn go_to(&self, target: Point);
    fn subscribe_events(&self) -> broadcast::Receiver<ViewEvent>;
    /// Releases the host container; the view renders nothing afterwards.
    fn detach_container(&self);
}

#[async_trait]
pub trait MapEngine: Send + Sync {
    async fn load_modules(&self, modules: &[&str]) -> anyhow::Result<()>;
    fn create_map(&self, options: MapOptions) -> anyhow::Result<Arc<dyn MapHandle>>;
    fn create_graphics_layer(&self) -> anyhow::Result<Arc<dyn GraphicsLayer>>;
    async fn create_view(&self, options: ViewOptions) -> anyhow::Result<Arc<dyn MapView>>;
}

//! Controllers that keep the map surface and the locator form on one shared point-of-interest.
//!
//! Both controllers receive the session's [`LocationStore`](location_store::LocationStore) at
//! construction and influence each other only through it.

pub mod locator_form;
pub mod map_surface;

pub use locator_form::{FormEvent, LocatorFormController, DEFAULT_FORM_TITLE};
pub use map_surface::{
    InitStage, MapSurfaceController, SurfaceConfig, SurfaceError, SurfaceEvent, SurfaceState,
    DEFAULT_CENTER, DEFAULT_ZOOM, ENGINE_MODULES,
};

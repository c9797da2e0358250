//! One locator session: a shared store, the map surface and the form wired to it.

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use location_store::LocationStore;
use locator_core::{
    FormEvent, LocatorFormController, MapSurfaceController, SurfaceEvent, SurfaceState,
};
use map_engine::InMemoryEngine;
use serde::Serialize;
use shared::{
    domain::{Axis, Point},
    error::CoordinateError,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Settings;

const CLICK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptStep {
    Click(Point),
    Submit(Point),
}

#[derive(Debug, Error)]
pub enum ScriptStepError {
    #[error("expected `click:<lng,lat>` or `submit:<lng,lat>`, got {0:?}")]
    UnknownAction(String),
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
}

impl FromStr for ScriptStep {
    type Err = ScriptStepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, coords) = s
            .split_once(':')
            .ok_or_else(|| ScriptStepError::UnknownAction(s.to_string()))?;
        match action.trim().to_ascii_lowercase().as_str() {
            "click" => Ok(Self::Click(coords.parse()?)),
            "submit" => Ok(Self::Submit(coords.parse()?)),
            _ => Err(ScriptStepError::UnknownAction(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEvent {
    Surface(SurfaceEvent),
    Form(FormEvent),
}

pub struct LocatorApp {
    store: Arc<LocationStore>,
    engine: Arc<InMemoryEngine>,
    surface: MapSurfaceController,
    form: LocatorFormController,
}

impl LocatorApp {
    pub fn new(settings: &Settings, engine: Arc<InMemoryEngine>) -> Self {
        let store = LocationStore::new();
        let surface = MapSurfaceController::new(
            Arc::clone(&store),
            engine.clone(),
            settings.surface_config(),
        );
        let form = LocatorFormController::new(Arc::clone(&store), settings.form_title.clone());
        form.set_point(settings.center);

        Self {
            store,
            engine,
            surface,
            form,
        }
    }

    pub fn store(&self) -> &Arc<LocationStore> {
        &self.store
    }

    pub fn surface(&self) -> &MapSurfaceController {
        &self.surface
    }

    pub fn form(&self) -> &LocatorFormController {
        &self.form
    }

    /// Loads the map, plays `steps` against it and tears both controllers down.
    /// Returns every signal the controllers emitted, in order.
    pub async fn run(&self, steps: &[ScriptStep]) -> anyhow::Result<Vec<AppEvent>> {
        let mut surface_events = self.surface.subscribe_events();
        let mut form_events = self.form.subscribe_events();
        let mut transcript = Vec::new();

        self.form.attach();
        let state = self.surface.initialize().await;
        drain(&mut surface_events, &mut form_events, &mut transcript);

        let outcome = if state == SurfaceState::Ready {
            self.play(
                steps,
                &mut surface_events,
                &mut form_events,
                &mut transcript,
            )
            .await
        } else {
            if !steps.is_empty() {
                warn!(
                    ?state,
                    "locator: map never became ready; skipping {} steps",
                    steps.len()
                );
            }
            Ok(())
        };

        self.teardown();
        outcome.map(|()| transcript)
    }

    pub fn teardown(&self) {
        self.surface.destroy();
        self.form.detach();
    }

    async fn play(
        &self,
        steps: &[ScriptStep],
        surface_events: &mut broadcast::Receiver<SurfaceEvent>,
        form_events: &mut broadcast::Receiver<FormEvent>,
        transcript: &mut Vec<AppEvent>,
    ) -> anyhow::Result<()> {
        for step in steps {
            match *step {
                ScriptStep::Click(map_point) => {
                    let view = self
                        .engine
                        .last_view()
                        .context("map view missing after load")?;
                    view.simulate_click(map_point);
                    await_location_change(map_point, surface_events, transcript).await?;
                }
                ScriptStep::Submit(point) => {
                    self.form.set_field(Axis::Longitude, point.longitude());
                    self.form.set_field(Axis::Latitude, point.latitude());
                    self.form.submit()?;
                }
            }
            drain(surface_events, form_events, transcript);
        }
        Ok(())
    }
}

async fn await_location_change(
    map_point: Point,
    surface_events: &mut broadcast::Receiver<SurfaceEvent>,
    transcript: &mut Vec<AppEvent>,
) -> anyhow::Result<()> {
    loop {
        let event = tokio::time::timeout(CLICK_TIMEOUT, surface_events.recv())
            .await
            .context("timed out waiting for the map to report the click")??;
        let reached = event == SurfaceEvent::LocationChanged(map_point);
        record(AppEvent::Surface(event), transcript);
        if reached {
            return Ok(());
        }
    }
}

fn drain(
    surface_events: &mut broadcast::Receiver<SurfaceEvent>,
    form_events: &mut broadcast::Receiver<FormEvent>,
    transcript: &mut Vec<AppEvent>,
) {
    while let Ok(event) = surface_events.try_recv() {
        record(AppEvent::Surface(event), transcript);
    }
    while let Ok(event) = form_events.try_recv() {
        record(AppEvent::Form(event), transcript);
    }
}

fn record(event: AppEvent, transcript: &mut Vec<AppEvent>) {
    match &event {
        AppEvent::Surface(SurfaceEvent::Loaded(loaded)) => {
            info!("locator: the map loaded: {loaded}");
        }
        AppEvent::Surface(SurfaceEvent::LocationChanged(point)) => {
            info!("locator: location changed to {point}");
        }
        AppEvent::Form(FormEvent::Located(point)) => {
            info!("locator: form located {point}");
        }
    }
    transcript.push(event);
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;

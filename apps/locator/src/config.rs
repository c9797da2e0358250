use std::{fs, io, path::Path};

use anyhow::Context;
use locator_core::{SurfaceConfig, DEFAULT_CENTER, DEFAULT_FORM_TITLE, DEFAULT_ZOOM};
use serde::Deserialize;
use shared::domain::{Basemap, Point};

pub const DEFAULT_CONFIG_FILE: &str = "locator.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub zoom: u8,
    pub center: Point,
    pub basemap: Basemap,
    pub form_title: String,
    pub ready_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            center: DEFAULT_CENTER,
            basemap: Basemap::default(),
            form_title: DEFAULT_FORM_TITLE.into(),
            ready_delay_ms: 0,
        }
    }
}

impl Settings {
    pub fn surface_config(&self) -> SurfaceConfig {
        SurfaceConfig {
            zoom: self.zoom,
            center: self.center,
            basemap: self.basemap,
        }
    }
}

/// File first (`locator.toml` unless `path` is given), then `APP__*` environment overrides.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn read_settings_file(path: Option<&Path>) -> anyhow::Result<Settings> {
    let (path, explicit) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if !explicit && err.kind() == io::ErrorKind::NotFound => {
            return Ok(Settings::default());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()));
        }
    };

    toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))
}

pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("APP__ZOOM") {
        settings.zoom = v
            .trim()
            .parse()
            .with_context(|| format!("invalid APP__ZOOM '{v}'"))?;
    }
    if let Some(v) = lookup("APP__CENTER") {
        settings.center = v
            .parse()
            .with_context(|| format!("invalid APP__CENTER '{v}'"))?;
    }
    if let Some(v) = lookup("APP__BASEMAP") {
        settings.basemap = v
            .parse()
            .with_context(|| format!("invalid APP__BASEMAP '{v}'"))?;
    }
    if let Some(v) = lookup("APP__FORM_TITLE") {
        settings.form_title = v;
    }
    if let Some(v) = lookup("APP__READY_DELAY_MS") {
        settings.ready_delay_ms = v
            .trim()
            .parse()
            .with_context(|| format!("invalid APP__READY_DELAY_MS '{v}'"))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use map_engine::{EngineFailure, InMemoryEngine};
use shared::domain::{Basemap, Point};
use tracing::info;

mod app;
mod config;

use app::{LocatorApp, ScriptStep};
use config::{load_settings, Settings};

/// Drives a headless locator session and prints every emitted signal as a JSON line.
#[derive(Parser, Debug)]
#[command(name = "locator")]
struct Args {
    /// Settings file; `locator.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    zoom: Option<u8>,
    /// Initial map center as `longitude,latitude`.
    #[arg(long, allow_hyphen_values = true)]
    center: Option<Point>,
    #[arg(long)]
    basemap: Option<Basemap>,
    #[arg(long)]
    form_title: Option<String>,
    /// `click:<lng,lat>` or `submit:<lng,lat>`, played in order once the map is ready.
    #[arg(long = "step", allow_hyphen_values = true)]
    steps: Vec<ScriptStep>,
    /// Make the map engine fail while loading its modules.
    #[arg(long)]
    fail_init: bool,
}

impl Args {
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(zoom) = self.zoom {
            settings.zoom = zoom;
        }
        if let Some(center) = self.center {
            settings.center = center;
        }
        if let Some(basemap) = self.basemap {
            settings.basemap = basemap;
        }
        if let Some(title) = &self.form_title {
            settings.form_title = title.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    args.apply_overrides(&mut settings);
    info!(
        zoom = settings.zoom,
        basemap = %settings.basemap,
        "locator: starting at {}",
        settings.center
    );

    let engine = if args.fail_init {
        InMemoryEngine::failing(EngineFailure::ModuleLoad(
            "module loading disabled by --fail-init".into(),
        ))
    } else {
        InMemoryEngine::with_ready_delay(Duration::from_millis(settings.ready_delay_ms))
    };

    let app = LocatorApp::new(&settings, engine);
    let transcript = app.run(&args.steps).await?;
    for event in &transcript {
        println!("{}", serde_json::to_string(event)?);
    }

    info!(
        title = app.form().title(),
        state = ?app.surface().state(),
        "locator: session finished at {:?}",
        app.store().current()
    );
    Ok(())
}

mod app;
mod form;
mod map;

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    sync::Mutex,
};

use mapty_core::{
    config::{self, AppConfig},
    FileStore, Locator, WorkoutStore,
};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config_path = config::ensure_default_config()?;
    let config = AppConfig::load()?;
    tracing::info!(
        config = %config_path.display(),
        data_dir = %config.data_dir.display(),
        "starting mapty"
    );

    let storage = FileStore::new(&config.data_dir);
    let store = WorkoutStore::with_key(storage, config.storage_key.clone());
    let locator = Locator::new(config.position.clone());

    let mut app = app::MaptyApp::new(store, config);
    app.attach_locator(locator);
    app.run().await
}

// The terminal owns stdout while the UI runs, so logs only go to a file.
fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("mapty.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}

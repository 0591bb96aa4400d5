pub mod activity;
pub mod db;
pub mod grid;
pub mod levels;
pub mod poller;
pub mod rotation;
pub mod settings;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use rand::{rngs::StdRng, SeedableRng};
use tokio::{sync::Mutex, time::Duration};

use activity::{daily_log_path, replay_log, study_minutes, ReplayGrid};
use db::Database;
use grid::WeeklyGridSource;
use poller::{Engine, LoggingSink, PollerController};
use rotation::{summarize, CsvLedgerStore, DirectoryCatalog, LedgerStore, RewardSelector};
use settings::{config_path, AppConfig, LedgerBackend, SettingsStore};

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("StudyQuest starting up...");

    let settings = SettingsStore::new(config_path())?;
    log::info!("Using configuration {}", settings.path().display());
    let config = settings.config()?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(open_and_serve(config))
}

async fn open_and_serve(config: AppConfig) -> Result<()> {
    match config.ledger.backend {
        LedgerBackend::Sqlite => {
            let database = Database::open(config.ledger.path.clone())?;
            serve(database, config).await
        }
        LedgerBackend::Csv => {
            let store = CsvLedgerStore::new(config.ledger.path.clone());
            serve(store, config).await
        }
    }
}

async fn serve<S: LedgerStore + 'static>(store: S, config: AppConfig) -> Result<()> {
    let table = config.level_table()?;
    let start_date = config
        .start_date
        .context("start_date must be set to locate the weekly grid exports")?;

    for summary in summarize(&store, &table)? {
        log::info!(
            "Level '{}': {} tracks, {} plays (min {:?}, max {:?})",
            summary.level,
            summary.track_count,
            summary.total_plays,
            summary.min_count,
            summary.max_count
        );
    }

    let today_log = daily_log_path(&config.activity_log_dir, Local::now().date_naive());
    match study_minutes(&today_log) {
        Ok(minutes) => log::info!("Activity log shows {} min logged today", minutes),
        Err(err) => log::warn!("Could not read {}: {err:?}", today_log.display()),
    }
    match replay_log(&today_log, &ReplayGrid::default()) {
        Ok((blocks, steps)) => log::info!(
            "Activity log has {} blocks today, {} replay steps",
            blocks.len(),
            steps.len()
        ),
        Err(err) => log::warn!("Could not plan replay of {}: {err:?}", today_log.display()),
    }

    let catalog = DirectoryCatalog::new(config.music_dir.clone());
    let engine = Arc::new(Mutex::new(Engine::new(RewardSelector::new(store, catalog, table))));
    let grid = Arc::new(WeeklyGridSource::new(config.grid_dir.clone(), start_date));

    let mut poller = PollerController::new();
    poller.start(
        engine,
        grid,
        Arc::new(LoggingSink),
        Duration::from_secs(config.poll_interval_secs),
        StdRng::from_entropy(),
    )?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    log::info!("Shutting down");
    poller.stop().await
}

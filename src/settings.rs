use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::levels::{LevelDefinition, LevelTable};
use crate::poller::DEFAULT_POLL_INTERVAL_SECS;

pub const CONFIG_ENV: &str = "STUDYQUEST_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "studyquest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Sqlite,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// Database file for `sqlite`, directory of `<level>_play_count.csv` files for `csv`.
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Sqlite,
            path: PathBuf::from("data/studyquest.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub levels: Vec<LevelDefinition>,
    /// Reward pools, one sub-folder per level.
    pub music_dir: PathBuf,
    /// Folder holding the weekly grid exports.
    pub grid_dir: PathBuf,
    /// First day of week 1.
    pub start_date: Option<NaiveDate>,
    pub ledger: LedgerConfig,
    pub activity_log_dir: PathBuf,
    pub poll_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                LevelDefinition::new("level_1", 0.0, 2.0, 4),
                LevelDefinition::new("level_2", 2.0, 4.0, 4),
                LevelDefinition::new("level_3", 4.0, 8.0, 8),
            ],
            music_dir: PathBuf::from("music"),
            grid_dir: PathBuf::from("grids"),
            start_date: None,
            ledger: LedgerConfig::default(),
            activity_log_dir: PathBuf::from("statistics/five_minute_logs"),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl AppConfig {
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents).context("invalid configuration JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        self.level_table().map(|_| ())
    }

    pub fn level_table(&self) -> Result<LevelTable> {
        LevelTable::new(self.levels.clone()).context("invalid level configuration")
    }
}

/// Configuration file named by `STUDYQUEST_CONFIG`, else `studyquest.json` in the working directory.
pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn load(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    AppConfig::from_json(&contents)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppConfig>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = load(&path)?;
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> Result<AppConfig> {
        self.data
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    pub fn update(&self, config: AppConfig) -> Result<()> {
        config.validate()?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        self.persist(&config)?;
        *guard = config;
        Ok(())
    }

    fn persist(&self, data: &AppConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    /// Re-read the file; the previous configuration stays in place when it is invalid.
    pub fn reload(&self) -> Result<()> {
        let data = load(&self.path)?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = data;
        Ok(())
    }
}

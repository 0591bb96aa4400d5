use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::ledger::{Ledger, LedgerEntry};
use crate::levels::LevelTable;

/// Persistence for per-level play-count ledgers.
///
/// `save` must have durably written the ledger when it returns; the selector relies on that to
/// keep the rotation fair across restarts.
pub trait LedgerStore: Send {
    /// Persisted rows for `level` in index order; empty when nothing was saved yet.
    fn read(&self, level: &str) -> Result<Vec<LedgerEntry>>;

    /// Replace every persisted row of the ledger's level.
    fn save(&self, ledger: &Ledger) -> Result<()>;

    /// Levels that have persisted rows.
    fn levels(&self) -> Result<Vec<String>>;
}

/// Ledger store kept in memory; contents vanish with the process.
#[derive(Default)]
pub struct MemoryLedgerStore {
    ledgers: Mutex<HashMap<String, Vec<LedgerEntry>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn read(&self, level: &str) -> Result<Vec<LedgerEntry>> {
        let guard = self
            .ledgers
            .lock()
            .map_err(|_| anyhow!("ledger store lock poisoned"))?;
        Ok(guard.get(level).cloned().unwrap_or_default())
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        let mut guard = self
            .ledgers
            .lock()
            .map_err(|_| anyhow!("ledger store lock poisoned"))?;
        guard.insert(ledger.level().to_string(), ledger.entries().to_vec());
        Ok(())
    }

    fn levels(&self) -> Result<Vec<String>> {
        let guard = self
            .ledgers
            .lock()
            .map_err(|_| anyhow!("ledger store lock poisoned"))?;
        let mut levels: Vec<String> = guard.keys().cloned().collect();
        levels.sort();
        Ok(levels)
    }
}

const CSV_SUFFIX: &str = "_play_count.csv";

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    index: u32,
    level: String,
    track: String,
    play_count: u32,
}

/// One `<level>_play_count.csv` file per level, `index,level,track,play_count` rows.
pub struct CsvLedgerStore {
    dir: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, level: &str) -> Result<PathBuf> {
        let path_like = level.contains(|c: char| c == '/' || c == '\\');
        if level.is_empty() || path_like || level == "." || level == ".." {
            bail!("level name '{level}' cannot be used as a file name");
        }
        Ok(self.dir.join(format!("{level}{CSV_SUFFIX}")))
    }
}

impl LedgerStore for CsvLedgerStore {
    fn read(&self, level: &str) -> Result<Vec<LedgerEntry>> {
        let path = self.path_for(level)?;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let mut entries = Vec::new();
        for row in reader.deserialize::<CsvRow>() {
            let row = row.with_context(|| format!("corrupt play-count row in {}", path.display()))?;
            entries.push(LedgerEntry::new(row.index, row.track, row.play_count));
        }
        entries.sort_by_key(|entry| entry.index);
        Ok(entries)
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        let path = self.path_for(ledger.level())?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let tmp_path = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            for entry in ledger.entries() {
                writer.serialize(CsvRow {
                    index: entry.index,
                    level: ledger.level().to_string(),
                    track: entry.track_id.clone(),
                    play_count: entry.play_count,
                })?;
            }
            writer
                .flush()
                .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        }

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to replace {}", path.display()))
    }

    fn levels(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut levels = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let name = entry?.file_name();
            if let Some(level) = name.to_str().and_then(|name| name.strip_suffix(CSV_SUFFIX)) {
                levels.push(level.to_string());
            }
        }
        levels.sort();
        Ok(levels)
    }
}

/// Aggregate play counts of one level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelPlaySummary {
    pub level: String,
    pub track_count: usize,
    pub total_plays: u64,
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
}

/// Summaries for every configured level, in table order, from what is persisted.
pub fn summarize<S: LedgerStore + ?Sized>(
    store: &S,
    table: &LevelTable,
) -> Result<Vec<LevelPlaySummary>> {
    table
        .levels()
        .iter()
        .map(|level| {
            let ledger = Ledger::new(level.name.clone(), store.read(&level.name)?);
            Ok(LevelPlaySummary {
                level: level.name.clone(),
                track_count: ledger.len(),
                total_plays: ledger.total_plays(),
                min_count: ledger.min_count(),
                max_count: ledger.max_count(),
            })
        })
        .collect()
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

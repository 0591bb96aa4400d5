use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::store::LedgerStore;

/// One persisted play-count row of a level's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub index: u32,
    pub track_id: String,
    pub play_count: u32,
}

impl LedgerEntry {
    pub fn new(index: u32, track_id: impl Into<String>, play_count: u32) -> Self {
        Self {
            index,
            track_id: track_id.into(),
            play_count,
        }
    }
}

/// Play counts of every track in one level's reward pool, in stable row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    level: String,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new(level: impl Into<String>, entries: Vec<LedgerEntry>) -> Self {
        let mut ledger = Self {
            level: level.into(),
            entries,
        };
        ledger.reindex();
        ledger
    }

    /// Align persisted rows with the tracks currently in the pool.
    ///
    /// Rows for tracks that left the pool are dropped, new tracks are appended at zero, and
    /// surviving rows keep their relative order and counts.
    pub fn reconcile(level: impl Into<String>, persisted: Vec<LedgerEntry>, pool: &[String]) -> Self {
        let in_pool: HashSet<&str> = pool.iter().map(String::as_str).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries = Vec::with_capacity(pool.len());

        for entry in persisted {
            if in_pool.contains(entry.track_id.as_str()) && seen.insert(entry.track_id.clone()) {
                entries.push(entry);
            }
        }

        for track in pool {
            if seen.insert(track.clone()) {
                entries.push(LedgerEntry::new(0, track.clone(), 0));
            }
        }

        Self::new(level, entries)
    }

    /// Read the level's ledger, reconcile it with `pool` and write the result back.
    pub fn load<S: LedgerStore + ?Sized>(store: &S, level: &str, pool: &[String]) -> Result<Self> {
        let persisted = store
            .read(level)
            .with_context(|| format!("failed to read play counts for level '{level}'"))?;
        let ledger = Self::reconcile(level, persisted, pool);
        store
            .save(&ledger)
            .with_context(|| format!("failed to save play counts for level '{level}'"))?;
        Ok(ledger)
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, track_id: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|entry| entry.track_id == track_id)
            .map(|entry| entry.play_count)
    }

    /// Lowest play count in the pool; `None` when the pool is empty.
    pub fn min_count(&self) -> Option<u32> {
        self.entries.iter().map(|entry| entry.play_count).min()
    }

    pub fn max_count(&self) -> Option<u32> {
        self.entries.iter().map(|entry| entry.play_count).max()
    }

    pub fn total_plays(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| u64::from(entry.play_count))
            .sum()
    }

    /// Tracks whose play count is exactly `count`, in row order.
    pub fn tracks_with_count(&self, count: u32) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(move |entry| entry.play_count == count)
            .map(|entry| entry.track_id.as_str())
    }

    /// Add one play to `track_id` and return its new count.
    pub fn increment(&mut self, track_id: &str) -> Result<u32> {
        let level = &self.level;
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.track_id == track_id)
            .ok_or_else(|| anyhow!("track '{track_id}' is not in the pool of level '{level}'"))?;
        entry.play_count = entry
            .play_count
            .checked_add(1)
            .ok_or_else(|| anyhow!("play count overflow for track '{track_id}'"))?;
        Ok(entry.play_count)
    }

    /// Zero every count.
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.play_count = 0;
        }
    }

    fn reindex(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.index = index as u32;
        }
    }
}

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use log::warn;

const TRACK_EXTENSIONS: [&str; 2] = ["mp3", "flac"];

/// Enumerates the reward pool of a level.
pub trait TrackCatalog: Send {
    fn tracks(&self, level: &str) -> Result<Vec<String>>;
}

/// Reward pools laid out as `<root>/<level>/<track>.{mp3,flac}`; track ids are file names.
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl TrackCatalog for DirectoryCatalog {
    fn tracks(&self, level: &str) -> Result<Vec<String>> {
        let dir = self.root.join(level);
        if !dir.is_dir() {
            warn!("No reward folder for level '{}' at {}", level, dir.display());
            return Ok(Vec::new());
        }

        let mut tracks = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))? {
            let path = entry?.path();
            let is_track = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| TRACK_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
                .unwrap_or(false);
            if !is_track || !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                tracks.push(name.to_string());
            }
        }

        tracks.sort();
        Ok(tracks)
    }
}

/// Fixed pools held in memory.
#[derive(Default)]
pub struct MemoryCatalog {
    pools: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(self, level: &str, tracks: &[&str]) -> Self {
        self.set_pool(level, tracks);
        self
    }

    pub fn set_pool(&self, level: &str, tracks: &[&str]) {
        let mut guard = match self.pools.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(
            level.to_string(),
            tracks.iter().map(|track| track.to_string()).collect(),
        );
    }
}

impl TrackCatalog for MemoryCatalog {
    fn tracks(&self, level: &str) -> Result<Vec<String>> {
        let guard = self
            .pools
            .lock()
            .map_err(|_| anyhow!("catalog lock poisoned"))?;
        Ok(guard.get(level).cloned().unwrap_or_default())
    }
}

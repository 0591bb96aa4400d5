use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Minutes of study credited to one reward.
pub const REWARD_INTERVAL_MINUTES: u32 = 30;

/// A named stage of cumulative study time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDefinition {
    pub name: String,
    #[serde(rename = "start")]
    pub start_hours: f64,
    #[serde(rename = "end")]
    pub end_hours: f64,
    /// Number of rewards the level is expected to hand out before the next level starts.
    #[serde(rename = "random_count")]
    pub rotation_size: u32,
}

impl LevelDefinition {
    pub fn new(name: impl Into<String>, start_hours: f64, end_hours: f64, rotation_size: u32) -> Self {
        Self {
            name: name.into(),
            start_hours,
            end_hours,
            rotation_size,
        }
    }

    pub fn contains(&self, elapsed_minutes: u32) -> bool {
        let minutes = f64::from(elapsed_minutes);
        self.start_hours * 60.0 <= minutes && minutes < self.end_hours * 60.0
    }

    /// Rewards this level should have produced by `elapsed_hours`.
    ///
    /// One reward per half hour from the level start, capped at `rotation_size`.
    pub fn expected_plays(&self, elapsed_hours: f64) -> u32 {
        let effective = elapsed_hours - self.start_hours;
        let full_duration = f64::from(self.rotation_size) * 0.5;

        if effective < 0.0 {
            0
        } else if effective >= full_duration {
            self.rotation_size
        } else {
            let started = (effective / 0.5).floor() as u32 + 1;
            started.min(self.rotation_size)
        }
    }
}

/// Ordered level thresholds.
#[derive(Debug, Clone, Default)]
pub struct LevelTable {
    levels: Vec<LevelDefinition>,
}

impl LevelTable {
    /// Build a table, rejecting definitions that could never match or would be ambiguous.
    ///
    /// Overlaps and gaps between consecutive levels are allowed; the first match wins.
    pub fn new(levels: Vec<LevelDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        for level in &levels {
            if level.name.trim().is_empty() {
                bail!("level names must not be empty");
            }
            if !seen.insert(level.name.as_str()) {
                bail!("duplicate level name '{}'", level.name);
            }
            if level.rotation_size == 0 {
                bail!("level '{}' must rotate at least one reward", level.name);
            }
            if !(level.start_hours < level.end_hours) {
                bail!(
                    "level '{}' starts at {}h but ends at {}h",
                    level.name,
                    level.start_hours,
                    level.end_hours
                );
            }
        }

        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[LevelDefinition] {
        &self.levels
    }

    pub fn get(&self, name: &str) -> Option<&LevelDefinition> {
        self.levels.iter().find(|level| level.name == name)
    }

    /// First level whose `[start, end)` window contains `elapsed_minutes`.
    pub fn level_for(&self, elapsed_minutes: u32) -> Option<&LevelDefinition> {
        self.levels.iter().find(|level| level.contains(elapsed_minutes))
    }

    pub fn level_for_hours(&self, elapsed_hours: f64) -> Option<&LevelDefinition> {
        self.level_for(hours_to_minutes(elapsed_hours))
    }
}

// Absorbs float noise such as `0.7 * 60.0` landing just under 42.
const MINUTE_EPSILON: f64 = 1e-6;

/// Whole minutes in `hours`, seconds dropped. Negative and non-finite inputs map to zero.
pub fn hours_to_minutes(hours: f64) -> u32 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0;
    }
    (hours * 60.0 + MINUTE_EPSILON)
        .floor()
        .min(f64::from(u32::MAX)) as u32
}

/// Half-hour slot used to deduplicate rewards.
pub fn half_hour_slot(elapsed_minutes: u32) -> u32 {
    elapsed_minutes / REWARD_INTERVAL_MINUTES
}

//! Five-minute activity samples and the blocks they collapse into.

pub mod clusterer;
pub mod daily_log;
pub mod replay;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

pub use clusterer::cluster_samples;
pub use daily_log::{
    append_sample, daily_log_path, parse_samples, read_samples, recent_logs, study_minutes, RecentLog,
    DEFAULT_RECENT_LOGS,
};
pub use replay::{plan_replay, replay_log, ReplayGrid, ReplayStep};

/// Screen coordinate recorded with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySample {
    pub time: NaiveTime,
    pub activity_type: String,
    pub coordinate: ScreenPoint,
}

impl ActivitySample {
    pub fn new(time: NaiveTime, activity_type: impl Into<String>, coordinate: ScreenPoint) -> Self {
        Self {
            time,
            activity_type: activity_type.into(),
            coordinate,
        }
    }
}

/// Contiguous run of same-type samples; `coordinate` is the one of the last merged sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBlock {
    pub activity_type: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub coordinate: ScreenPoint,
}

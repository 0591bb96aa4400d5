use std::path::Path;

use anyhow::Result;
use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::{cluster_samples, read_samples, ActivityBlock, ScreenPoint};
use crate::grid::codec::SLOT_MINUTES;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Touchscreen time-block grid the replay drives: one column per five minutes, one row per hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayGrid {
    pub top_left: ScreenPoint,
    pub bottom_right: ScreenPoint,
    pub first_hour: u32,
    pub columns: u32,
    pub rows: u32,
}

impl Default for ReplayGrid {
    fn default() -> Self {
        Self {
            top_left: ScreenPoint::new(155, 385),
            bottom_right: ScreenPoint::new(700, 1992),
            first_hour: 6,
            columns: 12,
            rows: 16,
        }
    }
}

impl ReplayGrid {
    fn block_width(&self) -> f64 {
        f64::from(self.bottom_right.x - self.top_left.x) / f64::from(self.columns.max(1))
    }

    fn block_height(&self) -> f64 {
        f64::from(self.bottom_right.y - self.top_left.y) / f64::from(self.rows.max(1))
    }

    /// Centre of the block holding `time`, or `None` outside the grid or off the 5-minute raster.
    pub fn position(&self, time: NaiveTime) -> Option<ScreenPoint> {
        let (hour, minute) = (time.hour(), time.minute());
        if hour < self.first_hour || hour >= self.first_hour + self.rows {
            return None;
        }
        if minute % SLOT_MINUTES != 0 || time.second() != 0 {
            return None;
        }
        let column = minute / SLOT_MINUTES;
        if column >= self.columns {
            return None;
        }
        let row = hour - self.first_hour;

        let x = f64::from(self.top_left.x) + (f64::from(column) + 0.5) * self.block_width();
        let y = f64::from(self.top_left.y) + (f64::from(row) + 0.5) * self.block_height();
        Some(ScreenPoint::new(x as i32, y as i32))
    }
}

/// Gestures replaying one block: drag across its slots, then tap the activity's button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    pub activity_type: String,
    pub slide_from: ScreenPoint,
    pub slide_to: ScreenPoint,
    pub tap: ScreenPoint,
}

/// Gesture plan for `blocks`. Logged samples mark the end of their slot, so both slide ends are
/// taken one slot earlier.
pub fn plan_replay(blocks: &[ActivityBlock], grid: &ReplayGrid) -> Vec<ReplayStep> {
    let slot = Duration::minutes(i64::from(SLOT_MINUTES));

    blocks
        .iter()
        .filter_map(|block| {
            let start = block.start_time - slot;
            let end = block.end_time - slot;

            let Some(slide_from) = grid.position(start) else {
                log_warn!(
                    "Skipping {} block {}-{}: no grid position for {}",
                    block.activity_type,
                    block.start_time.format("%H:%M"),
                    block.end_time.format("%H:%M"),
                    start.format("%H:%M")
                );
                return None;
            };
            let slide_to = grid.position(end).unwrap_or_else(|| {
                log_warn!(
                    "No grid position for {}, replaying {} block as a single slot",
                    end.format("%H:%M"),
                    block.activity_type
                );
                slide_from
            });

            Some(ReplayStep {
                activity_type: block.activity_type.clone(),
                slide_from,
                slide_to,
                tap: block.coordinate,
            })
        })
        .collect()
}

/// Blocks of one daily log and the gestures replaying them. A missing log has neither.
pub fn replay_log(path: &Path, grid: &ReplayGrid) -> Result<(Vec<ActivityBlock>, Vec<ReplayStep>)> {
    if !path.exists() {
        return Ok((Vec::new(), Vec::new()));
    }
    let blocks = cluster_samples(&read_samples(path)?);
    let steps = plan_replay(&blocks, grid);
    Ok((blocks, steps))
}

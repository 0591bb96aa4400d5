//! Daily five-minute activity logs.
//!
//! One CSV per day, `five_minute_log_YYYY-MM-DD.csv`, with a header row followed by
//! `HH:MM,status,activity_type,"x,y"` records.

use std::{
    fs::{self, File, OpenOptions},
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use csv::StringRecord;
use serde::Serialize;

use super::{ActivitySample, ScreenPoint};
use crate::grid::codec::SLOT_MINUTES;
use crate::rotation::store::ensure_parent;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const LOG_PREFIX: &str = "five_minute_log_";
const LOG_SUFFIX: &str = ".csv";
const HEADER: [&str; 4] = ["time", "status", "activity_type", "coordinate"];
const TIME_FORMAT: &str = "%H:%M";

pub const DEFAULT_RECENT_LOGS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentLog {
    pub date: NaiveDate,
    pub path: PathBuf,
}

pub fn daily_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{LOG_PREFIX}{}{LOG_SUFFIX}", date.format("%Y-%m-%d")))
}

fn reader_for<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input)
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT).ok()
}

fn parse_point(raw: &str) -> Option<ScreenPoint> {
    let (x, y) = raw.split_once(',')?;
    Some(ScreenPoint::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn sample_from(record: &StringRecord) -> Option<ActivitySample> {
    if record.len() < HEADER.len() {
        return None;
    }
    let time = parse_time(&record[0])?;
    let coordinate = parse_point(&record[3])?;
    Some(ActivitySample::new(time, record[2].trim(), coordinate))
}

/// Well-formed samples from a log; malformed rows are skipped with a warning.
pub fn parse_samples<R: Read>(input: R) -> Result<Vec<ActivitySample>> {
    let mut samples = Vec::new();
    for (line, record) in reader_for(input).records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                log_warn!("Skipping unreadable activity row {}: {}", line + 2, err);
                continue;
            }
        };
        match sample_from(&record) {
            Some(sample) => samples.push(sample),
            None => log_warn!("Skipping malformed activity row {}: {:?}", line + 2, record),
        }
    }
    Ok(samples)
}

pub fn read_samples(path: &Path) -> Result<Vec<ActivitySample>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open activity log {}", path.display()))?;
    parse_samples(file)
}

/// Minutes of study a log accounts for: one slot per row with a readable time.
/// A missing log counts as zero.
pub fn study_minutes(path: &Path) -> Result<u32> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path)
        .with_context(|| format!("failed to open activity log {}", path.display()))?;

    let mut slots = 0u32;
    for record in reader_for(file).records().flatten() {
        if record.len() >= HEADER.len() && parse_time(&record[0]).is_some() {
            slots += 1;
        }
    }
    Ok(slots * SLOT_MINUTES)
}

/// Append one sample, creating the log and its header on first write.
pub fn append_sample(path: &Path, status: &str, sample: &ActivitySample) -> Result<()> {
    ensure_parent(path)?;
    let needs_header = fs::metadata(path).map(|meta| meta.len() == 0).unwrap_or(true);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open activity log {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

    if needs_header {
        writer.write_record(HEADER)?;
    }
    let time = sample.time.format(TIME_FORMAT).to_string();
    let point = format!("{},{}", sample.coordinate.x, sample.coordinate.y);
    writer.write_record([time.as_str(), status, sample.activity_type.as_str(), point.as_str()])?;
    writer
        .flush()
        .with_context(|| format!("failed to write activity log {}", path.display()))?;
    Ok(())
}

/// Newest `limit` daily logs in `dir`, most recent first. A missing directory has none.
pub fn recent_logs(dir: &Path, limit: usize) -> Result<Vec<RecentLog>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut logs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let date = name
            .strip_prefix(LOG_PREFIX)
            .and_then(|rest| rest.strip_suffix(LOG_SUFFIX))
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());
        if let Some(date) = date {
            logs.push(RecentLog { date, path });
        }
    }

    logs.sort_by(|a, b| b.date.cmp(&a.date));
    logs.truncate(limit);
    Ok(logs)
}

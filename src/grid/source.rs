use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
    sync::RwLock,
};

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};

use super::codec::CellAddress;

/// Read access to the weekly study grid.
///
/// Implementations return the raw cell text; an empty string stands for an empty or missing cell.
pub trait GridSource: Send + Sync {
    fn read_cell(&self, cell: &CellAddress) -> Result<String>;
}

/// Grid backed by a CSV export of the weekly sheet (row 1 is the first CSV record, column `A`
/// the first field). The file is re-read on every call so edits show up on the next poll.
pub struct CsvGridSource {
    path: PathBuf,
}

impl CsvGridSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Grid export of the week containing `today`, see [`week_file_name`].
    pub fn for_week(dir: &Path, start_date: NaiveDate, today: NaiveDate) -> Option<Self> {
        week_file_name(start_date, today).map(|name| Self::new(dir.join(name)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GridSource for CsvGridSource {
    fn read_cell(&self, cell: &CellAddress) -> Result<String> {
        let column = cell
            .column_index()
            .ok_or_else(|| anyhow!("invalid column in cell {cell}"))?;
        if cell.row == 0 {
            return Ok(String::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("failed to open grid export {}", self.path.display()))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let record = match reader.records().nth(cell.row as usize - 1) {
            Some(record) => record.with_context(|| {
                format!("failed to read row {} of {}", cell.row, self.path.display())
            })?,
            None => return Ok(String::new()),
        };

        Ok(record
            .get(column as usize - 1)
            .map(|value| value.trim().to_string())
            .unwrap_or_default())
    }
}

/// Follows the weekly export files in `dir`, switching to the next week's file as the local
/// date advances.
pub struct WeeklyGridSource {
    dir: PathBuf,
    start_date: NaiveDate,
}

impl WeeklyGridSource {
    pub fn new(dir: PathBuf, start_date: NaiveDate) -> Self {
        Self { dir, start_date }
    }

    pub fn current(&self, today: NaiveDate) -> Result<CsvGridSource> {
        CsvGridSource::for_week(&self.dir, self.start_date, today).ok_or_else(|| {
            anyhow!(
                "{today} is before the first tracked week starting {}",
                self.start_date
            )
        })
    }
}

impl GridSource for WeeklyGridSource {
    fn read_cell(&self, cell: &CellAddress) -> Result<String> {
        self.current(Local::now().date_naive())?.read_cell(cell)
    }
}

/// In-memory grid, mostly for tests and dry runs.
#[derive(Default)]
pub struct MemoryGridSource {
    cells: RwLock<HashMap<CellAddress, String>>,
}

impl MemoryGridSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cell: CellAddress, value: impl Into<String>) {
        let mut guard = match self.cells.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(cell, value.into());
    }
}

impl GridSource for MemoryGridSource {
    fn read_cell(&self, cell: &CellAddress) -> Result<String> {
        let guard = self
            .cells
            .read()
            .map_err(|_| anyhow!("memory grid lock poisoned"))?;
        Ok(guard.get(cell).cloned().unwrap_or_default())
    }
}

/// Parse a cumulative-time cell (`H:MM:SS`, `H:MM`, optional fractional seconds) into whole
/// minutes.
///
/// Empty cells count as zero. Durations exported as spreadsheet datetimes
/// (`1899-12-30 02:35:00`, `1899-12-31 01:00:00` for 25 hours) count whole days since the
/// 1899-12-30 epoch plus the time part.
pub fn parse_elapsed(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0);
    }

    let (date, time) = trimmed.split_once([' ', 'T']).unwrap_or((trimmed, ""));
    if let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
        let days = u32::try_from((date - epoch).num_days()).ok()?;
        let time = time.trim();
        let minutes = if time.is_empty() { 0 } else { parse_clock(time)? };
        return days.checked_mul(24 * 60)?.checked_add(minutes);
    }

    parse_clock(trimmed)
}

fn parse_clock(trimmed: &str) -> Option<u32> {
    let whole = trimmed.split('.').next()?;
    let mut parts = whole.split(':');
    let hours: u32 = parts.next()?.trim().parse().ok()?;
    let minutes: u32 = parts.next()?.trim().parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    if let Some(seconds) = parts.next() {
        let seconds: u32 = seconds.trim().parse().ok()?;
        if seconds >= 60 {
            return None;
        }
    }
    if parts.next().is_some() {
        return None;
    }

    hours.checked_mul(60)?.checked_add(minutes)
}

/// File name of the weekly grid export for the week containing `today`.
///
/// Weeks are numbered from 1 starting at `start_date`; dates before it have no file.
pub fn week_file_name(start_date: NaiveDate, today: NaiveDate) -> Option<String> {
    let days = (today - start_date).num_days();
    if days < 0 {
        return None;
    }

    let week_number = days / 7 + 1;
    let start_of_week = start_date + chrono::Duration::weeks(week_number - 1);
    let end_of_week = start_of_week + chrono::Duration::days(6);

    Some(format!(
        "week_{}_{}-{}.csv",
        week_number,
        start_of_week.format("%m.%d"),
        end_of_week.format("%m.%d")
    ))
}

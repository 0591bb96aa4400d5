//! Mapping between clock times and cells of the weekly day/night table.
//!
//! The weekly sheet stacks two weekdays side by side per 34-row band (Monday|Tuesday,
//! Wednesday|Thursday, ...). Each weekday owns a day table (06:05–15:04, starting at column
//! `J`) and a night table (15:05–22:04, starting at column `A`). A table column holds twelve
//! 5-minute slots laid out as six row pairs with one empty row between pairs.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rows between the top of one weekday pair and the next.
pub const DAY_SHIFT: u32 = 34;
/// Columns between the even and the odd weekday of a pair.
pub const WEEKDAY_SHIFT: u32 = 20;
pub const DAY_START_COL: &str = "J";
pub const NIGHT_START_COL: &str = "A";

pub const SLOT_MINUTES: u32 = 5;
const SLOTS_PER_COLUMN: u32 = 12;
const ROWS_PER_PAIR: u32 = 3;

const DAY_START_COL_INDEX: u32 = 10;
const NIGHT_START_COL_INDEX: u32 = 1;

// Cumulative study time for the day sits in N22 (Monday) and shifts like the tables do.
const SUMMARY_COL_INDEX: u32 = 14;
const SUMMARY_ROW: u32 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleSection {
    Day,
    Night,
}

impl ScheduleSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleSection::Day => "day",
            ScheduleSection::Night => "night",
        }
    }

    /// First trackable minute of the table, counted from midnight.
    pub fn start_minute(self) -> u32 {
        match self {
            ScheduleSection::Day => 6 * 60 + 5,
            ScheduleSection::Night => 15 * 60 + 5,
        }
    }

    /// Last trackable minute of the table (inclusive).
    pub fn end_minute(self) -> u32 {
        match self {
            ScheduleSection::Day => 15 * 60 + 4,
            ScheduleSection::Night => 22 * 60 + 4,
        }
    }

    pub fn start_time(self) -> Option<NaiveTime> {
        clock(self.start_minute())
    }

    pub fn contains(self, time: NaiveTime) -> bool {
        let minute = minute_of_day(time);
        self.start_minute() <= minute && minute <= self.end_minute()
    }

    fn start_column(self) -> u32 {
        match self {
            ScheduleSection::Day => DAY_START_COL_INDEX,
            ScheduleSection::Night => NIGHT_START_COL_INDEX,
        }
    }

    fn base_row(self) -> u32 {
        match self {
            ScheduleSection::Day => 2,
            ScheduleSection::Night => 14,
        }
    }

    fn slot_count(self) -> u32 {
        (self.end_minute() - self.start_minute()) / SLOT_MINUTES + 1
    }

    fn column_span(self) -> u32 {
        (self.slot_count() + SLOTS_PER_COLUMN - 1) / SLOTS_PER_COLUMN
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellAddress {
    pub column: String,
    pub row: u32,
}

impl CellAddress {
    pub fn new(column: impl Into<String>, row: u32) -> Self {
        Self {
            column: column.into(),
            row,
        }
    }

    /// 1-based column index (`A` = 1), `None` for an empty or non-alphabetic column.
    pub fn column_index(&self) -> Option<u32> {
        column_index(&self.column)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

/// Convert column letters to a 1-based index (`A` = 1, `Z` = 26, `AA` = 27).
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }

    letters.chars().try_fold(0u32, |acc, ch| {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

/// Convert a 1-based column index back to letters. Index 0 has no letters.
pub fn column_letters(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let remainder = (index - 1) % 26;
        letters.push((b'A' + remainder as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

fn clock(minute_of_day: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minute_of_day / 60, minute_of_day % 60, 0)
}

fn weekday_from_index(index: u32) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

/// Which table a clock time belongs to, ignoring seconds.
pub fn section_of(time: NaiveTime) -> Option<ScheduleSection> {
    [ScheduleSection::Day, ScheduleSection::Night]
        .into_iter()
        .find(|section| section.contains(time))
}

fn encode(section: ScheduleSection, weekday: u32, slot: u32) -> CellAddress {
    let row_offset = (weekday / 2) * DAY_SHIFT;
    let col_offset = (weekday % 2) * WEEKDAY_SHIFT;

    let column = section.start_column() + col_offset + slot / SLOTS_PER_COLUMN;
    let slot_in_column = slot % SLOTS_PER_COLUMN;
    let row = section.base_row()
        + ROWS_PER_PAIR * (slot_in_column / 2)
        + slot_in_column % 2
        + row_offset;

    CellAddress::new(column_letters(column), row)
}

/// Cell that records the 5-minute slot containing `time` on `weekday`.
///
/// Returns `None` outside 06:05–15:04 and 15:05–22:04; such times are simply not tracked.
pub fn cell_for(time: NaiveTime, weekday: Weekday) -> Option<CellAddress> {
    let section = section_of(time)?;
    let slot = (minute_of_day(time) - section.start_minute()) / SLOT_MINUTES;
    Some(encode(section, weekday.num_days_from_monday(), slot))
}

/// Inverse of [`cell_for`]: the weekday and slot start time a cell records.
///
/// The four table column ranges of a weekday pair do not overlap, so the column alone tells the
/// table and the weekday parity. Anything `cell_for` cannot produce (gap rows, header rows,
/// columns between tables, a Sunday-pair odd column) yields `None`.
pub fn locate(cell: &CellAddress) -> Option<(Weekday, NaiveTime)> {
    let column = cell.column_index()?;
    if cell.row == 0 {
        return None;
    }

    let (section, parity, column_in_table) = [ScheduleSection::Day, ScheduleSection::Night]
        .into_iter()
        .flat_map(|section| (0..2).map(move |parity| (section, parity)))
        .find_map(|(section, parity)| {
            let first = section.start_column() + parity * WEEKDAY_SHIFT;
            (first..first + section.column_span())
                .contains(&column)
                .then(|| (section, parity, column - first))
        })?;

    let pair = (cell.row - 1) / DAY_SHIFT;
    let weekday = weekday_from_index(pair * 2 + parity)?;

    let row_in_pair = cell.row - pair * DAY_SHIFT;
    let offset = row_in_pair.checked_sub(section.base_row())?;
    let (row_pair, within) = (offset / ROWS_PER_PAIR, offset % ROWS_PER_PAIR);
    if within == 2 || row_pair >= SLOTS_PER_COLUMN / 2 {
        return None;
    }

    let slot = column_in_table * SLOTS_PER_COLUMN + row_pair * 2 + within;
    if slot >= section.slot_count() {
        return None;
    }

    let time = clock(section.start_minute() + slot * SLOT_MINUTES)?;

    let normalized = CellAddress::new(column_letters(column), cell.row);
    if cell_for(time, weekday).as_ref() != Some(&normalized) {
        return None;
    }

    Some((weekday, time))
}

/// Start time of the slot recorded at `column``row`, see [`locate`].
pub fn time_for(column: &str, row: u32) -> Option<NaiveTime> {
    locate(&CellAddress::new(column, row)).map(|(_, time)| time)
}

/// Cell holding the cumulative study time of `weekday`.
pub fn summary_cell_for(weekday: Weekday) -> CellAddress {
    let weekday = weekday.num_days_from_monday();
    CellAddress::new(
        column_letters(SUMMARY_COL_INDEX + (weekday % 2) * WEEKDAY_SHIFT),
        SUMMARY_ROW + (weekday / 2) * DAY_SHIFT,
    )
}

/// Round a clock time down to its 5-minute mark, dropping seconds.
pub fn floor_to_slot(time: NaiveTime) -> NaiveTime {
    let minute = minute_of_day(time);
    clock(minute - minute % SLOT_MINUTES).unwrap_or(time)
}

/// Next 5-minute boundary at or after `now` (seconds dropped).
///
/// When that boundary falls outside both tables the nearer of today's table starts
/// (06:05 or 15:05) is returned instead.
pub fn next_trackable_tick(now: NaiveDateTime) -> NaiveDateTime {
    let truncated = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let wait = (SLOT_MINUTES - now.minute() % SLOT_MINUTES) % SLOT_MINUTES;
    let next = truncated + Duration::minutes(i64::from(wait));

    if section_of(next.time()).is_some() {
        return next;
    }

    [ScheduleSection::Day, ScheduleSection::Night]
        .into_iter()
        .filter_map(|section| section.start_time())
        .map(|start| now.date().and_time(start))
        .min_by_key(|candidate| (*candidate - now).num_seconds().abs())
        .unwrap_or(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    const WEEK: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    #[test]
    fn monday_day_table_starts_at_j2() {
        assert_eq!(cell_for(t(6, 5), Weekday::Mon), Some(CellAddress::new("J", 2)));
        assert_eq!(cell_for(t(6, 10), Weekday::Mon), Some(CellAddress::new("J", 3)));
    }

    #[test]
    fn gap_row_is_skipped_between_pairs() {
        assert_eq!(cell_for(t(6, 15), Weekday::Mon), Some(CellAddress::new("J", 5)));
        assert_eq!(cell_for(t(6, 20), Weekday::Mon), Some(CellAddress::new("J", 6)));
        assert_eq!(cell_for(t(7, 0), Weekday::Mon), Some(CellAddress::new("J", 18)));
    }

    #[test]
    fn thirteenth_slot_moves_to_next_column() {
        assert_eq!(cell_for(t(7, 5), Weekday::Mon), Some(CellAddress::new("K", 2)));
        assert_eq!(cell_for(t(15, 0), Weekday::Mon), Some(CellAddress::new("R", 18)));
    }

    #[test]
    fn monday_night_table_starts_at_a14() {
        assert_eq!(cell_for(t(15, 5), Weekday::Mon), Some(CellAddress::new("A", 14)));
        assert_eq!(cell_for(t(22, 0), Weekday::Mon), Some(CellAddress::new("G", 30)));
    }

    #[test]
    fn weekday_pairs_shift_columns_and_rows() {
        assert_eq!(cell_for(t(6, 5), Weekday::Tue), Some(CellAddress::new("AD", 2)));
        assert_eq!(cell_for(t(6, 5), Weekday::Wed), Some(CellAddress::new("J", 36)));
        assert_eq!(cell_for(t(15, 5), Weekday::Thu), Some(CellAddress::new("U", 48)));
        assert_eq!(cell_for(t(6, 5), Weekday::Sun), Some(CellAddress::new("J", 104)));
    }

    #[test]
    fn partial_minutes_fall_into_their_slot() {
        assert_eq!(cell_for(t(6, 9), Weekday::Mon), cell_for(t(6, 5), Weekday::Mon));
        assert_eq!(cell_for(t(15, 4), Weekday::Mon), cell_for(t(15, 0), Weekday::Mon));
    }

    #[test]
    fn times_outside_both_tables_have_no_cell() {
        for (hour, minute) in [(0, 0), (6, 0), (6, 4), (22, 5), (23, 59), (3, 30)] {
            for weekday in WEEK {
                assert_eq!(cell_for(t(hour, minute), weekday), None, "{hour}:{minute}");
            }
        }
    }

    #[test]
    fn every_trackable_slot_round_trips() {
        for weekday in WEEK {
            for section in [ScheduleSection::Day, ScheduleSection::Night] {
                let mut minute = section.start_minute();
                while minute <= section.end_minute() {
                    let time = clock(minute).unwrap();
                    let cell = cell_for(time, weekday).unwrap();
                    assert_eq!(locate(&cell), Some((weekday, time)), "{cell}");
                    minute += SLOT_MINUTES;
                }
            }
        }
    }

    #[test]
    fn locate_rejects_non_slot_cells() {
        // gap row, header row, column between tables, odd column in the Sunday band
        assert_eq!(time_for("J", 4), None);
        assert_eq!(time_for("J", 1), None);
        assert_eq!(time_for("H", 14), None);
        assert_eq!(time_for("AD", 104), None);
        assert_eq!(time_for("", 2), None);
        assert_eq!(time_for("J", 0), None);
    }

    #[test]
    fn locate_accepts_lowercase_columns() {
        assert_eq!(time_for("j", 3), Some(t(6, 10)));
    }

    #[test]
    fn column_helpers_are_inverse() {
        assert_eq!(column_index("A"), Some(1));
        assert_eq!(column_index("J"), Some(10));
        assert_eq!(column_index("AD"), Some(30));
        assert_eq!(column_index("A1"), None);
        for index in 1..=800 {
            assert_eq!(column_index(&column_letters(index)), Some(index));
        }
    }

    #[test]
    fn summary_cells_follow_weekday_layout() {
        assert_eq!(summary_cell_for(Weekday::Mon), CellAddress::new("N", 22));
        assert_eq!(summary_cell_for(Weekday::Tue), CellAddress::new("AH", 22));
        assert_eq!(summary_cell_for(Weekday::Fri), CellAddress::new("N", 90));
        assert_eq!(summary_cell_for(Weekday::Sun), CellAddress::new("N", 124));
    }

    #[test]
    fn floor_to_slot_drops_partial_minutes() {
        let time = NaiveTime::from_hms_opt(9, 13, 42).unwrap();
        assert_eq!(floor_to_slot(time), t(9, 10));
    }

    #[test]
    fn next_tick_rounds_up_inside_tables() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let now = date.and_hms_opt(9, 12, 30).unwrap();
        assert_eq!(next_trackable_tick(now), date.and_hms_opt(9, 15, 0).unwrap());

        let on_mark = date.and_hms_opt(9, 15, 20).unwrap();
        assert_eq!(next_trackable_tick(on_mark), date.and_hms_opt(9, 15, 0).unwrap());
    }

    #[test]
    fn next_tick_outside_tables_snaps_to_nearest_start() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let early = date.and_hms_opt(5, 0, 0).unwrap();
        assert_eq!(next_trackable_tick(early), date.and_hms_opt(6, 5, 0).unwrap());

        let late = date.and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(next_trackable_tick(late), date.and_hms_opt(15, 5, 0).unwrap());
    }
}

pub mod codec;
pub mod source;

pub use codec::{
    cell_for, locate, next_trackable_tick, section_of, summary_cell_for, time_for, CellAddress,
    ScheduleSection,
};
pub use source::{parse_elapsed, CsvGridSource, GridSource, MemoryGridSource, WeeklyGridSource};

pub mod table;

pub use table::{half_hour_slot, hours_to_minutes, LevelDefinition, LevelTable};

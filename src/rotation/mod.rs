pub mod catalog;
pub mod ledger;
pub mod selector;
pub mod store;

pub use catalog::{DirectoryCatalog, MemoryCatalog, TrackCatalog};
pub use ledger::{Ledger, LedgerEntry};
pub use selector::{EngineState, Evaluation, RewardSelector, Reward};
pub use store::{summarize, CsvLedgerStore, LedgerStore, LevelPlaySummary, MemoryLedgerStore};

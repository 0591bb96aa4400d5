pub mod controller;
pub mod loop_worker;

use std::sync::Arc;

use log::info;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::rotation::{EngineState, Reward, RewardSelector};

pub use controller::PollerController;
pub use loop_worker::{poll_loop, poll_once, PollTick, DEFAULT_POLL_INTERVAL_SECS};

/// Selector plus the progress state it advances, shared between the poll task and the host.
pub struct Engine<S, C> {
    pub selector: RewardSelector<S, C>,
    pub state: EngineState,
}

impl<S, C> Engine<S, C> {
    pub fn new(selector: RewardSelector<S, C>) -> Self {
        Self {
            selector,
            state: EngineState::default(),
        }
    }
}

pub type SharedEngine<S, C> = Arc<Mutex<Engine<S, C>>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PollEvent {
    #[serde(rename_all = "camelCase")]
    LevelChanged {
        previous: Option<String>,
        current: Option<String>,
        elapsed_minutes: u32,
    },
    Reward(Reward),
}

/// Receives what the poll loop decided; playback and notifications live behind this.
pub trait RewardSink: Send + Sync {
    fn handle(&self, event: PollEvent);
}

/// Sink that only logs.
pub struct LoggingSink;

impl RewardSink for LoggingSink {
    fn handle(&self, event: PollEvent) {
        match event {
            PollEvent::LevelChanged {
                previous,
                current,
                elapsed_minutes,
            } => info!(
                "Level {:?} -> {:?} after {} min of study",
                previous, current, elapsed_minutes
            ),
            PollEvent::Reward(reward) => info!(
                "Reward for level '{}': {} (played {} times)",
                reward.level, reward.track_id, reward.play_count
            ),
        }
    }
}

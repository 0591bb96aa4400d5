use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, Weekday};
use rand::{rngs::StdRng, Rng};
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{Engine, PollEvent, RewardSink, SharedEngine};
use crate::grid::{parse_elapsed, summary_cell_for, GridSource};
use crate::rotation::{Evaluation, LedgerStore, TrackCatalog};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// What the loop remembers between ticks.
#[derive(Debug, Default)]
pub struct PollTick {
    last_reading: Option<u32>,
}

impl PollTick {
    pub fn last_reading(&self) -> Option<u32> {
        self.last_reading
    }
}

pub async fn poll_loop<S, C>(
    engine: SharedEngine<S, C>,
    grid: Arc<dyn GridSource>,
    sink: Arc<dyn RewardSink>,
    interval: Duration,
    mut rng: StdRng,
    cancel_token: CancellationToken,
) where
    S: LedgerStore,
    C: TrackCatalog,
{
    let period = if interval.is_zero() {
        Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
    } else {
        interval
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick = PollTick::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let weekday = Local::now().weekday();
                if let Err(err) = poll_once(
                    &engine,
                    grid.as_ref(),
                    sink.as_ref(),
                    weekday,
                    &mut tick,
                    &mut rng,
                )
                .await
                {
                    log_error!("study time poll failed: {err:?}");
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("poll loop shutting down");
                break;
            }
        }
    }
}

/// Read today's cumulative study time and evaluate it.
///
/// Returns `Ok(None)` when the reading did not change since the last successful tick. A failed
/// evaluation leaves `tick` untouched so the same reading is retried.
pub async fn poll_once<S, C, R>(
    engine: &Mutex<Engine<S, C>>,
    grid: &dyn GridSource,
    sink: &dyn RewardSink,
    weekday: Weekday,
    tick: &mut PollTick,
    rng: &mut R,
) -> Result<Option<Evaluation>>
where
    S: LedgerStore,
    C: TrackCatalog,
    R: Rng + ?Sized,
{
    let cell = summary_cell_for(weekday);
    let raw = grid
        .read_cell(&cell)
        .with_context(|| format!("failed to read study time from {cell}"))?;
    let minutes =
        parse_elapsed(&raw).ok_or_else(|| anyhow!("unreadable study time {raw:?} in {cell}"))?;

    if tick.last_reading == Some(minutes) {
        log_debug!("study time unchanged at {} min", minutes);
        return Ok(None);
    }

    let evaluation = {
        let mut guard = engine.lock().await;
        let Engine { selector, state } = &mut *guard;
        selector.evaluate(state, minutes, rng)?
    };
    tick.last_reading = Some(minutes);

    if evaluation.transitioned {
        sink.handle(PollEvent::LevelChanged {
            previous: evaluation.previous_level.clone(),
            current: evaluation.level.as_ref().map(|level| level.name.clone()),
            elapsed_minutes: minutes,
        });
    }
    if let Some(reward) = &evaluation.reward {
        sink.handle(PollEvent::Reward(reward.clone()));
    }

    Ok(Some(evaluation))
}

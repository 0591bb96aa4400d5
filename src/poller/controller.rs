use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::poll_loop;
use super::{RewardSink, SharedEngine};
use crate::grid::GridSource;
use crate::rotation::{LedgerStore, TrackCatalog};

/// Owns the background poll task.
#[derive(Default)]
pub struct PollerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl PollerController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start<S, C>(
        &mut self,
        engine: SharedEngine<S, C>,
        grid: Arc<dyn GridSource>,
        sink: Arc<dyn RewardSink>,
        interval: Duration,
        rng: StdRng,
    ) -> Result<()>
    where
        S: LedgerStore + 'static,
        C: TrackCatalog + 'static,
    {
        if self.handle.is_some() {
            bail!("poller already running");
        }

        info!("Starting study time poller every {:?}", interval);
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            engine,
            grid,
            sink,
            interval,
            rng,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("poll loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{summary_cell_for, MemoryGridSource};
    use crate::poller::loop_worker::tests::{engine, RecordingSink};
    use crate::poller::PollEvent;
    use chrono::{Datelike, Local};
    use rand::SeedableRng;

    #[tokio::test]
    async fn start_polls_until_stopped() {
        let engine = Arc::new(engine());
        let grid = Arc::new(MemoryGridSource::new());
        grid.set(summary_cell_for(Local::now().weekday()), "1:00:00");
        let sink = Arc::new(RecordingSink::default());

        let mut controller = PollerController::new();
        controller
            .start(
                engine.clone(),
                grid,
                sink.clone(),
                Duration::from_millis(10),
                StdRng::seed_from_u64(1),
            )
            .unwrap();
        assert!(controller.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.stop().await.unwrap();
        assert!(!controller.is_running());

        let events = sink.events.lock().unwrap().clone();
        assert!(matches!(events.first(), Some(PollEvent::LevelChanged { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, PollEvent::Reward(_)))
                .count(),
            1
        );
        assert_eq!(engine.lock().await.state.last_known_level(), Some("warmup"));
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mut controller = PollerController::new();
        let start = |controller: &mut PollerController| {
            controller.start(
                Arc::new(engine()),
                Arc::new(MemoryGridSource::new()),
                Arc::new(RecordingSink::default()),
                Duration::from_secs(60),
                StdRng::seed_from_u64(0),
            )
        };

        start(&mut controller).unwrap();
        assert!(start(&mut controller).is_err());
        controller.stop().await.unwrap();
    }
}

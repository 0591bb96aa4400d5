//! Level tracking and fair reward rotation.
//!
//! Within a level every track at the lowest play count is handed out once before any track is
//! repeated. Counts are persisted through a [`LedgerStore`] after every confirmed play; which
//! tracks were already played in the current round is kept in memory only.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{anyhow, Context, Result};
use rand::{seq::SliceRandom, Rng};
use serde::Serialize;

use super::{
    catalog::TrackCatalog,
    ledger::Ledger,
    store::LedgerStore,
};
use crate::levels::{half_hour_slot, hours_to_minutes, LevelDefinition, LevelTable};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Host-owned progress state, reset on every process start.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    evaluated: bool,
    last_known_level: Option<String>,
    rewarded_half_hour_slots: BTreeSet<u32>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_known_level(&self) -> Option<&str> {
        self.last_known_level.as_deref()
    }

    pub fn has_rewarded(&self, slot: u32) -> bool {
        self.rewarded_half_hour_slots.contains(&slot)
    }

    pub fn rewarded_slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.rewarded_half_hour_slots.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub level: String,
    pub track_id: String,
    /// Count of the track after this play.
    pub play_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub elapsed_minutes: u32,
    pub level: Option<LevelDefinition>,
    pub previous_level: Option<String>,
    pub transitioned: bool,
    pub half_hour_slot: u32,
    pub reward: Option<Reward>,
}

#[derive(Debug, Default)]
struct RoundState {
    played: HashSet<String>,
    min_count: Option<u32>,
}

#[derive(Debug)]
struct LevelRotation {
    ledger: Ledger,
    round: RoundState,
}

pub struct RewardSelector<S, C> {
    store: S,
    catalog: C,
    table: LevelTable,
    rotations: HashMap<String, LevelRotation>,
}

impl<S: LedgerStore, C: TrackCatalog> RewardSelector<S, C> {
    pub fn new(store: S, catalog: C, table: LevelTable) -> Self {
        Self {
            store,
            catalog,
            table,
            rotations: HashMap::new(),
        }
    }

    pub fn table(&self) -> &LevelTable {
        &self.table
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current in-memory ledger of `level`, if it has been loaded.
    pub fn ledger(&self, level: &str) -> Option<&Ledger> {
        self.rotations.get(level).map(|rotation| &rotation.ledger)
    }

    /// (Re)load `level` against its current pool and start a fresh round.
    pub fn load_level(&mut self, level: &str) -> Result<&Ledger> {
        self.rotations.remove(level);

        let pool = self
            .catalog
            .tracks(level)
            .with_context(|| format!("failed to enumerate rewards for level '{level}'"))?;
        let ledger = Ledger::load(&self.store, level, &pool)?;
        log_info!(
            "Loaded {} reward tracks for level '{}' (lowest play count {:?})",
            ledger.len(),
            level,
            ledger.min_count()
        );

        let rotation = self
            .rotations
            .entry(level.to_string())
            .or_insert(LevelRotation {
                ledger,
                round: RoundState::default(),
            });
        Ok(&rotation.ledger)
    }

    fn ensure_loaded(&mut self, level: &str) -> Result<()> {
        if !self.rotations.contains_key(level) {
            self.load_level(level)?;
        }
        Ok(())
    }

    /// Pick the next reward of `level` without recording it.
    ///
    /// Returns `Ok(None)` when the level has no tracks. The only write this may perform is the
    /// full reset that happens once no tracks remain at any reachable count.
    pub fn select_reward<R: Rng + ?Sized>(
        &mut self,
        level: &str,
        rng: &mut R,
    ) -> Result<Option<String>> {
        self.ensure_loaded(level)?;
        let store = &self.store;
        let rotation = self
            .rotations
            .get_mut(level)
            .ok_or_else(|| anyhow!("level '{level}' is not loaded"))?;

        let Some(min_count) = rotation.ledger.min_count() else {
            return Ok(None);
        };

        let round = &mut rotation.round;
        if round.min_count != Some(min_count) {
            round.played.clear();
            round.min_count = Some(min_count);
        }

        let mut candidates = unplayed(&rotation.ledger, min_count, &round.played);

        if candidates.is_empty() {
            let tier = min_count.saturating_add(1);
            round.played.clear();
            round.min_count = Some(tier);
            candidates = unplayed(&rotation.ledger, tier, &round.played);
        }

        if candidates.is_empty() {
            log_warn!("Reward rotation for level '{}' exhausted; resetting play counts", level);
            let mut reset = rotation.ledger.clone();
            reset.reset();
            store
                .save(&reset)
                .with_context(|| format!("failed to reset play counts for level '{level}'"))?;
            rotation.ledger = reset;
            round.min_count = Some(0);
            candidates = unplayed(&rotation.ledger, 0, &round.played);
        }

        Ok(candidates.choose(rng).cloned())
    }

    /// Record that `track_id` was played: it leaves the current round and its count is persisted.
    pub fn confirm_played(&mut self, level: &str, track_id: &str) -> Result<u32> {
        self.ensure_loaded(level)?;
        let store = &self.store;
        let rotation = self
            .rotations
            .get_mut(level)
            .ok_or_else(|| anyhow!("level '{level}' is not loaded"))?;

        let mut next = rotation.ledger.clone();
        let count = next.increment(track_id)?;
        store
            .save(&next)
            .with_context(|| format!("failed to save play count of '{track_id}'"))?;

        rotation.ledger = next;
        rotation.round.played.insert(track_id.to_string());
        Ok(count)
    }

    /// Classify `elapsed_minutes`, report level changes and fire at most one reward per half hour.
    ///
    /// `state` is only updated when the whole evaluation succeeds, so a failed write is retried
    /// by the next call with the same reading.
    pub fn evaluate<R: Rng + ?Sized>(
        &mut self,
        state: &mut EngineState,
        elapsed_minutes: u32,
        rng: &mut R,
    ) -> Result<Evaluation> {
        let level = self.table.level_for(elapsed_minutes).cloned();
        let level_name = level.as_ref().map(|level| level.name.clone());
        let transitioned = !state.evaluated || state.last_known_level != level_name;
        let slot = half_hour_slot(elapsed_minutes);

        if transitioned {
            if let Some(name) = &level_name {
                self.load_level(name)?;
            }
        }

        let mut reward = None;
        if let Some(name) = &level_name {
            if !state.has_rewarded(slot) {
                match self.select_reward(name, rng)? {
                    Some(track_id) => {
                        let play_count = self.confirm_played(name, &track_id)?;
                        reward = Some(Reward {
                            level: name.clone(),
                            track_id,
                            play_count,
                        });
                    }
                    None => log_warn!("Level '{}' has no reward tracks", name),
                }
            }
        }

        let previous_level = state.last_known_level.clone();
        state.evaluated = true;
        state.last_known_level = level_name;
        if reward.is_some() {
            state.rewarded_half_hour_slots.insert(slot);
        }

        if transitioned {
            log_info!(
                "Level changed: {:?} -> {:?} at {} min",
                previous_level,
                state.last_known_level,
                elapsed_minutes
            );
        }

        Ok(Evaluation {
            elapsed_minutes,
            level,
            previous_level,
            transitioned,
            half_hour_slot: slot,
            reward,
        })
    }

    pub fn evaluate_hours<R: Rng + ?Sized>(
        &mut self,
        state: &mut EngineState,
        elapsed_hours: f64,
        rng: &mut R,
    ) -> Result<Evaluation> {
        self.evaluate(state, hours_to_minutes(elapsed_hours), rng)
    }
}

fn unplayed(ledger: &Ledger, count: u32, played: &HashSet<String>) -> Vec<String> {
    ledger
        .tracks_with_count(count)
        .filter(|track| !played.contains(*track))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::{
        catalog::MemoryCatalog,
        ledger::LedgerEntry,
        store::MemoryLedgerStore,
    };
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn table() -> LevelTable {
        LevelTable::new(vec![
            LevelDefinition::new("warmup", 0.5, 2.0, 3),
            LevelDefinition::new("focus", 2.0, 5.0, 6),
        ])
        .unwrap()
    }

    fn selector() -> TestSelector {
        let catalog = MemoryCatalog::new()
            .with_pool("warmup", &["w1.mp3", "w2.mp3", "w3.mp3"])
            .with_pool("focus", &["f1.mp3", "f2.flac"]);
        RewardSelector::new(MemoryLedgerStore::new(), catalog, table())
    }

    type TestSelector = RewardSelector<MemoryLedgerStore, MemoryCatalog>;

    fn play(selector: &mut TestSelector, rng: &mut StdRng) -> String {
        let track = selector.select_reward("warmup", rng).unwrap().unwrap();
        selector.confirm_played("warmup", &track).unwrap();
        track
    }

    #[test]
    fn every_track_plays_once_before_any_repeat() {
        let mut selector = selector();
        let mut rng = StdRng::seed_from_u64(7);

        for _round in 0..4 {
            let picked: HashSet<String> = (0..3).map(|_| play(&mut selector, &mut rng)).collect();
            assert_eq!(picked.len(), 3);
        }

        let ledger = selector.ledger("warmup").unwrap();
        assert!(ledger.entries().iter().all(|entry| entry.play_count == 4));
    }

    #[test]
    fn picks_come_from_the_lowest_count() {
        let store = MemoryLedgerStore::new();
        store
            .save(&Ledger::new(
                "warmup",
                vec![
                    LedgerEntry::new(0, "w1.mp3", 2),
                    LedgerEntry::new(1, "w2.mp3", 0),
                    LedgerEntry::new(2, "w3.mp3", 1),
                ],
            ))
            .unwrap();
        let catalog = MemoryCatalog::new().with_pool("warmup", &["w1.mp3", "w2.mp3", "w3.mp3"]);
        let mut selector = RewardSelector::new(store, catalog, table());
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..5 {
            assert_eq!(
                selector.select_reward("warmup", &mut rng).unwrap().as_deref(),
                Some("w2.mp3")
            );
        }
    }

    #[test]
    fn abandoned_selection_changes_nothing() {
        let mut selector = selector();
        let mut rng = StdRng::seed_from_u64(3);

        selector.select_reward("warmup", &mut rng).unwrap();
        let persisted = selector.store().read("warmup").unwrap();
        assert!(persisted.iter().all(|entry| entry.play_count == 0));

        let seen: HashSet<String> = (0..3).map(|_| play(&mut selector, &mut rng)).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn same_seed_same_sequence() {
        let run = |seed| {
            let mut selector = selector();
            let mut rng = StdRng::seed_from_u64(seed);
            (0..6).map(|_| play(&mut selector, &mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn exhausted_tier_moves_to_next_count() {
        let mut selector = selector();
        selector.load_level("warmup").unwrap();
        {
            let rotation = selector.rotations.get_mut("warmup").unwrap();
            rotation.ledger = Ledger::new(
                "warmup",
                vec![LedgerEntry::new(0, "w1.mp3", 0), LedgerEntry::new(1, "w2.mp3", 1)],
            );
            rotation.round.min_count = Some(0);
            rotation.round.played.insert("w1.mp3".to_string());
        }

        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(
            selector.select_reward("warmup", &mut rng).unwrap().as_deref(),
            Some("w2.mp3")
        );
    }

    #[test]
    fn full_exhaustion_resets_the_ledger() {
        let mut selector = selector();
        selector.load_level("warmup").unwrap();
        {
            let rotation = selector.rotations.get_mut("warmup").unwrap();
            rotation.ledger = Ledger::new(
                "warmup",
                vec![LedgerEntry::new(0, "w1.mp3", 3), LedgerEntry::new(1, "w2.mp3", 3)],
            );
            rotation.round.min_count = Some(3);
            rotation.round.played.insert("w1.mp3".to_string());
            rotation.round.played.insert("w2.mp3".to_string());
        }

        let mut rng = StdRng::seed_from_u64(5);
        let track = selector.select_reward("warmup", &mut rng).unwrap();
        assert!(matches!(track.as_deref(), Some("w1.mp3") | Some("w2.mp3")));

        let persisted = selector.store().read("warmup").unwrap();
        assert!(persisted.iter().all(|entry| entry.play_count == 0));
        assert_eq!(selector.ledger("warmup").unwrap().min_count(), Some(0));
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let catalog = MemoryCatalog::new();
        let mut selector = RewardSelector::new(MemoryLedgerStore::new(), catalog, table());
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(selector.select_reward("warmup", &mut rng).unwrap(), None);
    }

    #[test]
    fn empty_pool_leaves_the_slot_open() {
        let catalog = MemoryCatalog::new().with_pool("focus", &["f1.mp3"]);
        let mut selector = RewardSelector::new(MemoryLedgerStore::new(), catalog, table());
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        let evaluation = selector.evaluate(&mut state, 45, &mut rng).unwrap();
        assert_eq!(evaluation.level.unwrap().name, "warmup");
        assert!(evaluation.reward.is_none());
        assert!(!state.has_rewarded(1));
    }

    #[test]
    fn first_evaluation_is_a_transition_even_without_a_level() {
        let mut selector = selector();
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        let evaluation = selector.evaluate(&mut state, 10, &mut rng).unwrap();
        assert!(evaluation.transitioned);
        assert!(evaluation.level.is_none());
        assert!(evaluation.reward.is_none());

        let again = selector.evaluate(&mut state, 15, &mut rng).unwrap();
        assert!(!again.transitioned);
    }

    #[test]
    fn transition_fires_once_per_boundary() {
        let mut selector = selector();
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        let transitions: Vec<bool> = [40, 45, 100, 119, 120, 125, 200]
            .into_iter()
            .map(|minutes| selector.evaluate(&mut state, minutes, &mut rng).unwrap().transitioned)
            .collect();
        assert_eq!(transitions, vec![true, false, false, false, true, false, false]);
        assert_eq!(state.last_known_level(), Some("focus"));
    }

    #[test]
    fn backward_move_is_reported_as_transition() {
        let mut selector = selector();
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        selector.evaluate(&mut state, 130, &mut rng).unwrap();
        let back = selector.evaluate(&mut state, 60, &mut rng).unwrap();
        assert!(back.transitioned);
        assert_eq!(back.previous_level.as_deref(), Some("focus"));
        assert_eq!(back.level.unwrap().name, "warmup");
    }

    #[test]
    fn one_reward_per_half_hour_slot() {
        let mut selector = selector();
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        let first = selector.evaluate(&mut state, 65, &mut rng).unwrap();
        let second = selector.evaluate(&mut state, 70, &mut rng).unwrap();
        let third = selector.evaluate(&mut state, 90, &mut rng).unwrap();

        assert_eq!(first.half_hour_slot, 2);
        assert!(first.reward.is_some());
        assert!(second.reward.is_none());
        assert!(third.reward.is_some());
        assert_eq!(state.rewarded_slots().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(selector.ledger("warmup").unwrap().total_plays(), 2);
    }

    #[test]
    fn hours_are_accepted_too() {
        let mut selector = selector();
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        let evaluation = selector.evaluate_hours(&mut state, 2.25, &mut rng).unwrap();
        assert_eq!(evaluation.elapsed_minutes, 135);
        assert_eq!(evaluation.level.unwrap().name, "focus");
        assert_eq!(evaluation.reward.unwrap().level, "focus");
    }

    #[test]
    fn seconds_short_of_a_half_hour_stay_in_the_slot() {
        let mut selector = selector();
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        let first = selector.evaluate_hours(&mut state, 1.0, &mut rng).unwrap();
        let almost = selector
            .evaluate_hours(&mut state, 1.0 + 29.0 / 60.0 + 58.0 / 3600.0, &mut rng)
            .unwrap();
        assert_eq!(first.half_hour_slot, 2);
        assert_eq!(almost.elapsed_minutes, 89);
        assert_eq!(almost.half_hour_slot, 2);
        assert!(almost.reward.is_none());

        let crossing = selector
            .evaluate_hours(&mut state, 1.0 + 59.0 / 60.0 + 58.0 / 3600.0, &mut rng)
            .unwrap();
        assert_eq!(crossing.level.unwrap().name, "warmup");
        assert!(!crossing.transitioned);
    }

    #[test]
    fn transition_reconciles_pool_changes() {
        let catalog = MemoryCatalog::new()
            .with_pool("warmup", &["w1.mp3"])
            .with_pool("focus", &["f1.mp3"]);
        let mut selector = RewardSelector::new(MemoryLedgerStore::new(), catalog, table());
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        selector.evaluate(&mut state, 60, &mut rng).unwrap();
        selector.evaluate(&mut state, 130, &mut rng).unwrap();
        selector.catalog.set_pool("warmup", &["w1.mp3", "w9.mp3"]);

        let back = selector.evaluate(&mut state, 100, &mut rng).unwrap();
        assert_eq!(back.reward.unwrap().track_id, "w9.mp3");
        assert_eq!(selector.ledger("warmup").unwrap().len(), 2);
    }

    struct FlakyStore {
        inner: MemoryLedgerStore,
        failing: AtomicBool,
    }

    impl LedgerStore for FlakyStore {
        fn read(&self, level: &str) -> Result<Vec<LedgerEntry>> {
            self.inner.read(level)
        }

        fn save(&self, ledger: &Ledger) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(anyhow!("disk full"));
            }
            self.inner.save(ledger)
        }

        fn levels(&self) -> Result<Vec<String>> {
            self.inner.levels()
        }
    }

    #[test]
    fn persistence_failure_surfaces_and_keeps_the_slot_open() {
        let store = FlakyStore {
            inner: MemoryLedgerStore::new(),
            failing: AtomicBool::new(false),
        };
        let catalog = MemoryCatalog::new().with_pool("warmup", &["w1.mp3", "w2.mp3"]);
        let mut selector = RewardSelector::new(store, catalog, table());
        let mut state = EngineState::new();
        let mut rng = StdRng::seed_from_u64(0);

        selector.load_level("warmup").unwrap();
        selector.store.failing.store(true, Ordering::SeqCst);
        state.evaluated = true;
        state.last_known_level = Some("warmup".to_string());

        assert!(selector.evaluate(&mut state, 60, &mut rng).is_err());
        assert!(!state.has_rewarded(2));
        assert_eq!(selector.ledger("warmup").unwrap().total_plays(), 0);

        selector.store.failing.store(false, Ordering::SeqCst);
        let retry = selector.evaluate(&mut state, 60, &mut rng).unwrap();
        assert!(retry.reward.is_some());
        assert!(state.has_rewarded(2));
    }
}

//! In-memory [`PersistenceAdapter`] test double, so the rest of the
//! crate can be exercised without a running database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tokio::sync::Mutex;

use crate::error::Result;

use super::{pair_key, EngineRecord, GameRow, PairKey, PersistenceAdapter, RatingDelta, Tx, Winner};

#[derive(Debug, Clone)]
struct StoredEngine {
    record: EngineRecord,
    wins: i32,
    losses: i32,
    draws: i32,
}

#[derive(Default)]
struct State {
    engines: Vec<StoredEngine>,
    games: Vec<GameRow>,
    next_id: i32,
}

/// Thread-safe, process-local store. Every method takes its own lock and
/// releases it immediately; transactions buffer their writes and apply
/// them atomically under a single lock acquisition in `commit`.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    state: Arc<Mutex<State>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryPersistence {
    async fn add_engine(&self, name: &str, rating: i32, description: Option<&str>) -> Result<i32> {
        let _ = description;
        let mut state = self.state.lock().await;
        if let Some(existing) = state.engines.iter().find(|e| e.record.name == name) {
            return Ok(existing.record.id);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.engines.push(StoredEngine {
            record: EngineRecord {
                id,
                name: name.to_string(),
                rating,
                games_played: 0,
            },
            wins: 0,
            losses: 0,
            draws: 0,
        });
        Ok(id)
    }

    async fn get_engines_for_scheduling(&self) -> Result<Vec<EngineRecord>> {
        let state = self.state.lock().await;
        Ok(state.engines.iter().map(|e| e.record.clone()).collect())
    }

    async fn get_recent_games(&self, hours: i64) -> Result<Vec<GameRow>> {
        let state = self.state.lock().await;
        let cutoff = chrono::Utc::now().naive_utc() - ChronoDuration::hours(hours);
        Ok(state
            .games
            .iter()
            .filter(|g| g.played_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn get_pair_game_counts(&self) -> Result<HashMap<PairKey, u32>> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for game in &state.games {
            *counts.entry(pair_key(game.engine1_id, game.engine2_id)).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn begin_tx(&self) -> Result<Box<dyn Tx>> {
        Ok(Box::new(MemoryTx {
            state: self.state.clone(),
            pending_games: Vec::new(),
            pending_updates: HashMap::new(),
        }))
    }
}

struct PendingUpdate {
    new_rating: i32,
    delta: RatingDelta,
}

struct MemoryTx {
    state: Arc<Mutex<State>>,
    pending_games: Vec<GameRow>,
    pending_updates: HashMap<i32, PendingUpdate>,
}

#[async_trait]
impl Tx for MemoryTx {
    async fn read_rating(&mut self, engine_id: i32) -> Result<i32> {
        let state = self.state.lock().await;
        state
            .engines
            .iter()
            .find(|e| e.record.id == engine_id)
            .map(|e| e.record.rating)
            .ok_or_else(|| color_eyre::eyre::eyre!("unknown engine id {engine_id}"))
    }

    async fn insert_game(&mut self, row: GameRow) -> Result<()> {
        self.pending_games.push(row);
        Ok(())
    }

    async fn update_engine(&mut self, engine_id: i32, new_rating: i32, delta: RatingDelta) -> Result<()> {
        self.pending_updates.insert(engine_id, PendingUpdate { new_rating, delta });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.games.extend(self.pending_games);
        for (engine_id, update) in self.pending_updates {
            if let Some(engine) = state.engines.iter_mut().find(|e| e.record.id == engine_id) {
                engine.record.rating = update.new_rating;
                engine.record.games_played += update.delta.games_played;
                engine.wins += update.delta.wins;
                engine.losses += update.delta.losses;
                engine.draws += update.delta.draws;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl GameRow {
    pub fn winner_engine_id(&self) -> Option<i32> {
        match self.winner {
            Some(Winner::Engine1) => Some(self.engine1_id),
            Some(Winner::Engine2) => Some(self.engine2_id),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_engine_is_idempotent_on_name() {
        let store = MemoryPersistence::new();
        let id1 = store.add_engine("alpha", 1500, None).await.unwrap();
        let id2 = store.add_engine("alpha", 1500, None).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn rollback_leaves_no_trace() {
        let store = MemoryPersistence::new();
        let id = store.add_engine("alpha", 1500, None).await.unwrap();

        let mut tx = store.begin_tx().await.unwrap();
        tx.update_engine(id, 1600, RatingDelta { games_played: 1, ..Default::default() })
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let engines = store.get_engines_for_scheduling().await.unwrap();
        assert_eq!(engines[0].rating, 1500);
    }

    #[tokio::test]
    async fn commit_applies_rating_and_counters() {
        let store = MemoryPersistence::new();
        let id = store.add_engine("alpha", 1500, None).await.unwrap();

        let mut tx = store.begin_tx().await.unwrap();
        tx.update_engine(
            id,
            1516,
            RatingDelta {
                games_played: 2,
                wins: 1,
                losses: 0,
                draws: 1,
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let engines = store.get_engines_for_scheduling().await.unwrap();
        assert_eq!(engines[0].rating, 1516);
        assert_eq!(engines[0].games_played, 2);
    }
}

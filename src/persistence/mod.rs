//! Persistence adapter: the narrow capability set the core needs from
//! storage, behind an `async_trait` so the Elo updater and pairing
//! scheduler never know whether they're talking to Postgres or an
//! in-memory test double.

pub mod memory;
pub mod models;
pub mod pg;
pub mod schema;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;

use crate::error::Result;
use crate::game::{Color, GameOutcome, GameResult};

/// One row of `getEnginesForScheduling()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRecord {
    pub id: i32,
    pub name: String,
    pub rating: i32,
    pub games_played: i32,
}

/// A single played game, shaped for insertion; produced from a
/// [`GameResult`] plus the ratings read at the start of the owning
/// transaction.
#[derive(Debug, Clone)]
pub struct GameRow {
    pub engine1_id: i32,
    pub engine2_id: i32,
    pub winner: Option<Winner>,
    pub is_draw: bool,
    pub engine1_rating_before: i32,
    pub engine2_rating_before: i32,
    pub moves_json: String,
    pub duration_ms: i32,
    pub error: Option<String>,
    pub final_status_json: String,
    pub starting_position: String,
    pub match_set_name: String,
    pub engine1_color: Color,
    pub engine2_color: Color,
    pub played_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Engine1,
    Engine2,
}

impl GameRow {
    pub fn from_game_result(
        engine1_id: i32,
        engine2_id: i32,
        engine1_rating_before: i32,
        engine2_rating_before: i32,
        match_set_name: &str,
        game: &GameResult,
    ) -> Self {
        let (winner, is_draw) = match game.outcome {
            GameOutcome::Win => (Some(Winner::Engine1), false),
            GameOutcome::Loss => (Some(Winner::Engine2), false),
            GameOutcome::Draw => (None, true),
            GameOutcome::Error => (None, false),
        };

        let final_status_json = json!({
            "inProgress": game.final_status.in_progress,
            "playerToMove": game.final_status.player_to_move,
            "playerResults": game
                .final_status
                .player_results
                .iter()
                .map(|(player, r)| (player.to_string(), json!({"result": r.result, "score": r.score})))
                .collect::<serde_json::Map<_, _>>(),
        })
        .to_string();

        Self {
            engine1_id,
            engine2_id,
            winner,
            is_draw,
            engine1_rating_before,
            engine2_rating_before,
            moves_json: serde_json::to_string(&game.moves).unwrap_or_else(|_| "[]".to_string()),
            duration_ms: game.duration.as_millis().min(i32::MAX as u128) as i32,
            error: game.error.clone(),
            final_status_json,
            starting_position: game.starting_position.clone(),
            match_set_name: match_set_name.to_string(),
            engine1_color: game.engine1_color,
            engine2_color: game.engine2_color,
            played_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Per-engine counter deltas applied by one `updateEngine` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RatingDelta {
    pub games_played: i32,
    pub wins: i32,
    pub losses: i32,
    pub draws: i32,
}

/// A single pairwise game count, keyed low-id-first so (i, j) and (j, i)
/// collapse to the same entry — pair counts are stored and looked up
/// bidirectionally, independent of which engine happens to be engine1.
pub type PairKey = (i32, i32);

pub fn pair_key(a: i32, b: i32) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// One transaction over the store, opened by [`PersistenceAdapter::begin_tx`].
/// All mutation happens through a `Tx`; the adapter itself is read-mostly.
#[async_trait]
pub trait Tx: Send {
    async fn read_rating(&mut self, engine_id: i32) -> Result<i32>;
    async fn insert_game(&mut self, row: GameRow) -> Result<()>;
    async fn update_engine(&mut self, engine_id: i32, new_rating: i32, delta: RatingDelta) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// The narrow capability set consumed by the core orchestrator.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn add_engine(&self, name: &str, rating: i32, description: Option<&str>) -> Result<i32>;
    async fn get_engines_for_scheduling(&self) -> Result<Vec<EngineRecord>>;
    async fn get_recent_games(&self, hours: i64) -> Result<Vec<GameRow>>;
    async fn get_pair_game_counts(&self) -> Result<std::collections::HashMap<PairKey, u32>>;
    async fn begin_tx(&self) -> Result<Box<dyn Tx>>;
}

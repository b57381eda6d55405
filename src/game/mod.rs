//! Game-level value types and the game driver.
//!
//! `StartingPosition`, `MatchSet`, `GameResult`, and friends live here.
//! None of them carry board-game semantics — moves are opaque strings
//! the orchestrator never interprets; judging move legality is the
//! engine's job, not ours.

pub mod driver;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ugi::GameStatus;

/// One named starting point for a game: either a move prefix from the
/// game's own initial state, or an alternative initial-state descriptor
/// ("FEN-style" string, opaque to the core), or both — in which case the
/// alternative state is applied first and the moves replayed after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartingPosition {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub moves: Vec<String>,
    #[serde(rename = "fen")]
    pub alternative_initial_state: Option<String>,
}

/// A named, ordered set of starting positions played twice each (once per
/// color) between a single pair of engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSet {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "startingPositions")]
    pub positions: Vec<StartingPosition>,
    #[serde(rename = "gamesPerPosition", default = "default_games_per_position")]
    pub games_per_position: u32,
}

fn default_games_per_position() -> u32 {
    2
}

/// Which color engine1 plays in a given game; engine2 plays the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

/// Outcome of one game from engine1's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    Win,
    Loss,
    Draw,
    Error,
}

/// A per-move deadline schedule parsed from a `"base+increment"` time
/// control string, both components in seconds. The increment is added
/// to the running deadline after each reply.
#[derive(Debug, Clone, Copy)]
pub struct TimeControl {
    pub base: Duration,
    pub increment: Duration,
}

impl TimeControl {
    pub fn parse(spec: &str) -> Option<TimeControl> {
        let (base, increment) = spec.split_once('+')?;
        let base: f64 = base.trim().parse().ok()?;
        let increment: f64 = increment.trim().parse().ok()?;
        Some(TimeControl {
            base: Duration::from_secs_f64(base.max(0.0)),
            increment: Duration::from_secs_f64(increment.max(0.0)),
        })
    }
}

/// The complete record of one played game, as produced by the Game
/// Driver and consumed by the Elo Updater.
#[derive(Debug, Clone)]
pub struct GameResult {
    pub starting_position: String,
    pub match_set: String,
    pub engine1_color: Color,
    pub engine2_color: Color,
    pub outcome: GameOutcome,
    pub moves: Vec<String>,
    pub duration: Duration,
    pub final_status: GameStatus,
    pub error: Option<String>,
}

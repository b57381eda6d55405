//! Match-set runner: plays both colors of every starting position in a
//! [`MatchSet`] for one pair of engines, sequentially.

use std::time::Duration;

use tracing::warn;

use crate::game::driver::play_game;
use crate::game::{Color, GameOutcome, GameResult, MatchSet, TimeControl};
use crate::persistence::EngineRecord;
use crate::ugi::{EngineSession, SessionConfig};

const BETWEEN_GAMES_SETTLE: Duration = Duration::from_secs(1);

/// Aggregate outcome of one match set, ready for the Elo Updater.
#[derive(Debug, Clone)]
pub struct MatchSetResult {
    pub engine1: EngineRecord,
    pub engine2: EngineRecord,
    pub match_set_name: String,
    pub games: Vec<GameResult>,
    pub engine1_score: f64,
    pub engine2_score: f64,
    pub total_games: u32,
    pub completed: bool,
}

/// Plays every position in `match_set` twice (once per color) for the
/// pair (`engine1`, `engine2`), restarting an [`EngineSession`] pair for
/// each game. Always returns a result, even when some games errored;
/// `completed` is true only if every scheduled game produced a
/// non-error outcome.
#[tracing::instrument(skip(engine1, engine2, config1, config2, match_set), fields(engine1 = %engine1.name, engine2 = %engine2.name, match_set = %match_set.name))]
pub async fn run_match_set(
    engine1: EngineRecord,
    engine2: EngineRecord,
    config1: &SessionConfig,
    config2: &SessionConfig,
    match_set: &MatchSet,
    time_control: TimeControl,
    move_cap: Option<u32>,
) -> MatchSetResult {
    let mut games = Vec::new();
    let mut engine1_score = 0.0;
    let mut engine2_score = 0.0;
    let mut completed = true;

    for position in &match_set.positions {
        for c1 in [Color::White, Color::Black] {
            let game = play_one(config1, config2, position, &match_set.name, c1, time_control, move_cap).await;

            match game.outcome {
                GameOutcome::Win => engine1_score += 1.0,
                GameOutcome::Loss => engine2_score += 1.0,
                GameOutcome::Draw => {
                    engine1_score += 0.5;
                    engine2_score += 0.5;
                }
                GameOutcome::Error => {
                    completed = false;
                    warn!(
                        match_set = %match_set.name,
                        position = %position.name,
                        error = ?game.error,
                        "game ended in error"
                    );
                }
            }

            games.push(game);
            tokio::time::sleep(BETWEEN_GAMES_SETTLE).await;
        }
    }

    let total_games = games.len() as u32;
    MatchSetResult {
        engine1,
        engine2,
        match_set_name: match_set.name.clone(),
        games,
        engine1_score,
        engine2_score,
        total_games,
        completed,
    }
}

async fn play_one(
    config1: &SessionConfig,
    config2: &SessionConfig,
    position: &crate::game::StartingPosition,
    match_set_name: &str,
    c1: Color,
    time_control: TimeControl,
    move_cap: Option<u32>,
) -> GameResult {
    let (s1, s2) = match start_pair(config1, config2).await {
        Ok(pair) => pair,
        Err(err) => {
            return GameResult {
                starting_position: position.name.clone(),
                match_set: match_set_name.to_string(),
                engine1_color: c1,
                engine2_color: c1.opposite(),
                outcome: GameOutcome::Error,
                moves: Vec::new(),
                duration: Duration::default(),
                final_status: Default::default(),
                error: Some(err.to_string()),
            }
        }
    };

    play_game(s1, s2, position, match_set_name, c1, time_control, move_cap).await
}

async fn start_pair(
    config1: &SessionConfig,
    config2: &SessionConfig,
) -> Result<(EngineSession, EngineSession), crate::error::SessionError> {
    let s1 = EngineSession::start(config1).await?;
    match EngineSession::start(config2).await {
        Ok(s2) => Ok((s1, s2)),
        Err(err) => {
            s1.shutdown().await;
            Err(err)
        }
    }
}

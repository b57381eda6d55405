//! Elo updater: turns a [`MatchSetResult`] into a pair of rating deltas,
//! applied atomically alongside the game rows.
//!
//! The update is computed once per match set rather than once per game,
//! against the pair's *aggregate* score over the whole set. That's what
//! makes the balanced white/black split in the match-set runner matter:
//! a pair of games with colors swapped cancels out first-move advantage
//! before the rating delta is ever computed.

use crate::error::Result;
use crate::game::GameOutcome;
use crate::matchset::MatchSetResult;
use crate::persistence::{GameRow, PersistenceAdapter, RatingDelta};

/// Default K-factor: the maximum rating points a single match set can
/// move a rating by. Exposed as a config knob via `SchedulerConfig`, but
/// defaulted here since nothing currently overrides it.
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// `E1 = 1 / (1 + 10^((R2 - R1) / 400))`.
pub fn expected_score(rating_self: i32, rating_opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_opponent - rating_self) as f64 / 400.0))
}

/// Persists `result` and applies the aggregate rating change inside a
/// single transaction. Returns without any rating change (but still
/// commits the game rows) if every game errored.
#[tracing::instrument(skip(persistence, result), fields(match_set = %result.match_set_name), err)]
pub async fn apply_match_set_result(
    persistence: &dyn PersistenceAdapter,
    result: &MatchSetResult,
    k_factor: f64,
) -> Result<()> {
    let mut tx = persistence.begin_tx().await?;

    let rating1_before = tx.read_rating(result.engine1.id).await?;
    let rating2_before = tx.read_rating(result.engine2.id).await?;

    let non_error_games: Vec<_> = result
        .games
        .iter()
        .filter(|g| g.outcome != GameOutcome::Error)
        .collect();
    let n = non_error_games.len() as f64;

    for game in &result.games {
        let row = GameRow::from_game_result(
            result.engine1.id,
            result.engine2.id,
            rating1_before,
            rating2_before,
            &result.match_set_name,
            game,
        );
        tx.insert_game(row).await?;
    }

    if n == 0.0 {
        tx.commit().await?;
        return Ok(());
    }

    let e1 = expected_score(rating1_before, rating2_before);
    let e2 = 1.0 - e1;
    let a1 = result.engine1_score / n;
    let a2 = result.engine2_score / n;

    let delta1 = (k_factor * (a1 - e1)).round() as i32;
    let delta2 = (k_factor * (a2 - e2)).round() as i32;

    let (wins1, losses1, draws1) = tally(&non_error_games, Perspective::Engine1);
    let (wins2, losses2, draws2) = tally(&non_error_games, Perspective::Engine2);

    tx.update_engine(
        result.engine1.id,
        rating1_before + delta1,
        RatingDelta {
            games_played: n as i32,
            wins: wins1,
            losses: losses1,
            draws: draws1,
        },
    )
    .await?;
    tx.update_engine(
        result.engine2.id,
        rating2_before + delta2,
        RatingDelta {
            games_played: n as i32,
            wins: wins2,
            losses: losses2,
            draws: draws2,
        },
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

enum Perspective {
    Engine1,
    Engine2,
}

fn tally(games: &[&crate::game::GameResult], perspective: Perspective) -> (i32, i32, i32) {
    let (mut wins, mut losses, mut draws) = (0, 0, 0);
    for game in games {
        let outcome = match perspective {
            Perspective::Engine1 => game.outcome,
            Perspective::Engine2 => match game.outcome {
                GameOutcome::Win => GameOutcome::Loss,
                GameOutcome::Loss => GameOutcome::Win,
                other => other,
            },
        };
        match outcome {
            GameOutcome::Win => wins += 1,
            GameOutcome::Loss => losses += 1,
            GameOutcome::Draw => draws += 1,
            GameOutcome::Error => {}
        }
    }
    (wins, losses, draws)
}

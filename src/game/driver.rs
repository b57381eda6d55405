//! Game driver: plays exactly one game between two already handshaken
//! sessions.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::SessionError;
use crate::ugi::EngineSession;

use super::{Color, GameOutcome, GameResult, StartingPosition, TimeControl};

/// Hard cap on plies before a game is declared a `move-cap` draw.
const DEFAULT_MOVE_CAP: u32 = 500;

/// Upper bound on how long a `status` query may take. Kept separate from
/// the per-move deadline (which grows with the time control's increment)
/// so a slow time control can't also stretch out how long a hung
/// `status` response is tolerated.
const STATUS_QUERY_DEADLINE: Duration = Duration::from_secs(5);

/// Plays one game. `s1`/`s2` must already be handshaken (`Ready`). `c1`
/// is the color engine1 (owner of `s1`) plays; engine2 plays the other.
/// Both sessions are torn down before returning, success or failure.
#[tracing::instrument(skip(s1, s2, position, move_cap), fields(position = %position.name, match_set = %match_set))]
pub async fn play_game(
    mut s1: EngineSession,
    mut s2: EngineSession,
    position: &StartingPosition,
    match_set: &str,
    c1: Color,
    time_control: TimeControl,
    move_cap: Option<u32>,
) -> GameResult {
    let started = Instant::now();
    let move_cap = move_cap.unwrap_or(DEFAULT_MOVE_CAP);
    let c2 = c1.opposite();

    let result = run_game(&mut s1, &mut s2, position, c1, time_control, move_cap).await;

    s1.shutdown().await;
    s2.shutdown().await;

    let duration = started.elapsed();
    match result {
        Ok((outcome, moves, final_status)) => GameResult {
            starting_position: position.name.clone(),
            match_set: match_set.to_string(),
            engine1_color: c1,
            engine2_color: c2,
            outcome,
            moves,
            duration,
            final_status,
            error: None,
        },
        Err(err) => GameResult {
            starting_position: position.name.clone(),
            match_set: match_set.to_string(),
            engine1_color: c1,
            engine2_color: c2,
            outcome: GameOutcome::Error,
            moves: Vec::new(),
            duration,
            final_status: Default::default(),
            error: Some(err.to_string()),
        },
    }
}

async fn run_game(
    s1: &mut EngineSession,
    s2: &mut EngineSession,
    position: &StartingPosition,
    c1: Color,
    time_control: TimeControl,
    move_cap: u32,
) -> Result<(GameOutcome, Vec<String>, crate::ugi::GameStatus), SessionError> {
    if position.alternative_initial_state.is_some() {
        // The UGI subset in use has no dedicated position command;
        // replaying an alternative initial state is an engine capability
        // the protocol doesn't carry, so it always fails setup rather
        // than silently ignoring it.
        return Err(SessionError::SetupFailed(format!(
            "alternative initial state not supported for position {}",
            position.name
        )));
    }

    let mut moves = Vec::new();
    for mv in &position.moves {
        s1.apply_move(mv).await?;
        s2.apply_move(mv).await?;
        moves.push(mv.clone());
    }

    let mut deadline = time_control.base;
    let mut status = s1.query_status(STATUS_QUERY_DEADLINE).await?;
    let mut plies = 0u32;

    while status.in_progress {
        plies += 1;
        if plies > move_cap {
            warn!(match_set = %position.name, "move cap exceeded, declaring draw");
            return Ok((GameOutcome::Draw, moves, status));
        }

        let player = status.player_to_move.unwrap_or(1);
        let owner = owning_session(s1, s2, player, c1);

        let mv = match owner.request_move(deadline).await {
            Ok(mv) => mv,
            Err(SessionError::Timeout(_)) => {
                if owner.probe_alive(Duration::from_secs(5)).await {
                    // engine is alive but slow; treat as a lost game rather
                    // than hang the match set indefinitely.
                    return Err(SessionError::Timeout(deadline));
                }
                return Err(SessionError::EngineExited);
            }
            Err(err) => return Err(err),
        };

        s1.apply_move(&mv).await?;
        s2.apply_move(&mv).await?;
        moves.push(mv);

        deadline += time_control.increment;
        status = s1.query_status(STATUS_QUERY_DEADLINE).await?;
    }

    let outcome = translate_outcome(&status, c1);
    info!(position = %position.name, plies, ?outcome, "game finished");
    Ok((outcome, moves, status))
}

/// Maps a protocol player number (1 or 2) to the session that owns it,
/// given which color engine1 (`s1`) plays.
fn owning_session<'a>(
    s1: &'a mut EngineSession,
    s2: &'a mut EngineSession,
    player: u8,
    c1: Color,
) -> &'a mut EngineSession {
    let engine1_is_player_one = c1 == Color::White;
    if (player == 1) == engine1_is_player_one {
        s1
    } else {
        s2
    }
}

/// Translates the per-player result tokens into an outcome from
/// engine1's perspective. Both-win or neither-reporting are protocol
/// violations and map to `Error`.
fn translate_outcome(status: &crate::ugi::GameStatus, c1: Color) -> GameOutcome {
    let engine1_player: u8 = if c1 == Color::White { 1 } else { 2 };
    let engine2_player: u8 = if c1 == Color::White { 2 } else { 1 };

    let r1 = status.player_results.get(&engine1_player).map(|r| r.result.as_str());
    let r2 = status.player_results.get(&engine2_player).map(|r| r.result.as_str());

    match (r1, r2) {
        (Some("win"), Some("win")) => GameOutcome::Error,
        (Some("win"), _) => GameOutcome::Win,
        (_, Some("win")) => GameOutcome::Loss,
        (Some("draw"), _) | (_, Some("draw")) => GameOutcome::Draw,
        (None, None) => GameOutcome::Error,
        _ => GameOutcome::Draw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ugi::GameStatus;
    use std::collections::HashMap;

    fn status_with(results: &[(u8, &str)]) -> GameStatus {
        let mut player_results = HashMap::new();
        for (player, result) in results {
            player_results.insert(
                *player,
                crate::ugi::PlayerResult {
                    result: result.to_string(),
                    score: String::new(),
                },
            );
        }
        GameStatus {
            in_progress: false,
            player_to_move: None,
            player_results,
        }
    }

    #[test]
    fn engine1_win_as_white() {
        let status = status_with(&[(1, "win"), (2, "loss")]);
        assert_eq!(translate_outcome(&status, Color::White), GameOutcome::Win);
    }

    #[test]
    fn engine1_loss_as_black() {
        let status = status_with(&[(1, "win"), (2, "loss")]);
        assert_eq!(translate_outcome(&status, Color::Black), GameOutcome::Loss);
    }

    #[test]
    fn both_win_is_protocol_violation() {
        let status = status_with(&[(1, "win"), (2, "win")]);
        assert_eq!(translate_outcome(&status, Color::White), GameOutcome::Error);
    }

    #[test]
    fn no_results_is_error() {
        let status = status_with(&[]);
        assert_eq!(translate_outcome(&status, Color::White), GameOutcome::Error);
    }

    #[test]
    fn draw_result() {
        let status = status_with(&[(1, "draw"), (2, "draw")]);
        assert_eq!(translate_outcome(&status, Color::White), GameOutcome::Draw);
    }

    #[test]
    fn time_control_parses_base_plus_increment() {
        let tc = TimeControl::parse("5+0.1").unwrap();
        assert_eq!(tc.base, Duration::from_secs_f64(5.0));
        assert_eq!(tc.increment, Duration::from_secs_f64(0.1));
    }
}

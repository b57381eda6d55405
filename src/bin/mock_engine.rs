//! A tiny scripted UGI engine used only by this crate's own integration
//! tests and for manually exercising `play-game` without a real engine
//! on hand. It is an external test fixture, not part of the
//! orchestrator core.
//!
//! Behavior is controlled by environment variables so two instances of
//! the same binary can play against each other with a scripted, finite
//! game:
//! - `MOCK_ENGINE_PLIES` (default 4): total `makemove` count (both
//!   sides combined) after which the game is reported finished.
//! - `MOCK_ENGINE_P1_RESULT` (default "draw"): result token reported for
//!   player 1 once finished; player 2's token is the natural complement
//!   (`win`/`loss` flip, `draw` stays `draw`).
//! - `MOCK_ENGINE_CRASH_ON_INVOCATION` (optional, paired with
//!   `MOCK_ENGINE_COUNTER_FILE`): across several spawns of this binary
//!   sharing the same counter file, the spawn whose 1-based invocation
//!   number matches this value exits immediately without speaking any
//!   protocol, simulating an engine crash partway through a match set.
//! - `MOCK_ENGINE_THINK_MS` (optional): sleep this long before replying
//!   to `go`, so tests can control how long a game takes to play out.
//! - `MOCK_ENGINE_ACTIVITY_FILE` (optional): a shared counter file this
//!   process bumps up while alive and back down on exit, used by tests
//!   to observe how many engine processes are ever running at once.

use std::io::{self, BufRead, Write};
use std::time::Duration;

/// Bumps the invocation counter in `path` and returns the new count.
/// Used only to simulate a crash on a specific spawn among several.
fn next_invocation(path: &str) -> u32 {
    let count: u32 = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
        + 1;
    let _ = std::fs::write(path, count.to_string());
    count
}

/// Best-effort shared counter: not lock-protected, so concurrent bumps
/// can race and undercount, but it never overcounts, which is all the
/// callers that use it to check an upper bound need.
fn bump_activity(path: &str, delta: i64) {
    let current: i64 = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    let _ = std::fs::write(path, (current + delta).to_string());
}

fn main() {
    if let Ok(counter_file) = std::env::var("MOCK_ENGINE_COUNTER_FILE") {
        let crash_on: u32 = std::env::var("MOCK_ENGINE_CRASH_ON_INVOCATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if next_invocation(&counter_file) == crash_on {
            return;
        }
    }

    let activity_file = std::env::var("MOCK_ENGINE_ACTIVITY_FILE").ok();
    if let Some(path) = &activity_file {
        bump_activity(path, 1);
    }

    let plies_threshold: u32 = std::env::var("MOCK_ENGINE_PLIES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4);
    let think = std::env::var("MOCK_ENGINE_THINK_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis);
    let p1_result = std::env::var("MOCK_ENGINE_P1_RESULT").unwrap_or_else(|_| "draw".to_string());
    let p2_result = complement(&p1_result);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut applied_moves: u32 = 0;
    let mut go_count: u32 = 0;

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));

        match verb {
            "ugi" => {
                writeln!(stdout, "id name mock-engine").ok();
                writeln!(stdout, "ugiok").ok();
            }
            "setoption" => {}
            "isready" => {
                writeln!(stdout, "readyok").ok();
            }
            "go" => {
                if let Some(think) = think {
                    std::thread::sleep(think);
                }
                go_count += 1;
                writeln!(stdout, "bestmove m{go_count}").ok();
            }
            "makemove" => {
                let _ = rest;
                applied_moves += 1;
            }
            "status" => {
                if applied_moves >= plies_threshold {
                    writeln!(stdout, "status finished playertomove 0").ok();
                    writeln!(stdout, "info player 1 result {p1_result} score 1.0").ok();
                    writeln!(stdout, "info player 2 result {p2_result} score 1.0").ok();
                } else {
                    let player_to_move = applied_moves % 2 + 1;
                    writeln!(stdout, "status inprogress playertomove {player_to_move}").ok();
                }
            }
            "quit" => break,
            _ => {}
        }
        stdout.flush().ok();
    }

    if let Some(path) = &activity_file {
        bump_activity(path, -1);
    }
}

fn complement(result: &str) -> &'static str {
    match result {
        "win" => "loss",
        "loss" => "win",
        _ => "draw",
    }
}

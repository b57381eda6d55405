//! Test support: a [`SessionConfig`] pointed at the scripted
//! `mock-engine` binary shipped alongside this crate (see
//! `src/bin/mock_engine.rs`), for exercising a real child process
//! without depending on an actual board-game engine being installed.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::ugi::SessionConfig;

/// Locates the `mock-engine` binary built alongside the current test
/// target. Reads `CARGO_BIN_EXE_mock-engine` at runtime rather than via
/// the `env!` macro, since that variable is only guaranteed to be in
/// the *process* environment of a cargo-run test binary, not at the
/// compile time of whichever crate happens to define this function.
pub fn mock_engine_path() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_mock-engine")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("mock-engine"))
}

/// Builds a [`SessionConfig`] for a mock engine instance that reports
/// `p1_result` for player 1 (and its natural complement for player 2)
/// once `plies` total `makemove` calls have been observed.
pub fn mock_session_config(name: &str, plies: u32, p1_result: &str) -> SessionConfig {
    let mut env = HashMap::new();
    env.insert("MOCK_ENGINE_PLIES".to_string(), plies.to_string());
    env.insert("MOCK_ENGINE_P1_RESULT".to_string(), p1_result.to_string());

    SessionConfig {
        env,
        ..SessionConfig::new(name, mock_engine_path().to_string_lossy().into_owned())
    }
}

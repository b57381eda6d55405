//! Error types shared across the crate.
//!
//! Two layers: callers that need to distinguish a timeout from a crash
//! (the game driver, the match-set runner) match on a narrow
//! [`SessionError`] enum at protocol boundaries; everything above that
//! (CLI commands, config loading, persistence, `main`) uses
//! `color_eyre`'s `Report`-backed [`Result`].

use std::time::Duration;

pub use color_eyre::Result;

/// Failures surfaced by an [`crate::ugi::EngineSession`].
///
/// These are the named failure modes from the UGI session state machine
/// (handshake, move request, status query, shutdown). The Game Driver
/// decides whether a given `SessionError` is fatal for the current game.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to start engine process: {0}")]
    StartFailed(#[source] std::io::Error),

    #[error("engine did not complete handshake within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("engine rejected handshake: {0}")]
    HandshakeRejected(String),

    #[error("engine did not respond within {0:?}")]
    Timeout(Duration),

    #[error("engine sent an unexpected response: {0}")]
    BadResponse(String),

    #[error("engine process exited unexpectedly")]
    EngineExited,

    #[error("engine does not support the requested setup: {0}")]
    SetupFailed(String),

    #[error("I/O error communicating with engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for code that needs to pattern-match on a specific
/// session failure kind rather than an opaque `eyre::Report`.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

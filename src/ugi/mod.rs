//! Engine session: owns one child process speaking UGI, from spawn
//! through handshake, move requests, status queries, and teardown.
//!
//! The process is a tokio `Child` with piped stdio. A background task
//! drains stderr into the log for the life of the process; stdout is
//! read line-by-line on demand and every blocking read is wrapped in
//! `tokio::time::timeout` so a stuck engine can't hang the caller
//! forever. A move is just the opaque token the engine sent back — this
//! layer never interprets board state or checks legality.

pub mod protocol;

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use derivative::Derivative;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{SessionError, SessionResult};
use protocol::{Command, Message, Protocol};

const DEFAULT_HANDSHAKE_DEADLINE: Duration = Duration::from_secs(10);
const APPLY_MOVE_SETTLE: Duration = Duration::from_millis(50);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Launch parameters for one engine process, already merged from
/// `EngineConfig` plus any per-game option overrides. Kept separate from
/// the persisted `Engine`/`EngineConfig` types so a session can be
/// started without touching the config/persistence layers in tests.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub name: String,
    pub executable: String,
    pub working_dir: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub options: HashMap<String, String>,
    pub handshake_deadline: Duration,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            working_dir: None,
            args: Vec::new(),
            env: HashMap::new(),
            options: HashMap::new(),
            handshake_deadline: DEFAULT_HANDSHAKE_DEADLINE,
        }
    }
}

/// The session's observable lifecycle. `Thinking` is tracked only for
/// diagnostics: the protocol itself is request/response, so it mostly
/// distinguishes "a requestMove is in flight" from `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Spawned,
    Handshaking,
    Ready,
    Thinking,
    Quitting,
    Killed,
    Exited,
}

/// Final status observed from a `status` query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameStatus {
    pub in_progress: bool,
    pub player_to_move: Option<u8>,
    pub player_results: HashMap<u8, PlayerResult>,
}

impl GameStatus {
    fn fresh() -> Self {
        Self {
            in_progress: true,
            player_to_move: None,
            player_results: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerResult {
    pub result: String,
    pub score: String,
}

/// One child process and its UGI framing. Not `Clone`/`Sync` — a session
/// is owned by exactly one Game Driver invocation at a time.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct EngineSession {
    name: String,
    #[derivative(Debug = "ignore")]
    child: Child,
    #[derivative(Debug = "ignore")]
    protocol: Protocol,
    #[derivative(Debug = "ignore")]
    stderr_task: JoinHandle<()>,
    state: SessionState,
}

impl EngineSession {
    /// Spawns the process and runs the handshake in one call. Callers
    /// that only want the process up without a handshake (none do today)
    /// can still call [`Self::spawn`] and [`Self::handshake`] separately.
    #[tracing::instrument(skip(config), fields(engine = %config.name), err)]
    pub async fn start(config: &SessionConfig) -> SessionResult<Self> {
        let mut session = Self::spawn(config)?;
        session.handshake(config).await?;
        Ok(session)
    }

    /// Spawns the child process and wires up stdio, but does not speak
    /// the protocol yet. State: `Spawned`.
    pub fn spawn(config: &SessionConfig) -> SessionResult<Self> {
        let mut command = ProcessCommand::new(&config.executable);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(SessionError::StartFailed)?;

        let stdin = child.stdin.take().ok_or(SessionError::EngineExited)?;
        let stdout = child.stdout.take().ok_or(SessionError::EngineExited)?;
        let stderr = child.stderr.take().ok_or(SessionError::EngineExited)?;

        let name = config.name.clone();
        let stderr_task = tokio::spawn(drain_stderr(name.clone(), stderr));

        Ok(Self {
            name,
            child,
            protocol: Protocol::new(stdin, stdout),
            stderr_task,
            state: SessionState::Spawned,
        })
    }

    /// Runs the `ugi` → options → `isready` exchange, bounded by
    /// `config.handshake_deadline`.
    #[tracing::instrument(skip(self, config), fields(engine = %self.name), err)]
    pub async fn handshake(&mut self, config: &SessionConfig) -> SessionResult<()> {
        self.state = SessionState::Handshaking;
        let deadline = config.handshake_deadline;

        timeout(deadline, self.protocol.send(Command::Ugi))
            .await
            .map_err(|_| SessionError::HandshakeTimeout(deadline))??;

        loop {
            let message = timeout(deadline, self.protocol.recv())
                .await
                .map_err(|_| SessionError::HandshakeTimeout(deadline))??;
            match message {
                Message::UgiOk => break,
                Message::Id { .. } | Message::Other => continue,
                other => {
                    return Err(SessionError::HandshakeRejected(format!("{other:?}")));
                }
            }
        }

        for (name, value) in &config.options {
            timeout(
                deadline,
                self.protocol.send(Command::SetOption {
                    name: name.clone(),
                    value: value.clone(),
                }),
            )
            .await
            .map_err(|_| SessionError::HandshakeTimeout(deadline))??;
        }

        timeout(deadline, self.protocol.send(Command::IsReady))
            .await
            .map_err(|_| SessionError::HandshakeTimeout(deadline))??;

        loop {
            let message = timeout(deadline, self.protocol.recv())
                .await
                .map_err(|_| SessionError::HandshakeTimeout(deadline))??;
            match message {
                Message::ReadyOk => break,
                Message::Other => continue,
                other => {
                    return Err(SessionError::HandshakeRejected(format!("{other:?}")));
                }
            }
        }

        self.state = SessionState::Ready;
        info!(engine = %self.name, "handshake complete");
        Ok(())
    }

    /// Sends `go` and waits for `bestmove <token>`, bounded by `deadline`.
    /// A timed-out request leaves the session in `Ready` if a follow-up
    /// `isready`/`readyok` probe still succeeds; callers that want that
    /// probe should call [`Self::probe_alive`].
    #[tracing::instrument(skip(self), fields(engine = %self.name), err)]
    pub async fn request_move(&mut self, deadline: Duration) -> SessionResult<String> {
        self.state = SessionState::Thinking;
        self.protocol.send(Command::Go).await?;

        let result = timeout(deadline, async {
            loop {
                match self.protocol.recv().await? {
                    Message::BestMove(mv) => return Ok(mv),
                    _ => continue,
                }
            }
        })
        .await;

        match result {
            Ok(Ok(mv)) => {
                self.state = SessionState::Ready;
                Ok(mv)
            }
            Ok(Err(err)) => {
                self.state = SessionState::Exited;
                Err(err)
            }
            Err(_) => Err(SessionError::Timeout(deadline)),
        }
    }

    /// Confirms the engine is still responsive after a timed-out request,
    /// via a fresh `isready`/`readyok` round trip.
    pub async fn probe_alive(&mut self, deadline: Duration) -> bool {
        if self.protocol.send(Command::IsReady).await.is_err() {
            self.state = SessionState::Exited;
            return false;
        }
        match timeout(deadline, self.protocol.recv()).await {
            Ok(Ok(Message::ReadyOk)) => {
                self.state = SessionState::Ready;
                true
            }
            _ => {
                self.state = SessionState::Exited;
                false
            }
        }
    }

    /// Fire-and-forget `makemove`, with a short settle delay so it never
    /// races a following command.
    pub async fn apply_move(&mut self, mv: &str) -> SessionResult<()> {
        self.protocol.send(Command::MakeMove(mv.to_string())).await?;
        tokio::time::sleep(APPLY_MOVE_SETTLE).await;
        Ok(())
    }

    /// Sends `status` and accumulates lines until both players' result
    /// tokens are seen or `deadline` elapses, returning whatever was
    /// gathered either way.
    #[tracing::instrument(skip(self), fields(engine = %self.name), err)]
    pub async fn query_status(&mut self, deadline: Duration) -> SessionResult<GameStatus> {
        self.protocol.send(Command::Status).await?;

        let mut status = GameStatus::fresh();
        let deadline_fut = async {
            loop {
                match self.protocol.recv().await? {
                    Message::Status {
                        in_progress,
                        player_to_move,
                    } => {
                        status.in_progress = in_progress;
                        status.player_to_move = player_to_move;
                        if !in_progress && status.player_results.len() >= 2 {
                            return Ok::<(), SessionError>(());
                        }
                    }
                    Message::InfoPlayerResult(token) => {
                        status.player_results.insert(
                            token.player,
                            PlayerResult {
                                result: token.result,
                                score: token.score,
                            },
                        );
                        if !status.in_progress && status.player_results.len() >= 2 {
                            return Ok(());
                        }
                    }
                    _ => continue,
                }
            }
        };

        match timeout(deadline, deadline_fut).await {
            Ok(Ok(())) | Err(_) => {}
            Ok(Err(err)) => return Err(err),
        }
        Ok(status)
    }

    /// Graceful `quit`, falling back to a forced kill after a grace
    /// period. Idempotent: calling this twice is a no-op the second time.
    pub async fn shutdown(mut self) {
        if self.state == SessionState::Exited || self.state == SessionState::Killed {
            return;
        }
        self.state = SessionState::Quitting;
        let _ = self.protocol.send(Command::Quit).await;
        drop(self.protocol);

        let waited = timeout(SHUTDOWN_GRACE, self.child.wait()).await;
        if waited.is_err() {
            warn!(engine = %self.name, "engine did not exit after quit, killing");
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
            self.state = SessionState::Killed;
        } else {
            self.state = SessionState::Exited;
        }
        self.stderr_task.abort();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}

async fn drain_stderr(engine: String, stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!(engine = %engine, "stderr: {}", line),
            Ok(None) => break,
            Err(err) => {
                warn!(engine = %engine, "stderr read error: {}", err);
                break;
            }
        }
    }
}

//! Wire-level UGI framing: line assembly, command formatting, message
//! parsing. A move is an opaque token here — this layer (and everything
//! above it) never interprets board state, so it carries no board-game-
//! specific types.

use std::fmt::{self, Display, Formatter};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout};
use tracing::{debug, trace};

use crate::error::{SessionError, SessionResult};

/// Commands sent from the driver to the engine.
#[derive(Debug, Clone)]
pub enum Command {
    Ugi,
    SetOption { name: String, value: String },
    IsReady,
    Go,
    MakeMove(String),
    Status,
    Quit,
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ugi => write!(f, "ugi"),
            Command::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            Command::IsReady => write!(f, "isready"),
            Command::Go => write!(f, "go"),
            Command::MakeMove(mv) => write!(f, "makemove {mv}"),
            Command::Status => write!(f, "status"),
            Command::Quit => write!(f, "quit"),
        }
    }
}

/// A single parsed `status`/`info player` response from a `status` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerResultToken {
    pub player: u8,
    pub result: String,
    pub score: String,
}

/// Lines the engine can send back that the driver cares about. Anything
/// that doesn't match one of these shapes is informational and discarded
/// — an unrecognized line never fails a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Id { name: Option<String> },
    UgiOk,
    ReadyOk,
    BestMove(String),
    Status { in_progress: bool, player_to_move: Option<u8> },
    InfoPlayerResult(PlayerResultToken),
    /// Any other recognized-but-uninteresting line (`info ...`, `id author ...`).
    Other,
}

impl Message {
    /// Parses a single trimmed, non-empty, non-comment line. Returns
    /// `Message::Other` for anything not explicitly modeled above, never
    /// an error — the protocol is tolerant of noise by design.
    pub fn parse(line: &str) -> Message {
        let line = line.trim();
        let (verb, rest) = match line.split_once(' ') {
            Some((v, r)) => (v, r.trim()),
            None => (line, ""),
        };

        match verb {
            "id" => Message::parse_id(rest),
            "ugiok" => Message::UgiOk,
            "readyok" => Message::ReadyOk,
            "bestmove" => Message::parse_bestmove(rest),
            "status" => Message::parse_status(rest),
            "info" => Message::parse_info(rest),
            _ => Message::Other,
        }
    }

    fn parse_id(rest: &str) -> Message {
        let name = rest
            .split_once("name ")
            .map(|(_, name)| name.trim().to_string());
        Message::Id { name }
    }

    fn parse_bestmove(rest: &str) -> Message {
        let token = rest.split_whitespace().next();
        match token {
            Some(mv) => Message::BestMove(mv.to_string()),
            None => Message::Other,
        }
    }

    /// `status <state> playertomove <n>`
    fn parse_status(rest: &str) -> Message {
        let mut tokens = rest.split_whitespace();
        let state = match tokens.next() {
            Some(s) => s,
            None => return Message::Other,
        };
        let in_progress = state.eq_ignore_ascii_case("inprogress");
        let player_to_move = match tokens.next() {
            Some("playertomove") => tokens.next().and_then(|n| n.parse::<u8>().ok()),
            _ => None,
        };
        Message::Status {
            in_progress,
            player_to_move,
        }
    }

    /// `info player <n> result <r> score <s>`; other `info` lines are
    /// treated as `Other` (engine "thinking" output, debug strings, ...).
    fn parse_info(rest: &str) -> Message {
        let mut tokens = rest.split_whitespace().peekable();
        if tokens.peek() != Some(&"player") {
            return Message::Other;
        }
        tokens.next();
        let Some(player) = tokens.next().and_then(|n| n.parse::<u8>().ok()) else {
            return Message::Other;
        };
        if tokens.next() != Some("result") {
            return Message::Other;
        }
        let Some(result) = tokens.next() else {
            return Message::Other;
        };
        let score = match tokens.next() {
            Some("score") => tokens.next().unwrap_or("").to_string(),
            _ => String::new(),
        };
        Message::InfoPlayerResult(PlayerResultToken {
            player,
            result: result.to_string(),
            score,
        })
    }
}

/// Owns the engine's stdin/stdout handles and turns them into framed
/// commands/messages. Does not itself enforce deadlines — the caller
/// (`EngineSession`) wraps every `recv` in `tokio::time::timeout`.
pub struct Protocol {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Protocol {
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            stdin,
            stdout: BufReader::new(stdout).lines(),
        }
    }

    pub async fn send(&mut self, command: Command) -> SessionResult<()> {
        let mut line = command.to_string();
        line.push('\n');

        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        debug!("UGI send: {}", line.trim());
        Ok(())
    }

    /// Reads the next meaningful line: trailing whitespace is stripped,
    /// blank lines and `#`-comment lines are skipped transparently.
    pub async fn recv_line(&mut self) -> SessionResult<String> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or(SessionError::EngineExited)?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            trace!("UGI recv: {}", line);
            return Ok(line.to_string());
        }
    }

    pub async fn recv(&mut self) -> SessionResult<Message> {
        let line = self.recv_line().await?;
        Ok(Message::parse(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bestmove_with_trailing_ponder() {
        let msg = Message::parse("bestmove e2e4 ponder e7e5");
        assert_eq!(msg, Message::BestMove("e2e4".to_string()));
    }

    #[test]
    fn parses_bestmove_alone() {
        assert_eq!(Message::parse("bestmove e2e4"), Message::BestMove("e2e4".to_string()));
    }

    #[test]
    fn parses_status_in_progress() {
        let msg = Message::parse("status inprogress playertomove 2");
        assert_eq!(
            msg,
            Message::Status {
                in_progress: true,
                player_to_move: Some(2)
            }
        );
    }

    #[test]
    fn parses_status_finished() {
        let msg = Message::parse("status finished playertomove 1");
        assert_eq!(
            msg,
            Message::Status {
                in_progress: false,
                player_to_move: Some(1)
            }
        );
    }

    #[test]
    fn parses_info_player_result() {
        let msg = Message::parse("info player 1 result win score 1.0");
        assert_eq!(
            msg,
            Message::InfoPlayerResult(PlayerResultToken {
                player: 1,
                result: "win".to_string(),
                score: "1.0".to_string(),
            })
        );
    }

    #[test]
    fn unrecognized_lines_are_other_not_errors() {
        assert_eq!(Message::parse("info depth 12 score cp 34"), Message::Other);
        assert_eq!(Message::parse("totally unknown line"), Message::Other);
    }

    #[test]
    fn ugiok_and_readyok() {
        assert_eq!(Message::parse("ugiok"), Message::UgiOk);
        assert_eq!(Message::parse("readyok"), Message::ReadyOk);
    }

    #[test]
    fn command_display_matches_wire_format() {
        assert_eq!(Command::Ugi.to_string(), "ugi");
        assert_eq!(Command::IsReady.to_string(), "isready");
        assert_eq!(Command::Go.to_string(), "go");
        assert_eq!(Command::MakeMove("e2e4".into()).to_string(), "makemove e2e4");
        assert_eq!(Command::Status.to_string(), "status");
        assert_eq!(Command::Quit.to_string(), "quit");
        assert_eq!(
            Command::SetOption { name: "Hash".into(), value: "128".into() }.to_string(),
            "setoption name Hash value 128"
        );
    }
}

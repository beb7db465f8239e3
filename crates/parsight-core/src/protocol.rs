//! Debug event protocol types
//!
//! The wire format between a running recognizer and the recorder: one
//! newline-delimited JSON frame per execution event, preceded by a single
//! handshake frame. The outbound control channel shares the connection and
//! carries `ControlRequest` frames.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

/// Version of the event wire codec. A handshake advertising any other
/// version fails the connection.
pub const PROTOCOL_VERSION: u32 = 1;

/// A token as reported by the recognizer.
///
/// `line` is 1-based; `char_position` is the recognizer column computed with
/// a tab width of 8 (see [`crate::position`] for mapping back to editor
/// offsets). Tokens are carried by value inside events; there is no shared
/// token object between events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Index of this token in the token stream
    pub index: i64,
    /// Token type code from the recognizer's vocabulary
    pub token_type: i32,
    /// Matched text
    pub text: String,
    /// 1-based source line
    pub line: u32,
    /// Recognizer column (tab width 8)
    pub char_position: u32,
    /// Start index in the character stream
    pub start: i64,
    /// Stop index in the character stream
    pub stop: i64,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}<{}>@{}:{}", self.text, self.token_type, self.line, self.char_position)
    }
}

/// One discrete notification emitted by a running recognizer.
///
/// Events are immutable once appended to the log; their log index is their
/// identity for replay purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebugEvent {
    EnterRule { rule: String, line: u32, char_position: u32 },
    ExitRule { rule: String },
    EnterSubrule { decision: u32 },
    ExitSubrule { decision: u32 },
    /// Lookahead query: the recognizer peeked at `token_index` with LT(`index`)
    Lookahead { index: u32, token_index: i64 },
    ConsumeToken { token: Token },
    ConsumeHiddenToken { token: Token },
    LocationChanged { line: u32, char_position: u32 },
    Mark { level: i32 },
    Rewind { level: i32, succeeded: bool },
    BeginBacktrack { level: i32 },
    EndBacktrack { level: i32, succeeded: bool },
    RecognitionException { description: String },
    AstNilNode { id: u64 },
    AstCreateNode { id: u64, token: Token },
    AstCreateNodeFromType { id: u64, text: String, token_type: i32 },
    AstBecomeRoot { new_root: u64, old_root: u64 },
    AstAddChild { root: u64, child: u64 },
    AstSetTokenBoundaries { id: u64, start: i64, stop: i64 },
    Terminate,
}

impl DebugEvent {
    /// Short machine-friendly name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            DebugEvent::EnterRule { .. } => "enter_rule",
            DebugEvent::ExitRule { .. } => "exit_rule",
            DebugEvent::EnterSubrule { .. } => "enter_subrule",
            DebugEvent::ExitSubrule { .. } => "exit_subrule",
            DebugEvent::Lookahead { .. } => "lookahead",
            DebugEvent::ConsumeToken { .. } => "consume_token",
            DebugEvent::ConsumeHiddenToken { .. } => "consume_hidden_token",
            DebugEvent::LocationChanged { .. } => "location_changed",
            DebugEvent::Mark { .. } => "mark",
            DebugEvent::Rewind { .. } => "rewind",
            DebugEvent::BeginBacktrack { .. } => "begin_backtrack",
            DebugEvent::EndBacktrack { .. } => "end_backtrack",
            DebugEvent::RecognitionException { .. } => "recognition_exception",
            DebugEvent::AstNilNode { .. } => "ast_nil_node",
            DebugEvent::AstCreateNode { .. } => "ast_create_node",
            DebugEvent::AstCreateNodeFromType { .. } => "ast_create_node_from_type",
            DebugEvent::AstBecomeRoot { .. } => "ast_become_root",
            DebugEvent::AstAddChild { .. } => "ast_add_child",
            DebugEvent::AstSetTokenBoundaries { .. } => "ast_set_token_boundaries",
            DebugEvent::Terminate => "terminate",
        }
    }
}

impl fmt::Display for DebugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugEvent::EnterRule { rule, line, char_position } => {
                write!(f, "enter_rule {rule} @{line}:{char_position}")
            }
            DebugEvent::ExitRule { rule } => write!(f, "exit_rule {rule}"),
            DebugEvent::EnterSubrule { decision } => write!(f, "enter_subrule d{decision}"),
            DebugEvent::ExitSubrule { decision } => write!(f, "exit_subrule d{decision}"),
            DebugEvent::Lookahead { index, token_index } => {
                write!(f, "LT({index}) -> token {token_index}")
            }
            DebugEvent::ConsumeToken { token } => write!(f, "consume {token}"),
            DebugEvent::ConsumeHiddenToken { token } => write!(f, "consume hidden {token}"),
            DebugEvent::LocationChanged { line, char_position } => {
                write!(f, "location {line}:{char_position}")
            }
            DebugEvent::Mark { level } => write!(f, "mark {level}"),
            DebugEvent::Rewind { level, succeeded } => {
                write!(f, "rewind {level} ({})", if *succeeded { "kept" } else { "discarded" })
            }
            DebugEvent::BeginBacktrack { level } => write!(f, "begin_backtrack {level}"),
            DebugEvent::EndBacktrack { level, succeeded } => {
                write!(f, "end_backtrack {level} ({})", if *succeeded { "ok" } else { "failed" })
            }
            DebugEvent::RecognitionException { description } => {
                write!(f, "exception: {description}")
            }
            DebugEvent::AstNilNode { id } => write!(f, "ast nil {id}"),
            DebugEvent::AstCreateNode { id, token } => write!(f, "ast create {id} {token}"),
            DebugEvent::AstCreateNodeFromType { id, text, token_type } => {
                write!(f, "ast create {id} {text:?}<{token_type}>")
            }
            DebugEvent::AstBecomeRoot { new_root, old_root } => {
                write!(f, "ast become_root {new_root} <- {old_root}")
            }
            DebugEvent::AstAddChild { root, child } => {
                write!(f, "ast add_child {root} += {child}")
            }
            DebugEvent::AstSetTokenBoundaries { id, start, stop } => {
                write!(f, "ast boundaries {id} [{start}..{stop}]")
            }
            DebugEvent::Terminate => write!(f, "terminate"),
        }
    }
}

/// First frame of every connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub version: u32,
}

/// Outbound control frames, written on the same connection.
///
/// The recorder acknowledges every processed event with `Continue`; the
/// acknowledgment is withheld while a breakpoint pause is pending.
/// `Terminate` asks the recognizer to end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    Continue,
    Terminate,
}

/// Decode one event frame. Any failure here is fatal to the connection.
pub fn decode_event(line: &str) -> Result<DebugEvent> {
    serde_json::from_str(line)
        .map_err(|e| AppError::Protocol(format!("malformed event frame: {e}")))
}

/// Encode one event frame (used by tests and replay tooling)
pub fn encode_event(event: &DebugEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Decode and verify the handshake frame
pub fn decode_handshake(line: &str) -> Result<Handshake> {
    let handshake: Handshake = serde_json::from_str(line)
        .map_err(|e| AppError::Protocol(format!("malformed handshake: {e}")))?;
    if handshake.version != PROTOCOL_VERSION {
        return Err(AppError::Protocol(format!(
            "unsupported protocol version {} (expected {})",
            handshake.version, PROTOCOL_VERSION
        )));
    }
    Ok(handshake)
}

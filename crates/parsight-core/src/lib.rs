//! Parsight Core Library
//!
//! Core types and utilities for Parsight, a time-travel debugger for
//! generated recognizers. This crate provides the pure Rust components
//! that are independent of any UI shell: the debug event protocol, the
//! replayable event log, the reconstruction builders, and the recorder
//! and player that drive them.
//!
//! # Modules
//!
//! - [`protocol`] - Debug event model and wire codec
//! - [`event_log`] - Append-only ordered event log
//! - [`recorder`] - Live connection lifecycle and event ingestion
//! - [`tree`] - Rule-stack / parse-tree builder
//! - [`ast`] - AST builder over recognizer-assigned node ids
//! - [`reconstruction`] - Builder bundle and structural deltas
//! - [`player`] - Time-travel replay over log prefixes
//! - [`position`] - Recognizer-to-editor source position mapping
//! - [`breakpoint`] - Breakpoint evaluation during live recording
//! - [`session`] - Recorded sessions for persistence and offline replay
//! - [`storage`] - Persistent storage for sessions
//! - [`events`] - Event sink trait for decoupling from UI frameworks
//! - [`names`] - Session name generation
//! - [`error`] - Error types

pub mod ast;
pub mod breakpoint;
pub mod error;
pub mod event_log;
pub mod events;
pub mod names;
pub mod player;
pub mod position;
pub mod protocol;
pub mod reconstruction;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod tree;

// Re-export commonly used types
pub use ast::{AstBuilder, AstNode};
pub use breakpoint::{BreakpointProvider, BreakpointSet};
pub use error::{AppError, Result};
pub use event_log::EventLog;
pub use events::{DebugEventSink, NoOpEventSink, StdoutEventSink};
pub use names::{create_session_name, generate_session_name, SessionId};
pub use player::Player;
pub use position::{map_position, map_token, SourceLine, SourceText, SourceTextProvider};
pub use protocol::{ControlRequest, DebugEvent, Token, PROTOCOL_VERSION};
pub use reconstruction::{ApplyReport, Reconstruction, StructuralDelta};
pub use recorder::{Recorder, RecorderState, RecorderStatus, DEFAULT_PORT};
pub use session::{RecordedDebugSession, SessionMetadata};
pub use storage::{SessionFilter, SessionInfo, SessionStorage};
pub use tree::{ParseTreeBuilder, RuleInvocation, TreeChild};

//! Application-wide error types
//!
//! This module defines a centralized error type using `thiserror` for
//! clean error handling across the library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
///
/// This provides a centralized error handling strategy with:
/// - Structured error variants for different failure modes
/// - Serde support for sending errors to a UI shell
/// - Automatic Display implementation via thiserror
/// - Automatic conversion from common error types
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    /// A recording session is already in progress
    #[error("Already connected to a recognizer")]
    AlreadyConnected,

    /// No recording session is in progress
    #[error("Not connected to a recognizer")]
    NotConnected,

    /// The connection attempt failed (refused, unreachable, handshake error)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection attempt did not resolve within the timeout
    #[error("Timed out waiting to connect to the remote recognizer")]
    ConnectionTimeout,

    /// The connection attempt was cancelled by the caller
    #[error("Connection attempt cancelled")]
    ConnectionCancelled,

    /// Malformed or out-of-order protocol data; fatal to the connection
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The recognizer did not acknowledge a polite stop in time
    #[error("Timed out waiting for the recognizer to stop")]
    StopTimeout,

    /// Replay navigation requested while a live session owns the builders
    #[error("Recorder is active; replay navigation is unavailable")]
    RecorderActive,

    /// Storage/database error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

/// Convert AppError to String for UI shells that expect plain messages
impl From<AppError> for String {
    fn from(error: AppError) -> String {
        error.to_string()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

// Automatic conversions from common error types
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

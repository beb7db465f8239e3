//! Event sink trait
//!
//! This module provides the DebugEventSink trait for decoupling session
//! notifications from UI frameworks. Implementations can forward events to
//! a windowed shell, print to stdout (CLI), or collect them in tests.

use async_trait::async_trait;

use crate::protocol::DebugEvent;
use crate::reconstruction::StructuralDelta;
use crate::recorder::RecorderStatus;

/// Sink for per-event notifications from a live recording session.
///
/// The core exposes builder state as read-only snapshots; these callbacks
/// are the change notifications that tell a shell when to re-read them.
#[async_trait]
pub trait DebugEventSink: Send + Sync {
    /// Recorder lifecycle state changed
    async fn status_changed(&self, status: RecorderStatus) -> Result<(), String>;

    /// Connection attempt resolved successfully
    async fn connection_established(&self, address: &str, port: u16) -> Result<(), String>;

    /// Connection attempt failed (timeout, refused, bad handshake)
    async fn connection_failed(&self, reason: &str) -> Result<(), String>;

    /// A live connection ended (cleanly or by force)
    async fn connection_closed(&self) -> Result<(), String>;

    /// An event was appended to the log and applied to the builders
    async fn event_applied(&self, index: usize, event: &DebugEvent) -> Result<(), String>;

    /// A structural change produced by the applied event
    async fn delta(&self, delta: &StructuralDelta) -> Result<(), String>;

    /// A breakpoint matched; the recognizer has been asked to pause
    async fn breakpoint_hit(&self, line: u32) -> Result<(), String>;

    /// A protocol violation was reported (recording continues)
    async fn violation(&self, description: &str) -> Result<(), String>;
}

/// No-op event sink for testing or headless recording
#[derive(Default, Clone)]
pub struct NoOpEventSink;

#[async_trait]
impl DebugEventSink for NoOpEventSink {
    async fn status_changed(&self, _status: RecorderStatus) -> Result<(), String> {
        Ok(())
    }

    async fn connection_established(&self, _address: &str, _port: u16) -> Result<(), String> {
        Ok(())
    }

    async fn connection_failed(&self, _reason: &str) -> Result<(), String> {
        Ok(())
    }

    async fn connection_closed(&self) -> Result<(), String> {
        Ok(())
    }

    async fn event_applied(&self, _index: usize, _event: &DebugEvent) -> Result<(), String> {
        Ok(())
    }

    async fn delta(&self, _delta: &StructuralDelta) -> Result<(), String> {
        Ok(())
    }

    async fn breakpoint_hit(&self, _line: u32) -> Result<(), String> {
        Ok(())
    }

    async fn violation(&self, _description: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Stdout event sink for CLI mode - prints notifications to the console
#[derive(Default, Clone)]
pub struct StdoutEventSink {
    /// Whether to print in JSON format
    pub json_output: bool,
}

impl StdoutEventSink {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }
}

#[async_trait]
impl DebugEventSink for StdoutEventSink {
    async fn status_changed(&self, status: RecorderStatus) -> Result<(), String> {
        if self.json_output {
            println!(r#"{{"event":"status","status":"{status}"}}"#);
        } else {
            println!("Status: {status}");
        }
        Ok(())
    }

    async fn connection_established(&self, address: &str, port: u16) -> Result<(), String> {
        if self.json_output {
            println!(r#"{{"event":"connected","address":"{address}","port":{port}}}"#);
        } else {
            println!("Connected to {address}:{port}");
        }
        Ok(())
    }

    async fn connection_failed(&self, reason: &str) -> Result<(), String> {
        if self.json_output {
            println!(r#"{{"event":"connection_failed","reason":"{reason}"}}"#);
        } else {
            println!("Connection failed: {reason}");
        }
        Ok(())
    }

    async fn connection_closed(&self) -> Result<(), String> {
        if self.json_output {
            println!(r#"{{"event":"closed"}}"#);
        } else {
            println!("Connection closed");
        }
        Ok(())
    }

    async fn event_applied(&self, index: usize, event: &DebugEvent) -> Result<(), String> {
        if self.json_output {
            let payload = serde_json::to_string(event).unwrap_or_default();
            println!(r#"{{"event":"applied","index":{index},"payload":{payload}}}"#);
        } else {
            println!("[{index:>5}] {event}");
        }
        Ok(())
    }

    async fn delta(&self, delta: &StructuralDelta) -> Result<(), String> {
        if self.json_output {
            let payload = serde_json::to_string(delta).unwrap_or_default();
            println!(r#"{{"event":"delta","payload":{payload}}}"#);
        }
        Ok(())
    }

    async fn breakpoint_hit(&self, line: u32) -> Result<(), String> {
        if self.json_output {
            println!(r#"{{"event":"breakpoint","line":{line}}}"#);
        } else {
            println!("Breakpoint hit at line {line}");
        }
        Ok(())
    }

    async fn violation(&self, description: &str) -> Result<(), String> {
        if self.json_output {
            println!(r#"{{"event":"violation","description":"{description}"}}"#);
        } else {
            eprintln!("Protocol violation: {description}");
        }
        Ok(())
    }
}

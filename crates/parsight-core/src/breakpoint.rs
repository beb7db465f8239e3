//! Breakpoint evaluation
//!
//! Pure decision over a consume event and the current breakpoint set.
//! Breakpoints are supplied externally, cached at session start, and only
//! evaluated during live recording - never during replay.

use std::collections::HashSet;

use crate::protocol::DebugEvent;

/// Provider of the current breakpoint lines (the editor side)
pub trait BreakpointProvider: Send + Sync {
    /// 1-based source lines carrying a breakpoint
    fn breakpoints(&self) -> HashSet<u32>;
}

impl BreakpointProvider for HashSet<u32> {
    fn breakpoints(&self) -> HashSet<u32> {
        self.clone()
    }
}

/// Cached breakpoint set for one recording session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreakpointSet {
    lines: HashSet<u32>,
}

impl BreakpointSet {
    pub fn new(lines: HashSet<u32>) -> Self {
        Self { lines }
    }

    pub fn from_provider(provider: &dyn BreakpointProvider) -> Self {
        Self::new(provider.breakpoints())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn contains(&self, line: u32) -> bool {
        self.lines.contains(&line)
    }

    /// Whether the recognizer should be asked to pause after this event.
    ///
    /// Only a visible `ConsumeToken` on a breakpoint line pauses; rule
    /// entry/exit and hidden tokens never do.
    pub fn should_pause(&self, event: &DebugEvent) -> Option<u32> {
        match event {
            DebugEvent::ConsumeToken { token } if self.lines.contains(&token.line) => {
                Some(token.line)
            }
            _ => None,
        }
    }
}

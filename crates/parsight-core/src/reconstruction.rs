//! Event-driven reconstruction state
//!
//! Bundles the builders that together form the "current state" derivable
//! from any prefix of the event log. Applying an event is atomic with
//! respect to observers: the owner (recorder or player) holds the
//! reconstruction behind a mutex and applies each event to all builders
//! before releasing it.

use serde::Serialize;

use crate::ast::AstBuilder;
use crate::protocol::{DebugEvent, Token};
use crate::tree::ParseTreeBuilder;

/// One structural change produced by applying an event, for UI sinks.
///
/// The core never renders; it reports what changed and exposes builder
/// state as read-only snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralDelta {
    RulePushed { node: usize, rule: String },
    RulePopped { node: usize, rule: String },
    TokenConsumed { node: usize, token: Token, hidden: bool },
    ErrorAttached { node: usize, description: String },
    SpeculationDiscarded { level: i32 },
    AstNodeCreated { id: u64 },
    AstNodeLinked { parent: u64, child: u64 },
    AstRootChanged { root: u64 },
}

/// Outcome of applying one event: structural deltas plus any protocol
/// violations encountered. Violations are reported, never fatal.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub deltas: Vec<StructuralDelta>,
    pub violations: Vec<String>,
}

/// The live reconstruction: rule-stack/parse-tree and AST builders plus
/// the accumulated protocol violations of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    pub tree: ParseTreeBuilder,
    pub ast: AstBuilder,
    violations: Vec<String>,
    applied: usize,
}

impl Reconstruction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event to every builder, in order. Either all builders see
    /// the event or (for the caller holding the mutex) none have yet.
    pub fn apply(&mut self, event: &DebugEvent) -> ApplyReport {
        let mut report = ApplyReport::default();
        self.tree.apply(event, &mut report);
        self.ast.apply(event, &mut report);
        self.applied += 1;
        self.violations.extend(report.violations.iter().cloned());
        report
    }

    /// Drop all builder state and accumulated violations
    pub fn reset(&mut self) {
        self.tree.reset();
        self.ast.reset();
        self.violations.clear();
        self.applied = 0;
    }

    /// Number of events applied since the last reset
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Protocol violations accumulated since the last reset
    pub fn violations(&self) -> &[String] {
        &self.violations
    }
}

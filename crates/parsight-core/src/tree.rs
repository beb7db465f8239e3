//! Rule-stack / parse-tree builder
//!
//! Consumes rule, token, and backtracking events to maintain the tree of
//! rule invocations and the stack of currently open rules. Speculative
//! parses are handled with structural snapshots: `Mark` records size
//! counters, a failed `Rewind` truncates back to them. Children are only
//! ever appended, never reordered, so truncation is sufficient to restore
//! any earlier state.

use std::collections::HashMap;

use crate::protocol::{DebugEvent, Token};
use crate::reconstruction::{ApplyReport, StructuralDelta};

/// Index of a rule invocation in the builder's arena
pub type NodeIndex = usize;

/// A child of a rule invocation, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TreeChild {
    /// Nested rule invocation
    Rule(NodeIndex),
    /// Consumed token
    Token { token: Token, hidden: bool },
    /// Error marker attached by a recognition exception
    Error(String),
}

/// One rule activation in the parse tree.
///
/// Pushed on `EnterRule`, receives children while open, closed by the
/// matching `ExitRule`. Index 0 is the synthetic top-level invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleInvocation {
    pub rule: String,
    pub line: u32,
    pub char_position: u32,
    pub children: Vec<TreeChild>,
    pub closed: bool,
}

impl RuleInvocation {
    fn new(rule: &str, line: u32, char_position: u32) -> Self {
        Self {
            rule: rule.to_string(),
            line,
            char_position,
            children: Vec::new(),
            closed: false,
        }
    }
}

/// Size counters captured at a `Mark`, sufficient to truncate back to
#[derive(Debug, Clone, PartialEq)]
struct MarkSnapshot {
    node_count: usize,
    stack: Vec<NodeIndex>,
    child_counts: Vec<usize>,
}

/// Incremental builder for the rule-invocation tree and rule-call stack
#[derive(Debug, Clone, PartialEq)]
pub struct ParseTreeBuilder {
    nodes: Vec<RuleInvocation>,
    stack: Vec<NodeIndex>,
    marks: HashMap<i32, MarkSnapshot>,
    backtrack: Vec<i32>,
    location: Option<(u32, u32)>,
}

impl Default for ParseTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseTreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![RuleInvocation::new("root", 0, 0)],
            stack: vec![0],
            marks: HashMap::new(),
            backtrack: Vec::new(),
            location: None,
        }
    }

    /// Drop all accumulated state, back to the synthetic root
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Apply one event. Structural changes and protocol violations are
    /// appended to `report`; a violation never aborts the builder.
    pub fn apply(&mut self, event: &DebugEvent, report: &mut ApplyReport) {
        match event {
            DebugEvent::EnterRule { rule, line, char_position } => {
                let id = self.nodes.len();
                self.nodes.push(RuleInvocation::new(rule, *line, *char_position));
                let parent = self.current();
                self.nodes[parent].children.push(TreeChild::Rule(id));
                self.stack.push(id);
                report.deltas.push(StructuralDelta::RulePushed {
                    node: id,
                    rule: rule.clone(),
                });
            }
            DebugEvent::ExitRule { rule } => {
                if self.stack.len() <= 1 {
                    report
                        .violations
                        .push(format!("exit_rule '{rule}' with no open rule invocation"));
                    return;
                }
                // A name mismatch is a protocol error; the top is force-popped
                // so recording can continue.
                let top = self.stack.pop().unwrap_or(0);
                self.nodes[top].closed = true;
                if self.nodes[top].rule != *rule {
                    report.violations.push(format!(
                        "exit_rule mismatch: expected '{}', got '{rule}'",
                        self.nodes[top].rule
                    ));
                }
                report.deltas.push(StructuralDelta::RulePopped {
                    node: top,
                    rule: self.nodes[top].rule.clone(),
                });
            }
            DebugEvent::ConsumeToken { token } | DebugEvent::ConsumeHiddenToken { token } => {
                let hidden = matches!(event, DebugEvent::ConsumeHiddenToken { .. });
                let top = self.current();
                self.nodes[top].children.push(TreeChild::Token {
                    token: token.clone(),
                    hidden,
                });
                report.deltas.push(StructuralDelta::TokenConsumed {
                    node: top,
                    token: token.clone(),
                    hidden,
                });
            }
            DebugEvent::RecognitionException { description } => {
                let top = self.current();
                self.nodes[top].children.push(TreeChild::Error(description.clone()));
                report.deltas.push(StructuralDelta::ErrorAttached {
                    node: top,
                    description: description.clone(),
                });
            }
            DebugEvent::Mark { level } => {
                self.marks.insert(*level, self.snapshot_counters());
            }
            DebugEvent::Rewind { level, succeeded } => match self.marks.remove(level) {
                Some(snapshot) => {
                    if !*succeeded {
                        self.truncate_to(&snapshot);
                        report
                            .deltas
                            .push(StructuralDelta::SpeculationDiscarded { level: *level });
                    }
                }
                None => {
                    report
                        .violations
                        .push(format!("rewind for unknown mark level {level}"));
                }
            },
            DebugEvent::BeginBacktrack { level } => {
                self.backtrack.push(*level);
            }
            DebugEvent::EndBacktrack { level, .. } => {
                if self.backtrack.last() == Some(level) {
                    self.backtrack.pop();
                } else if let Some(pos) = self.backtrack.iter().rposition(|l| l == level) {
                    self.backtrack.remove(pos);
                }
            }
            DebugEvent::LocationChanged { line, char_position } => {
                self.location = Some((*line, *char_position));
            }
            // Subrule and lookahead events carry no tree structure
            _ => {}
        }
    }

    fn snapshot_counters(&self) -> MarkSnapshot {
        MarkSnapshot {
            node_count: self.nodes.len(),
            stack: self.stack.clone(),
            child_counts: self.stack.iter().map(|&i| self.nodes[i].children.len()).collect(),
        }
    }

    fn truncate_to(&mut self, snapshot: &MarkSnapshot) {
        self.nodes.truncate(snapshot.node_count);
        self.stack = snapshot.stack.clone();
        for (&index, &count) in snapshot.stack.iter().zip(snapshot.child_counts.iter()) {
            let node = &mut self.nodes[index];
            node.children.truncate(count);
            // Nodes on the stack were open when the mark was taken; a pop
            // between mark and rewind may have closed them.
            node.closed = false;
        }
        let len = self.nodes.len();
        self.marks.retain(|_, s| s.node_count <= len);
    }

    /// Currently open (innermost) rule invocation
    pub fn current(&self) -> NodeIndex {
        *self.stack.last().unwrap_or(&0)
    }

    /// All rule invocations, arena-ordered; index 0 is the synthetic root
    pub fn nodes(&self) -> &[RuleInvocation] {
        &self.nodes
    }

    /// Indices of the currently open invocations, outermost first
    pub fn stack(&self) -> &[NodeIndex] {
        &self.stack
    }

    /// Names of the open rules, outermost first, synthetic root excluded
    pub fn rule_stack(&self) -> Vec<&str> {
        self.stack[1..].iter().map(|&i| self.nodes[i].rule.as_str()).collect()
    }

    /// Most recent `LocationChanged` position, if any
    pub fn location(&self) -> Option<(u32, u32)> {
        self.location
    }

    /// Number of currently open backtrack regions (UI framing only)
    pub fn backtrack_depth(&self) -> usize {
        self.backtrack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::token;

    fn apply(builder: &mut ParseTreeBuilder, event: DebugEvent) -> ApplyReport {
        let mut report = ApplyReport::default();
        builder.apply(&event, &mut report);
        report
    }

    fn enter(rule: &str) -> DebugEvent {
        DebugEvent::EnterRule {
            rule: rule.to_string(),
            line: 1,
            char_position: 0,
        }
    }

    fn exit(rule: &str) -> DebugEvent {
        DebugEvent::ExitRule { rule: rule.to_string() }
    }

    #[test]
    fn test_nested_rules_form_a_tree() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, enter("prog"));
        apply(&mut builder, enter("expr"));
        apply(&mut builder, DebugEvent::ConsumeToken { token: token("1", 1, 0) });
        apply(&mut builder, exit("expr"));
        apply(&mut builder, exit("prog"));

        let nodes = builder.nodes();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].children, vec![TreeChild::Rule(1)]);
        assert_eq!(nodes[1].rule, "prog");
        assert_eq!(nodes[1].children, vec![TreeChild::Rule(2)]);
        assert!(nodes[2].closed);
        assert_eq!(builder.rule_stack(), Vec::<&str>::new());
    }

    #[test]
    fn test_rule_stack_reflects_open_rules() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, enter("prog"));
        apply(&mut builder, enter("stat"));
        assert_eq!(builder.rule_stack(), vec!["prog", "stat"]);
    }

    #[test]
    fn test_exit_rule_name_mismatch_forces_pop() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, enter("expr"));
        let report = apply(&mut builder, exit("stat"));

        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].contains("mismatch"));
        // degraded gracefully: the invocation is closed anyway
        assert!(builder.nodes()[1].closed);
        assert_eq!(builder.stack(), &[0]);
    }

    #[test]
    fn test_exit_rule_on_empty_stack_is_reported() {
        let mut builder = ParseTreeBuilder::new();
        let report = apply(&mut builder, exit("expr"));
        assert_eq!(report.violations.len(), 1);
        assert_eq!(builder.stack(), &[0]);
    }

    #[test]
    fn test_hidden_token_is_flagged() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, enter("expr"));
        apply(&mut builder, DebugEvent::ConsumeHiddenToken { token: token(" ", 1, 1) });

        match &builder.nodes()[1].children[0] {
            TreeChild::Token { hidden, .. } => assert!(hidden),
            other => panic!("unexpected child {other:?}"),
        }
    }

    #[test]
    fn test_exception_attaches_without_closing() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, enter("expr"));
        apply(
            &mut builder,
            DebugEvent::RecognitionException {
                description: "mismatched token".to_string(),
            },
        );

        assert!(!builder.nodes()[1].closed);
        assert_eq!(
            builder.nodes()[1].children,
            vec![TreeChild::Error("mismatched token".to_string())]
        );
    }

    #[test]
    fn test_failed_rewind_restores_state_at_mark() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, enter("expr"));
        apply(&mut builder, DebugEvent::ConsumeToken { token: token("1", 1, 0) });

        let before = builder.clone();
        apply(&mut builder, DebugEvent::Mark { level: 1 });

        // speculative parse: more rules, tokens, even a pop of "expr"
        apply(&mut builder, enter("mult"));
        apply(&mut builder, DebugEvent::ConsumeToken { token: token("*", 1, 2) });
        apply(&mut builder, exit("mult"));
        apply(&mut builder, exit("expr"));

        apply(&mut builder, DebugEvent::Rewind { level: 1, succeeded: false });
        assert_eq!(builder, before);
    }

    #[test]
    fn test_successful_rewind_keeps_structure() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, enter("expr"));
        apply(&mut builder, DebugEvent::Mark { level: 1 });
        apply(&mut builder, DebugEvent::ConsumeToken { token: token("1", 1, 0) });
        apply(&mut builder, DebugEvent::Rewind { level: 1, succeeded: true });

        assert_eq!(builder.nodes()[1].children.len(), 1);
    }

    #[test]
    fn test_rewind_unknown_level_is_reported() {
        let mut builder = ParseTreeBuilder::new();
        let report = apply(&mut builder, DebugEvent::Rewind { level: 7, succeeded: false });
        assert_eq!(report.violations.len(), 1);
    }

    #[test]
    fn test_backtrack_depth_framing() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, DebugEvent::BeginBacktrack { level: 1 });
        assert_eq!(builder.backtrack_depth(), 1);
        apply(&mut builder, DebugEvent::EndBacktrack { level: 1, succeeded: true });
        assert_eq!(builder.backtrack_depth(), 0);
    }

    #[test]
    fn test_location_changed_is_exposed() {
        let mut builder = ParseTreeBuilder::new();
        apply(&mut builder, DebugEvent::LocationChanged { line: 4, char_position: 2 });
        assert_eq!(builder.location(), Some((4, 2)));
    }
}

//! AST builder
//!
//! Reconstructs the abstract syntax tree from the `Ast*` event family. The
//! recognizer assigns integer node ids before a node's final position in
//! the tree is known, so nodes live in a single id-indexed registry and
//! parent/child links are plain ids, never owning references. AST
//! construction is scoped to rule activations: each open rule keeps an
//! ordered list of roots not yet attached to anything, folded into the
//! parent scope when the rule exits.

use std::collections::HashMap;

use crate::protocol::{DebugEvent, Token};
use crate::reconstruction::{ApplyReport, StructuralDelta};

/// One AST node in the registry.
///
/// A nil node is an empty placeholder; nil nodes never appear in a final
/// tree (become-root either discards them or replaces their identity).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AstNode {
    pub token: Option<Token>,
    pub children: Vec<u64>,
    pub nil: bool,
    pub start_index: Option<i64>,
    pub stop_index: Option<i64>,
}

impl AstNode {
    fn nil_node() -> Self {
        Self {
            nil: true,
            ..Self::default()
        }
    }

    fn leaf(token: Token) -> Self {
        Self {
            token: Some(token),
            ..Self::default()
        }
    }

    /// Display label: the token text, or "nil" for a placeholder
    pub fn label(&self) -> &str {
        if self.nil {
            "nil"
        } else {
            self.token.as_ref().map(|t| t.text.as_str()).unwrap_or("?")
        }
    }
}

/// Roots of the trees built so far inside one open rule activation
#[derive(Debug, Clone, PartialEq)]
struct RuleScope {
    rule: String,
    roots: Vec<u64>,
}

/// Incremental builder for the AST described by `Ast*` events
#[derive(Debug, Clone, PartialEq)]
pub struct AstBuilder {
    nodes: HashMap<u64, AstNode>,
    /// Re-bound ids (nil become-root case) to their canonical id
    aliases: HashMap<u64, u64>,
    scopes: Vec<RuleScope>,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            aliases: HashMap::new(),
            scopes: vec![RuleScope {
                rule: "root".to_string(),
                roots: Vec::new(),
            }],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Canonical id after alias resolution
    pub fn resolve(&self, id: u64) -> u64 {
        let mut current = id;
        // alias chains are short; the bound guards against a corrupt cycle
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(&current) {
                Some(&next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Node registered under `id` (after alias resolution)
    pub fn node(&self, id: u64) -> Option<&AstNode> {
        self.nodes.get(&self.resolve(id))
    }

    /// Registry of all live nodes, keyed by canonical id
    pub fn nodes(&self) -> &HashMap<u64, AstNode> {
        &self.nodes
    }

    /// Unattached roots of the innermost open rule scope
    pub fn roots(&self) -> &[u64] {
        self.scopes.last().map(|s| s.roots.as_slice()).unwrap_or(&[])
    }

    /// Apply one event. Protocol errors (duplicate ids, unknown ids) reject
    /// the event and are appended to `report`; the registry is never
    /// silently overwritten.
    pub fn apply(&mut self, event: &DebugEvent, report: &mut ApplyReport) {
        match event {
            DebugEvent::EnterRule { rule, .. } => {
                self.scopes.push(RuleScope {
                    rule: rule.clone(),
                    roots: Vec::new(),
                });
            }
            DebugEvent::ExitRule { .. } => {
                // Unbalanced exits are reported by the parse-tree builder;
                // here the scope is folded into its parent when possible.
                if self.scopes.len() > 1 {
                    let scope = self.scopes.pop().unwrap_or_else(|| RuleScope {
                        rule: String::new(),
                        roots: Vec::new(),
                    });
                    if let Some(parent) = self.scopes.last_mut() {
                        parent.roots.extend(scope.roots);
                    }
                }
            }
            DebugEvent::AstNilNode { id } => {
                if self.is_bound_non_nil(*id) {
                    report.violations.push(format!("duplicate AST node id {id}"));
                    return;
                }
                self.aliases.remove(id);
                self.nodes.insert(*id, AstNode::nil_node());
                self.push_root(*id);
                report.deltas.push(StructuralDelta::AstNodeCreated { id: *id });
            }
            DebugEvent::AstCreateNode { id, token } => {
                self.create_leaf(*id, token.clone(), report);
            }
            DebugEvent::AstCreateNodeFromType { id, text, token_type } => {
                let token = Token {
                    index: -1,
                    token_type: *token_type,
                    text: text.clone(),
                    line: 0,
                    char_position: 0,
                    start: -1,
                    stop: -1,
                };
                self.create_leaf(*id, token, report);
            }
            DebugEvent::AstBecomeRoot { new_root, old_root } => {
                self.become_root(*new_root, *old_root, report);
            }
            DebugEvent::AstAddChild { root, child } => {
                let root = self.resolve(*root);
                let child = self.resolve(*child);
                if root == child {
                    report
                        .violations
                        .push(format!("add_child: node {root} cannot be its own child"));
                    return;
                }
                if !self.nodes.contains_key(&child) {
                    report
                        .violations
                        .push(format!("add_child: unknown child id {child}"));
                    return;
                }
                match self.nodes.get_mut(&root) {
                    Some(node) => node.children.push(child),
                    None => {
                        report
                            .violations
                            .push(format!("add_child: unknown root id {root}"));
                        return;
                    }
                }
                if let Some(scope) = self.scopes.last_mut() {
                    scope.roots.retain(|&r| r != child);
                }
                report.deltas.push(StructuralDelta::AstNodeLinked {
                    parent: root,
                    child,
                });
            }
            DebugEvent::AstSetTokenBoundaries { id, start, stop } => {
                // Recorded for completeness; no structural effect.
                let id = self.resolve(*id);
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.start_index = Some(*start);
                    node.stop_index = Some(*stop);
                }
            }
            _ => {}
        }
    }

    fn is_bound_non_nil(&self, id: u64) -> bool {
        self.node(id).map(|n| !n.nil).unwrap_or(false)
    }

    fn create_leaf(&mut self, id: u64, token: Token, report: &mut ApplyReport) {
        if self.is_bound_non_nil(id) {
            report.violations.push(format!("duplicate AST node id {id}"));
            return;
        }
        // Upgrading a nil placeholder in place keeps its root slot.
        let was_nil = self.nodes.get(&id).map(|n| n.nil).unwrap_or(false);
        if was_nil {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.token = Some(token);
                node.nil = false;
            }
        } else {
            self.aliases.remove(&id);
            self.nodes.insert(id, AstNode::leaf(token));
            self.push_root(id);
        }
        report.deltas.push(StructuralDelta::AstNodeCreated { id });
    }

    fn become_root(&mut self, new_root: u64, old_root: u64, report: &mut ApplyReport) {
        let new = self.resolve(new_root);
        let old = self.resolve(old_root);
        if !self.nodes.contains_key(&new) || !self.nodes.contains_key(&old) {
            report.violations.push(format!(
                "become_root: unknown node id {}",
                if self.nodes.contains_key(&new) { old } else { new }
            ));
            return;
        }
        if new == old {
            return;
        }

        let new_is_nil = self.nodes.get(&new).map(|n| n.nil).unwrap_or(false);
        let old_is_nil = self.nodes.get(&old).map(|n| n.nil).unwrap_or(false);

        if new_is_nil {
            // A nil new root takes over the old node's identity; the
            // placeholder never appears in the final tree.
            self.nodes.remove(&new);
            self.aliases.insert(new, old);
            if let Some(scope) = self.scopes.last_mut() {
                scope.roots.retain(|&r| r != new);
                if !scope.roots.contains(&old) {
                    scope.roots.push(old);
                }
            }
            report.deltas.push(StructuralDelta::AstRootChanged { root: old });
            return;
        }

        if old_is_nil {
            // A nil old root is discarded entirely.
            self.nodes.remove(&old);
        } else if let Some(node) = self.nodes.get_mut(&new) {
            node.children.insert(0, old);
            report.deltas.push(StructuralDelta::AstNodeLinked {
                parent: new,
                child: old,
            });
        }
        if let Some(scope) = self.scopes.last_mut() {
            promote_root(&mut scope.roots, old, new);
        }
        report.deltas.push(StructuralDelta::AstRootChanged { root: new });
    }

    fn push_root(&mut self, id: u64) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.roots.push(id);
        }
    }

    /// LISP-style rendering of the tree rooted at `id`, e.g. `(+ 1 2)`
    pub fn tree_text(&self, id: u64) -> String {
        let canonical = self.resolve(id);
        let Some(node) = self.nodes.get(&canonical) else {
            return format!("<unknown {id}>");
        };
        if node.children.is_empty() {
            return node.label().to_string();
        }
        let children: Vec<String> =
            node.children.iter().map(|&c| self.tree_text(c)).collect();
        format!("({} {})", node.label(), children.join(" "))
    }
}

/// Replace `old` by `new` in a root list, keeping a single occurrence of
/// `new` and the earliest position
fn promote_root(roots: &mut Vec<u64>, old: u64, new: u64) {
    if let Some(pos) = roots.iter().position(|&r| r == old) {
        roots[pos] = new;
        let mut kept = false;
        roots.retain(|&r| {
            if r == new {
                if kept {
                    return false;
                }
                kept = true;
            }
            true
        });
    } else if !roots.contains(&new) {
        roots.push(new);
    }
}

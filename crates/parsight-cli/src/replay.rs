//! Offline replay of stored sessions
//!
//! Loads a recorded session, replays a prefix of its event log into fresh
//! builders, and prints the reconstructed rule stack, parse tree, and AST.

use std::sync::Arc;

use parsight_core::player::Player;
use parsight_core::storage::SessionStorage;
use parsight_core::tree::{ParseTreeBuilder, TreeChild};
use parsight_core::Reconstruction;
use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Serialize)]
struct ReplaySummary {
    session: String,
    name: String,
    current: i64,
    event_count: usize,
    rule_stack: Vec<String>,
    ast: Vec<String>,
    violations: Vec<String>,
}

pub async fn run(
    storage: &SessionStorage,
    session_id: &str,
    to: Option<usize>,
    json_output: bool,
) -> Result<(), String> {
    let session = storage
        .load_session(session_id)
        .await
        .map_err(|e| e.to_string())?;

    let log = session.to_log();
    let event_count = session.events.len();
    let reconstruction = Arc::new(Mutex::new(Reconstruction::new()));
    let player = Player::new(log, reconstruction.clone());

    let prefix = to.unwrap_or(event_count);
    let current = player.play_to(prefix).await.map_err(|e| e.to_string())?;

    let reconstruction = reconstruction.lock().await;
    let rule_stack: Vec<String> =
        reconstruction.tree.rule_stack().iter().map(|r| r.to_string()).collect();
    let ast: Vec<String> = reconstruction
        .ast
        .roots()
        .iter()
        .map(|&root| reconstruction.ast.tree_text(root))
        .collect();

    if json_output {
        let summary = ReplaySummary {
            session: session.id.clone(),
            name: session.name.clone(),
            current,
            event_count,
            rule_stack,
            ast,
            violations: reconstruction.violations().to_vec(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?
        );
        return Ok(());
    }

    println!(
        "Session {} ({}), replayed {} of {} events",
        session.name,
        session.id,
        current + 1,
        event_count
    );

    println!("\nParse tree:");
    print!("{}", render_parse_tree(&reconstruction.tree));

    if !ast.is_empty() {
        println!("\nAST:");
        for tree in &ast {
            println!("  {tree}");
        }
    }

    if !rule_stack.is_empty() {
        println!("\nOpen rules: {}", rule_stack.join(" > "));
    }

    for violation in reconstruction.violations() {
        eprintln!("Protocol violation: {violation}");
    }

    Ok(())
}

/// Indented text rendering of the rule invocation tree
fn render_parse_tree(tree: &ParseTreeBuilder) -> String {
    let mut out = String::new();
    render_node(tree, 0, 0, &mut out);
    out
}

fn render_node(tree: &ParseTreeBuilder, index: usize, depth: usize, out: &mut String) {
    let node = &tree.nodes()[index];
    let indent = "  ".repeat(depth);
    if index == 0 {
        out.push_str(&format!("{indent}<session>\n"));
    } else {
        let open = if node.closed { "" } else { " (open)" };
        out.push_str(&format!(
            "{indent}{} @{}:{}{}\n",
            node.rule, node.line, node.char_position, open
        ));
    }
    for child in &node.children {
        match child {
            TreeChild::Rule(child_index) => render_node(tree, *child_index, depth + 1, out),
            TreeChild::Token { token, hidden } => {
                let marker = if *hidden { " (hidden)" } else { "" };
                out.push_str(&format!("{}{:?}{}\n", "  ".repeat(depth + 1), token.text, marker));
            }
            TreeChild::Error(description) => {
                out.push_str(&format!("{}! {}\n", "  ".repeat(depth + 1), description));
            }
        }
    }
}

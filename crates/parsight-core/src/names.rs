//! Session naming
//!
//! Generates memorable session names and unique session IDs, so stored
//! recordings read as "amber-grammar" or "swift-lexer" instead of raw
//! UUIDs.

use rand::seq::SliceRandom;
use uuid::Uuid;

/// Adjectives for session names
const ADJECTIVES: &[&str] = &[
    "amber", "azure", "bold", "bright", "calm", "clever", "crimson", "eager",
    "emerald", "fierce", "golden", "indigo", "keen", "lively", "noble", "quick",
    "rapid", "scarlet", "serene", "sharp", "silent", "silver", "sleek", "steady",
    "subtle", "swift", "violet", "vivid", "wise",
];

/// Nouns for session names, leaning on the grammar domain
const NOUNS: &[&str] = &[
    "grammar", "lexer", "parser", "token", "rule", "clause", "phrase", "symbol",
    "branch", "leaf", "forest", "stream", "cursor", "marker", "beacon", "signal",
    "prism", "relay", "spark", "vertex", "falcon", "heron", "raven", "lark",
];

/// Session identifier with both internal UUID and display name
#[derive(Debug, Clone)]
pub struct SessionId {
    /// Internal unique identifier (UUID v4)
    pub id: String,
    /// Human-friendly display name
    pub name: String,
}

impl SessionId {
    /// Create a new session ID with auto-generated name
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: generate_session_name(),
        }
    }

    /// Create a session ID with a custom name
    pub fn with_name(name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
        }
    }

    /// Create a session ID from existing values (e.g., from storage)
    pub fn from_parts(id: String, name: String) -> Self {
        Self { id, name }
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Generate a session name like "amber-grammar" or "swift-lexer"
pub fn generate_session_name() -> String {
    let mut rng = rand::thread_rng();

    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"swift");
    let noun = NOUNS.choose(&mut rng).unwrap_or(&"session");

    format!("{}-{}", adjective, noun)
}

/// Generate a short session ID (8 chars) for display purposes
pub fn generate_short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Create a session name, prefixed with the grammar name when one is known
pub fn create_session_name(grammar: Option<&str>) -> String {
    match grammar {
        Some(name) if !name.is_empty() => {
            let suffix = generate_short_id();
            format!("{}-{}", name, &suffix[..4])
        }
        _ => generate_session_name(),
    }
}

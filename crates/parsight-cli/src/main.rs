//! Parsight CLI
//!
//! Command-line interface for Parsight. Connects to a running recognizer,
//! records its debug event stream, and replays stored sessions into the
//! reconstruction models for inspection.

use clap::{Parser, Subcommand};
use parsight_core::storage::{default_db_path, SessionFilter, SessionStorage};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod record;
mod replay;

/// Parsight - time-travel debugger for generated recognizers
///
/// Record the execution event stream of a running parser/lexer, then step
/// through, rewind, and replay the reconstructed parse tree and AST.
#[derive(Parser, Debug)]
#[command(name = "parsight")]
#[command(version, about, long_about = None)]
struct Args {
    /// Output format: text or json
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Session database path (defaults to the platform data directory)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a live session from a running recognizer
    Record {
        /// Recognizer address
        #[arg(short, long, default_value = "127.0.0.1")]
        address: String,

        /// Recognizer debug port
        #[arg(short, long, default_value_t = parsight_core::DEFAULT_PORT)]
        port: u16,

        /// Breakpoint lines; recording pauses there until Enter is pressed
        #[arg(short = 'b', long = "breakpoint")]
        breakpoints: Vec<u32>,

        /// Save the recording when the session ends
        #[arg(long)]
        save: bool,
    },

    /// Replay a stored session and print the reconstructed state
    Replay {
        /// Session id (as shown by `parsight sessions`)
        session: String,

        /// Replay only the first N events
        #[arg(long)]
        to: Option<usize>,
    },

    /// List stored sessions
    Sessions {
        /// Only sessions carrying all of these tags
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Delete a stored session
    Delete {
        /// Session id to delete
        session: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let json_output = matches!(args.format, OutputFormat::Json);
    let db_path = args.db_path.clone().unwrap_or_else(default_db_path);

    let result = match args.command {
        Command::Record { address, port, breakpoints, save } => {
            let storage = if save {
                match SessionStorage::new(db_path) {
                    Ok(storage) => Some(storage),
                    Err(e) => {
                        eprintln!("Error: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                None
            };
            record::run(&address, port, &breakpoints, storage, json_output).await
        }
        Command::Replay { session, to } => match SessionStorage::new(db_path) {
            Ok(storage) => replay::run(&storage, &session, to, json_output).await,
            Err(e) => Err(e.to_string()),
        },
        Command::Sessions { tags } => match SessionStorage::new(db_path) {
            Ok(storage) => list_sessions(&storage, tags, json_output).await,
            Err(e) => Err(e.to_string()),
        },
        Command::Delete { session } => match SessionStorage::new(db_path) {
            Ok(storage) => storage
                .delete_session(&session)
                .await
                .map(|_| println!("Deleted session {session}"))
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn list_sessions(
    storage: &SessionStorage,
    tags: Vec<String>,
    json_output: bool,
) -> Result<(), String> {
    let filter = SessionFilter { address: None, tags };
    let sessions = storage
        .list_sessions_filtered(&filter)
        .await
        .map_err(|e| e.to_string())?;

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&sessions).map_err(|e| e.to_string())?
        );
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No recorded sessions");
        return Ok(());
    }

    for info in sessions {
        let started = chrono::DateTime::from_timestamp_micros(info.started_at_micros as i64)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let tags = if info.tags.is_empty() {
            String::new()
        } else {
            format!("  [{}]", info.tags.join(", "))
        };
        println!(
            "{}  {}  {:>6} events  {}  {}:{}{}",
            info.id, started, info.event_count, info.name, info.address, info.port, tags
        );
    }
    Ok(())
}

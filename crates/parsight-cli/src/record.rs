//! Live recording session for the CLI
//!
//! Wires a recorder to stdout notifications and drives the session until
//! the recognizer terminates or the user interrupts. A first Ctrl-C asks
//! for a polite stop; a second one (or a stop timeout) escalates to a
//! forced teardown. When the session pauses at a breakpoint, pressing
//! Enter resumes it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parsight_core::events::StdoutEventSink;
use parsight_core::recorder::{Recorder, RecorderStatus};
use parsight_core::storage::SessionStorage;
use parsight_core::{EventLog, Reconstruction};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

pub async fn run(
    address: &str,
    port: u16,
    breakpoints: &[u32],
    storage: Option<SessionStorage>,
    json_output: bool,
) -> Result<(), String> {
    let log = EventLog::new();
    let reconstruction = Arc::new(Mutex::new(Reconstruction::new()));
    let sink = Arc::new(StdoutEventSink::new(json_output));

    let breakpoint_lines: HashSet<u32> = breakpoints.iter().copied().collect();
    let recorder = Recorder::new(log, reconstruction.clone(), sink)
        .with_breakpoint_provider(Arc::new(breakpoint_lines));

    recorder
        .connect(address, port)
        .await
        .map_err(|e| e.to_string())?;

    drive_session(&recorder).await;

    let session = recorder
        .finalize_session()
        .await
        .map_err(|e| e.to_string())?;

    let violations = reconstruction.lock().await.violations().len();
    if !json_output {
        println!(
            "Session {} ({}): {} events, {} protocol violation(s)",
            session.name,
            session.id,
            session.metadata.event_count,
            violations
        );
    }

    if let Some(storage) = storage {
        storage
            .save_session(&session)
            .await
            .map_err(|e| e.to_string())?;
        if !json_output {
            println!("Saved session {}", session.id);
        }
    }

    Ok(())
}

/// Wait for the session to end, handling Ctrl-C escalation and
/// breakpoint resumption from stdin
async fn drive_session(recorder: &Recorder) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut stop_requested = false;

    loop {
        if recorder.status().await == RecorderStatus::Disconnected {
            break;
        }

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_err() {
                    recorder.force_stop().await;
                    break;
                }
                if stop_requested || recorder.status().await == RecorderStatus::Stopping {
                    eprintln!("Force stopping...");
                    recorder.force_stop().await;
                } else {
                    stop_requested = true;
                    eprintln!("Stopping... (press Ctrl-C again to force)");
                    let recorder = recorder.clone();
                    tokio::spawn(async move {
                        let _ = recorder.stop().await;
                    });
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        if recorder.state().is_paused() {
                            eprintln!("Resuming...");
                            recorder.resume();
                        }
                    }
                    _ => stdin_open = false,
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
    }
}

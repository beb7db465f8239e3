//! Time-travel player
//!
//! Replays a chosen prefix of the event log into the reconstruction
//! builders. Stepping backward is deliberately a full rebuild from event 0:
//! backtrack truncation is not easily invertible, and a rebuild is
//! deterministic regardless of prior state. Event logs are bounded by a
//! single debug session, so the recompute cost is acceptable.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::event_log::EventLog;
use crate::reconstruction::Reconstruction;
use crate::recorder::RecorderState;

struct PlaybackHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Deterministic replay over `EventLog[0..k)`.
///
/// Clone-able handle; all clones drive the same cursor and builders. While
/// a recorder is connected (and not paused at a breakpoint) it owns the
/// builders exclusively and navigation is rejected.
#[derive(Clone)]
pub struct Player {
    log: EventLog,
    reconstruction: Arc<Mutex<Reconstruction>>,
    state: Option<RecorderState>,
    current: Arc<Mutex<i64>>,
    playback: Arc<Mutex<Option<PlaybackHandle>>>,
}

impl Player {
    /// Player for offline replay (no live recorder to defer to)
    pub fn new(log: EventLog, reconstruction: Arc<Mutex<Reconstruction>>) -> Self {
        Self {
            log,
            reconstruction,
            state: None,
            current: Arc::new(Mutex::new(-1)),
            playback: Arc::new(Mutex::new(None)),
        }
    }

    /// Player sharing builders with a live recorder; navigation is only
    /// allowed while the recorder is disconnected or paused
    pub fn with_recorder_state(
        log: EventLog,
        reconstruction: Arc<Mutex<Reconstruction>>,
        state: RecorderState,
    ) -> Self {
        Self {
            state: Some(state),
            ..Self::new(log, reconstruction)
        }
    }

    async fn check_ownership(&self) -> Result<()> {
        if let Some(state) = &self.state {
            if !state.replay_allowed().await {
                return Err(AppError::RecorderActive);
            }
        }
        Ok(())
    }

    /// Index of the last applied event; -1 when no events are applied
    pub async fn current(&self) -> i64 {
        *self.current.lock().await
    }

    /// Reset the builders and replay events `[0, prefix)` in order.
    ///
    /// `prefix` is clamped to `[0, len]`. The rebuild happens atomically
    /// with respect to observers of the reconstruction. Returns the new
    /// current index.
    pub async fn play_to(&self, prefix: usize) -> Result<i64> {
        self.check_ownership().await?;

        let events = self.log.snapshot().await;
        let clamped = prefix.min(events.len());
        if clamped != prefix {
            warn!(requested = prefix, len = events.len(), "replay index clamped");
        }

        let mut current = self.current.lock().await;
        let mut reconstruction = self.reconstruction.lock().await;
        reconstruction.reset();
        for event in &events[..clamped] {
            reconstruction.apply(event);
        }
        *current = clamped as i64 - 1;
        debug!(current = *current, "replayed prefix");
        Ok(*current)
    }

    /// Apply the single next event, if any.
    ///
    /// Equivalent to `play_to(current + 2)` by replay determinism, without
    /// the rebuild. Returns the (possibly unchanged) current index.
    pub async fn step_forward(&self) -> Result<i64> {
        self.check_ownership().await?;

        let mut current = self.current.lock().await;
        let next = (*current + 1) as usize;
        match self.log.get(next).await {
            Some(event) => {
                let mut reconstruction = self.reconstruction.lock().await;
                reconstruction.apply(&event);
                *current = next as i64;
            }
            None => debug!("step_forward at end of log"),
        }
        Ok(*current)
    }

    /// Rebuild up to (but excluding) the current event
    pub async fn step_backward(&self) -> Result<i64> {
        let current = *self.current.lock().await;
        if current < 0 {
            return Ok(current);
        }
        self.play_to(current as usize).await
    }

    /// Back to "event 0": no events applied, builders cleared
    pub async fn reset(&self) -> Result<()> {
        self.play_to(0).await?;
        Ok(())
    }

    /// Auto-advance on a timer until the end of the log or cancellation.
    ///
    /// Cancellation takes effect before the next scheduled step fires; a
    /// step in flight completes fully (each apply is atomic under the
    /// reconstruction lock).
    pub async fn play_at(&self, interval: Duration) -> Result<()> {
        self.check_ownership().await?;
        self.cancel_playback().await;

        let (shutdown, mut shutdown_rx) = broadcast::channel::<()>(1);
        let player = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let before = player.current().await;
                        match player.step_forward().await {
                            Ok(after) if after != before => {}
                            // end of log, or a recorder reclaimed the builders
                            _ => break,
                        }
                    }
                }
            }
        });

        *self.playback.lock().await = Some(PlaybackHandle { shutdown, task });
        Ok(())
    }

    /// Stop auto-play. Safe to call at any time, including when idle.
    pub async fn cancel_playback(&self) {
        if let Some(handle) = self.playback.lock().await.take() {
            let _ = handle.shutdown.send(());
            let _ = handle.task.await;
        }
    }

    /// Whether an auto-play task is currently registered
    pub async fn is_playing(&self) -> bool {
        self.playback
            .lock()
            .await
            .as_ref()
            .map(|h| !h.task.is_finished())
            .unwrap_or(false)
    }
}

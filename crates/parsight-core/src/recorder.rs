//! Live session recorder
//!
//! Owns the connection to a running recognizer (local or remote), drains
//! its event stream strictly in arrival order, appends every event to the
//! event log, and forwards it to the reconstruction builders and the
//! breakpoint evaluator. The ingestion task is the single writer of the
//! log; while connected it owns the builders exclusively.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::breakpoint::{BreakpointProvider, BreakpointSet};
use crate::error::{AppError, Result};
use crate::event_log::EventLog;
use crate::events::DebugEventSink;
use crate::names::SessionId;
use crate::protocol::{decode_event, decode_handshake, ControlRequest, DebugEvent};
use crate::reconstruction::Reconstruction;
use crate::session::{RecordedDebugSession, SessionMetadata};

/// Default port recognizers publish their event stream on
pub const DEFAULT_PORT: u16 = 49100;

/// Default bound on a connection attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a polite stop before the caller escalates
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Recorder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Stopping,
}

impl std::fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderStatus::Disconnected => write!(f, "disconnected"),
            RecorderStatus::Connecting => write!(f, "connecting"),
            RecorderStatus::Connected => write!(f, "connected"),
            RecorderStatus::Stopping => write!(f, "stopping"),
        }
    }
}

/// Shared recorder state, also consulted by the player to decide whether
/// replay navigation may take ownership of the builders.
#[derive(Clone, Default)]
pub struct RecorderState {
    status: Arc<Mutex<RecorderStatus>>,
    paused: Arc<AtomicBool>,
}

impl RecorderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self) -> RecorderStatus {
        *self.status.lock().await
    }

    pub(crate) async fn set_status(&self, status: RecorderStatus) {
        *self.status.lock().await = status;
    }

    /// Whether the session is paused at a breakpoint
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Replay may drive the builders only when no live session owns them
    pub async fn replay_allowed(&self) -> bool {
        self.status().await == RecorderStatus::Disconnected || self.is_paused()
    }
}

/// Book-keeping for the connection currently claimed by `connect`
struct ActiveSession {
    generation: u64,
    shutdown: broadcast::Sender<()>,
    writer: Option<Arc<Mutex<OwnedWriteHalf>>>,
    ended: Option<watch::Receiver<bool>>,
}

#[derive(Clone)]
struct SessionHeader {
    session: SessionId,
    address: String,
    port: u16,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

/// Records a live debug session from a recognizer event stream.
///
/// Clone-able handle over shared state; the ingestion task runs
/// independently once connected. Lifecycle:
/// `Disconnected -> Connecting -> Connected -> Stopping -> Disconnected`.
#[derive(Clone)]
pub struct Recorder {
    log: EventLog,
    reconstruction: Arc<Mutex<Reconstruction>>,
    sink: Arc<dyn DebugEventSink>,
    state: RecorderState,
    breakpoints: Arc<Mutex<BreakpointSet>>,
    provider: Option<Arc<dyn BreakpointProvider>>,
    active: Arc<Mutex<Option<ActiveSession>>>,
    header: Arc<Mutex<Option<SessionHeader>>>,
    resume_notify: Arc<Notify>,
    generation: Arc<AtomicU64>,
    connect_timeout: Duration,
    stop_timeout: Duration,
}

impl Recorder {
    pub fn new(
        log: EventLog,
        reconstruction: Arc<Mutex<Reconstruction>>,
        sink: Arc<dyn DebugEventSink>,
    ) -> Self {
        Self {
            log,
            reconstruction,
            sink,
            state: RecorderState::new(),
            breakpoints: Arc::new(Mutex::new(BreakpointSet::default())),
            provider: None,
            active: Arc::new(Mutex::new(None)),
            header: Arc::new(Mutex::new(None)),
            resume_notify: Arc::new(Notify::new()),
            generation: Arc::new(AtomicU64::new(0)),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Query breakpoints from `provider` at every session start
    pub fn with_breakpoint_provider(mut self, provider: Arc<dyn BreakpointProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Shared state handle (for wiring a [`crate::player::Player`])
    pub fn state(&self) -> RecorderState {
        self.state.clone()
    }

    pub async fn status(&self) -> RecorderStatus {
        self.state.status().await
    }

    /// Replace the cached breakpoint set for the running session
    pub async fn set_breakpoints(&self, breakpoints: BreakpointSet) {
        *self.breakpoints.lock().await = breakpoints;
    }

    /// Release a pending breakpoint pause; the withheld `Continue`
    /// acknowledgment is sent and ingestion resumes
    pub fn resume(&self) {
        if self.state.is_paused() {
            self.resume_notify.notify_one();
        }
    }

    /// Connect to a recognizer and start recording.
    ///
    /// Suspends the caller only until the attempt resolves: success,
    /// failure/timeout, or cancellation by `force_stop`. On success the
    /// event log is cleared, the builders are reset to event 0, and the
    /// ingestion task takes over; all further delivery is asynchronous
    /// notification through the sink.
    pub async fn connect(&self, address: &str, port: u16) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown, mut shutdown_rx) = broadcast::channel::<()>(1);

        {
            let mut slot = self.active.lock().await;
            if slot.is_some() || self.state.status().await != RecorderStatus::Disconnected {
                return Err(AppError::AlreadyConnected);
            }
            *slot = Some(ActiveSession {
                generation,
                shutdown: shutdown.clone(),
                writer: None,
                ended: None,
            });
        }

        self.state.set_status(RecorderStatus::Connecting).await;
        let _ = self.sink.status_changed(RecorderStatus::Connecting).await;
        info!(address, port, "connecting to recognizer");

        let attempt = timeout(self.connect_timeout, TcpStream::connect((address, port)));
        let stream = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return Err(AppError::ConnectionCancelled),
            resolved = attempt => match resolved {
                Err(_) => {
                    self.abandon_attempt(generation, "connection timed out").await;
                    return Err(AppError::ConnectionTimeout);
                }
                Ok(Err(e)) => {
                    let reason = e.to_string();
                    self.abandon_attempt(generation, &reason).await;
                    return Err(AppError::ConnectionFailed(reason));
                }
                Ok(Ok(stream)) => stream,
            },
        };

        let (read_half, write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        // The first frame must be a matching handshake; anything else
        // fails the attempt.
        let first = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return Err(AppError::ConnectionCancelled),
            line = timeout(self.connect_timeout, lines.next_line()) => line,
        };
        let first = match first {
            Err(_) => {
                self.abandon_attempt(generation, "timed out waiting for handshake").await;
                return Err(AppError::ConnectionTimeout);
            }
            Ok(Err(e)) => {
                let reason = e.to_string();
                self.abandon_attempt(generation, &reason).await;
                return Err(AppError::ConnectionFailed(reason));
            }
            Ok(Ok(None)) => {
                self.abandon_attempt(generation, "stream closed during handshake").await;
                return Err(AppError::ConnectionFailed(
                    "stream closed during handshake".to_string(),
                ));
            }
            Ok(Ok(Some(line))) => line,
        };
        if let Err(e) = decode_handshake(&first) {
            self.abandon_attempt(generation, &e.to_string()).await;
            return Err(e);
        }

        // Fresh session: event 0 state, breakpoints re-queried
        self.log.clear().await;
        self.reconstruction.lock().await.reset();
        if let Some(provider) = &self.provider {
            *self.breakpoints.lock().await = BreakpointSet::from_provider(provider.as_ref());
        }
        *self.header.lock().await = Some(SessionHeader {
            session: SessionId::new(),
            address: address.to_string(),
            port,
            started_at: Utc::now(),
            ended_at: None,
        });

        let writer = Arc::new(Mutex::new(write_half));
        let (ended_tx, ended_rx) = watch::channel(false);
        {
            let mut slot = self.active.lock().await;
            match slot.as_mut() {
                Some(session) if session.generation == generation => {
                    session.writer = Some(writer.clone());
                    session.ended = Some(ended_rx);
                }
                // force_stop won the race during setup
                _ => return Err(AppError::ConnectionCancelled),
            }
        }

        self.state.set_status(RecorderStatus::Connected).await;
        let _ = self.sink.status_changed(RecorderStatus::Connected).await;
        let _ = self.sink.connection_established(address, port).await;
        info!(address, port, "recognizer connected");

        let recorder = self.clone();
        tokio::spawn(async move {
            recorder
                .run_ingestion(lines, writer, shutdown_rx, generation)
                .await;
            let _ = ended_tx.send(true);
        });

        Ok(())
    }

    /// Politely ask the recognizer to terminate, then wait (bounded by the
    /// stop timeout) for the stream to end. On timeout the session stays
    /// in `Stopping`; the caller is expected to escalate to `force_stop`.
    pub async fn stop(&self) -> Result<()> {
        if self.state.status().await != RecorderStatus::Connected {
            return Err(AppError::NotConnected);
        }
        let (writer, ended) = {
            let slot = self.active.lock().await;
            match slot.as_ref() {
                Some(session) => match (&session.writer, &session.ended) {
                    (Some(writer), Some(ended)) => (writer.clone(), ended.clone()),
                    _ => return Err(AppError::NotConnected),
                },
                None => return Err(AppError::NotConnected),
            }
        };

        self.state.set_status(RecorderStatus::Stopping).await;
        let _ = self.sink.status_changed(RecorderStatus::Stopping).await;
        info!("stopping recognizer session");

        // A session paused at a breakpoint must drain before it can see
        // the terminate exchange.
        self.resume();
        write_control(&writer, ControlRequest::Terminate).await?;

        let mut ended = ended;
        let result = match timeout(self.stop_timeout, ended.wait_for(|&done| done)).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("recognizer did not stop in time");
                Err(AppError::StopTimeout)
            }
        };
        result
    }

    /// Tear down the connection unconditionally, from any state.
    ///
    /// Safe to invoke at any time: cancels a pending `connect`, interrupts
    /// a breakpoint pause, and escalates a stuck polite stop. No further
    /// events from the torn-down connection reach the log.
    pub async fn force_stop(&self) {
        let taken = self.active.lock().await.take();
        if let Some(session) = taken {
            let _ = session.shutdown.send(());
            if let Some(writer) = session.writer {
                let _ = writer.lock().await.shutdown().await;
            }
            info!("session force-stopped");
        }
        self.state.set_paused(false);
        if self.state.status().await != RecorderStatus::Disconnected {
            self.state.set_status(RecorderStatus::Disconnected).await;
            let _ = self.sink.status_changed(RecorderStatus::Disconnected).await;
            let _ = self.sink.connection_closed().await;
        }
        if let Some(header) = self.header.lock().await.as_mut() {
            header.ended_at.get_or_insert_with(Utc::now);
        }
    }

    /// Snapshot the current log into a persistable session record
    pub async fn finalize_session(&self) -> Result<RecordedDebugSession> {
        let header = self
            .header
            .lock()
            .await
            .clone()
            .ok_or(AppError::NotConnected)?;
        let events = self.log.snapshot().await;
        let duration_ms = header
            .ended_at
            .map(|ended| (ended - header.started_at).num_milliseconds().max(0) as u64);

        Ok(RecordedDebugSession {
            id: header.session.id,
            name: header.session.name,
            started_at: header.started_at,
            ended_at: header.ended_at,
            metadata: SessionMetadata {
                address: header.address,
                port: header.port,
                event_count: events.len(),
                duration_ms,
                tags: Vec::new(),
            },
            events,
        })
    }

    async fn abandon_attempt(&self, generation: u64, reason: &str) {
        let is_current = {
            let mut slot = self.active.lock().await;
            let is_current = slot
                .as_ref()
                .map(|s| s.generation == generation)
                .unwrap_or(false);
            if is_current {
                *slot = None;
            }
            is_current
        };
        if is_current {
            warn!(reason, "connection attempt failed");
            self.state.set_status(RecorderStatus::Disconnected).await;
            let _ = self.sink.status_changed(RecorderStatus::Disconnected).await;
            let _ = self.sink.connection_failed(reason).await;
        }
    }

    /// Drain the event stream, one event at a time, in arrival order
    async fn run_ingestion(
        &self,
        mut lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
        writer: Arc<Mutex<OwnedWriteHalf>>,
        mut shutdown_rx: broadcast::Receiver<()>,
        generation: u64,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("ingestion shut down");
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.is_empty() {
                            continue;
                        }
                        let event = match decode_event(&line) {
                            Ok(event) => event,
                            Err(e) => {
                                // Malformed protocol data is fatal to the
                                // connection, never retried.
                                error!(error = %e, "closing connection");
                                let _ = self.sink.violation(&e.to_string()).await;
                                break;
                            }
                        };
                        if !self.ingest_event(event, &writer, &mut shutdown_rx).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("event stream ended");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "connection error");
                        break;
                    }
                },
            }
        }

        self.finish_session(generation).await;
    }

    /// Apply one decoded event. Returns false when the session should end.
    async fn ingest_event(
        &self,
        event: DebugEvent,
        writer: &Arc<Mutex<OwnedWriteHalf>>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> bool {
        let terminate = matches!(event, DebugEvent::Terminate);

        let index = self.log.append(event.clone()).await;
        let report = self.reconstruction.lock().await.apply(&event);
        for violation in &report.violations {
            warn!(index, %violation, "protocol violation");
            let _ = self.sink.violation(violation).await;
        }
        for delta in &report.deltas {
            let _ = self.sink.delta(delta).await;
        }
        let _ = self.sink.event_applied(index, &event).await;

        if terminate {
            info!("recognizer terminated the session");
            return false;
        }

        if let Some(line) = self.breakpoints.lock().await.should_pause(&event) {
            self.state.set_paused(true);
            info!(line, "paused at breakpoint");
            let _ = self.sink.breakpoint_hit(line).await;
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    self.state.set_paused(false);
                    return false;
                }
                _ = self.resume_notify.notified() => {
                    self.state.set_paused(false);
                }
            }
        }

        if let Err(e) = write_control(writer, ControlRequest::Continue).await {
            warn!(error = %e, "control channel closed");
            return false;
        }
        true
    }

    async fn finish_session(&self, generation: u64) {
        let is_current = {
            let mut slot = self.active.lock().await;
            let is_current = slot
                .as_ref()
                .map(|s| s.generation == generation)
                .unwrap_or(false);
            if is_current {
                *slot = None;
            }
            is_current
        };
        if is_current {
            self.state.set_paused(false);
            self.state.set_status(RecorderStatus::Disconnected).await;
            let _ = self.sink.status_changed(RecorderStatus::Disconnected).await;
            let _ = self.sink.connection_closed().await;
        }
        if let Some(header) = self.header.lock().await.as_mut() {
            header.ended_at.get_or_insert_with(Utc::now);
        }
        info!("recording session finished");
    }
}

async fn write_control(writer: &Arc<Mutex<OwnedWriteHalf>>, request: ControlRequest) -> Result<()> {
    let mut frame = serde_json::to_string(&request)?;
    frame.push('\n');
    let mut guard = writer.lock().await;
    guard.write_all(frame.as_bytes()).await?;
    guard.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoOpEventSink;
    use crate::player::Player;
    use crate::protocol::tests::token;
    use crate::protocol::{encode_event, PROTOCOL_VERSION};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Sink that counts breakpoint hits and collects violations
    #[derive(Default)]
    struct CollectingSink {
        breakpoints: std::sync::Mutex<Vec<u32>>,
        violations: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DebugEventSink for CollectingSink {
        async fn status_changed(&self, _status: RecorderStatus) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn connection_established(&self, _a: &str, _p: u16) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn connection_failed(&self, _reason: &str) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn connection_closed(&self) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn event_applied(&self, _i: usize, _e: &DebugEvent) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn delta(
            &self,
            _d: &crate::reconstruction::StructuralDelta,
        ) -> std::result::Result<(), String> {
            Ok(())
        }
        async fn breakpoint_hit(&self, line: u32) -> std::result::Result<(), String> {
            self.breakpoints.lock().unwrap().push(line);
            Ok(())
        }
        async fn violation(&self, description: &str) -> std::result::Result<(), String> {
            self.violations.lock().unwrap().push(description.to_string());
            Ok(())
        }
    }

    fn recorder_with_sink(sink: Arc<dyn DebugEventSink>) -> Recorder {
        Recorder::new(
            EventLog::new(),
            Arc::new(Mutex::new(Reconstruction::new())),
            sink,
        )
    }

    fn handshake_line() -> String {
        format!("{{\"version\":{PROTOCOL_VERSION}}}\n")
    }

    fn sample_events() -> Vec<DebugEvent> {
        vec![
            DebugEvent::EnterRule { rule: "prog".to_string(), line: 1, char_position: 0 },
            DebugEvent::ConsumeToken { token: token("x", 1, 0) },
            DebugEvent::AstCreateNode { id: 1, token: token("x", 1, 0) },
            DebugEvent::ExitRule { rule: "prog".to_string() },
            DebugEvent::Terminate,
        ]
    }

    /// Fake recognizer: sends the handshake plus `events`, then closes
    async fn spawn_recognizer(events: Vec<DebugEvent>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut payload = handshake_line();
            for event in &events {
                payload.push_str(&encode_event(event).unwrap());
                payload.push('\n');
            }
            stream.write_all(payload.as_bytes()).await.unwrap();
            // drain control frames until the recorder goes away
            let mut buf = [0u8; 1024];
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });
        addr.to_string()
    }

    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..500 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    fn split_addr(addr: &str) -> (String, u16) {
        let (host, port) = addr.rsplit_once(':').unwrap();
        (host.to_string(), port.parse().unwrap())
    }

    #[tokio::test]
    async fn test_recording_round_trip_matches_replay() {
        let addr = spawn_recognizer(sample_events()).await;
        let (host, port) = split_addr(&addr);

        let recorder = recorder_with_sink(Arc::new(NoOpEventSink));
        recorder.connect(&host, port).await.unwrap();

        let state = recorder.state();
        wait_until(|| async { state.status().await == RecorderStatus::Disconnected }).await;

        assert_eq!(recorder.log.len().await, sample_events().len());
        let live = recorder.reconstruction.lock().await.clone();

        // replaying the full log from fresh builders reproduces the live state
        let replayed = Arc::new(Mutex::new(Reconstruction::new()));
        let player = Player::new(recorder.log.clone(), replayed.clone());
        player.play_to(recorder.log.len().await).await.unwrap();
        assert_eq!(*replayed.lock().await, live);

        let session = recorder.finalize_session().await.unwrap();
        assert_eq!(session.metadata.event_count, sample_events().len());
        assert!(session.terminated_cleanly());
        assert!(session.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_connect_refused_is_reported() {
        // bind then drop to obtain a port with no listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let recorder = recorder_with_sink(Arc::new(NoOpEventSink));
        let result = recorder.connect("127.0.0.1", addr.port()).await;

        assert!(matches!(
            result,
            Err(AppError::ConnectionFailed(_)) | Err(AppError::ConnectionTimeout)
        ));
        assert_eq!(recorder.status().await, RecorderStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_malformed_event_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut payload = handshake_line();
            payload.push_str("this is not an event\n");
            stream.write_all(payload.as_bytes()).await.unwrap();
            let mut buf = [0u8; 1024];
            while let Ok(n) = stream.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });

        let sink = Arc::new(CollectingSink::default());
        let recorder = recorder_with_sink(sink.clone());
        recorder.connect("127.0.0.1", addr.port()).await.unwrap();

        let state = recorder.state();
        wait_until(|| async { state.status().await == RecorderStatus::Disconnected }).await;

        assert!(recorder.log.is_empty().await);
        let violations = sink.violations.lock().unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("malformed event frame"));
    }

    #[tokio::test]
    async fn test_breakpoint_pauses_exactly_once_and_resumes() {
        let events = vec![
            DebugEvent::EnterRule { rule: "expr".to_string(), line: 3, char_position: 0 },
            DebugEvent::ConsumeToken { token: token("x", 3, 0) },
            DebugEvent::ExitRule { rule: "expr".to_string() },
            DebugEvent::Terminate,
        ];
        let addr = spawn_recognizer(events).await;
        let (host, port) = split_addr(&addr);

        let breakpoints: HashSet<u32> = [3].into_iter().collect();
        let sink = Arc::new(CollectingSink::default());
        let recorder = recorder_with_sink(sink.clone())
            .with_breakpoint_provider(Arc::new(breakpoints));
        recorder.connect(&host, port).await.unwrap();

        let state = recorder.state();
        wait_until(|| async { state.is_paused() }).await;
        // paused right after the consume event; later events not yet applied
        assert_eq!(recorder.log.len().await, 2);

        recorder.resume();
        wait_until(|| async { state.status().await == RecorderStatus::Disconnected }).await;

        assert_eq!(recorder.log.len().await, 4);
        // enter/exit on line 3 never pause; only the consume did
        assert_eq!(*sink.breakpoints.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_force_stop_while_connecting() {
        // accepts the TCP connection but never sends a handshake
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(stream);
        });

        let recorder = recorder_with_sink(Arc::new(NoOpEventSink))
            .with_connect_timeout(Duration::from_secs(30));
        let connecting = {
            let recorder = recorder.clone();
            tokio::spawn(async move { recorder.connect("127.0.0.1", addr.port()).await })
        };

        let state = recorder.state();
        wait_until(|| async { state.status().await == RecorderStatus::Connecting }).await;
        recorder.force_stop().await;

        let result = connecting.await.unwrap();
        assert!(matches!(result, Err(AppError::ConnectionCancelled)));
        assert_eq!(recorder.status().await, RecorderStatus::Disconnected);
        assert!(recorder.log.is_empty().await);
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_rejected() {
        // stays connected: no terminate, stream kept open
        let events = vec![DebugEvent::EnterRule {
            rule: "expr".to_string(),
            line: 1,
            char_position: 0,
        }];
        let addr = spawn_recognizer(events).await;
        let (host, port) = split_addr(&addr);

        let recorder = recorder_with_sink(Arc::new(NoOpEventSink));
        recorder.connect(&host, port).await.unwrap();
        wait_until(|| async { recorder.log.len().await == 1 }).await;

        let second = recorder.connect(&host, port).await;
        assert!(matches!(second, Err(AppError::AlreadyConnected)));

        recorder.force_stop().await;
        assert_eq!(recorder.status().await, RecorderStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_polite_stop_terminate_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut payload = handshake_line();
            payload.push_str(
                &encode_event(&DebugEvent::EnterRule {
                    rule: "expr".to_string(),
                    line: 1,
                    char_position: 0,
                })
                .unwrap(),
            );
            payload.push('\n');
            write_half.write_all(payload.as_bytes()).await.unwrap();

            // acknowledge the polite stop with a Terminate event
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.contains("terminate") {
                    let mut out = encode_event(&DebugEvent::Terminate).unwrap();
                    out.push('\n');
                    write_half.write_all(out.as_bytes()).await.unwrap();
                    break;
                }
            }
        });

        let recorder = recorder_with_sink(Arc::new(NoOpEventSink));
        recorder.connect("127.0.0.1", addr.port()).await.unwrap();
        wait_until(|| async { recorder.log.len().await == 1 }).await;

        recorder.stop().await.unwrap();
        assert_eq!(recorder.status().await, RecorderStatus::Disconnected);
        assert_eq!(
            recorder.log.get(1).await,
            Some(DebugEvent::Terminate)
        );
    }

    #[tokio::test]
    async fn test_stop_without_connection() {
        let recorder = recorder_with_sink(Arc::new(NoOpEventSink));
        assert!(matches!(recorder.stop().await, Err(AppError::NotConnected)));
        // force_stop is safe from any state
        recorder.force_stop().await;
        assert_eq!(recorder.status().await, RecorderStatus::Disconnected);
    }
}

//! The live-channel connection manager.
//!
//! Owns one duplex channel per watched simulation and keeps it alive
//! against an unstable network: periodic heartbeats probe liveness, a
//! missed acknowledgement tears the session down, and reconnection runs
//! with exponential backoff under a bounded attempt budget.
//!
//! The manager is an explicit state machine driven by a single session
//! task per simulation id:
//!
//! ```text
//! CONNECTING ──ok──> OPEN <──ack── HEARTBEAT_WAIT
//!     │                │  ──beat──────^
//!     │                │
//!     │ fail           │ abnormal close / liveness failure
//!     v                v
//!   CLOSED <──────  RECONNECTING (delay = min(initial * 1.5^n, 30s))
//!              budget spent
//! ```
//!
//! Every observable transition is reported through the caller-supplied
//! [`LiveHandlers`]; nothing escapes as a panic or an error return. A
//! session that was closed deliberately (codes 1000/1001/1005, or an
//! explicit [`LiveHandle::close`]) never reconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use pursuit_env::{ChannelEvent, CloseInfo, LiveChannel, LiveTransport, ViewerContext};

use crate::endpoint::ServerEndpoint;
use crate::model::StateUpdate;
use crate::protocol::{self, Inbound};

/// Reconnect delays never exceed this, regardless of attempt count.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tunables for one live session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Automatic reconnect attempts before the session goes terminal
    pub retry_attempts: u32,

    /// Base delay fed into the exponential backoff
    pub initial_delay: Duration,

    /// Interval between outbound heartbeats while the channel is open
    pub heartbeat_interval: Duration,

    /// Window after a heartbeat in which an acknowledgement must arrive
    pub heartbeat_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_millis(30_000),
            heartbeat_timeout: Duration::from_millis(5000),
        }
    }
}

/// Backoff delay for the given attempt: `min(initial * 1.5^attempt, 30s)`.
///
/// The counter is incremented before each scheduled retry, so the first
/// retry after a failure uses attempt 1.
pub fn reconnect_delay(initial_delay: Duration, attempt: u32) -> Duration {
    let scaled = initial_delay.as_secs_f64() * 1.5f64.powi(attempt.min(64) as i32);
    Duration::from_secs_f64(scaled.min(MAX_RECONNECT_DELAY.as_secs_f64()))
}

// ============================================================================
// ERRORS AND HANDLERS
// ============================================================================

/// Failures surfaced through the error callback.
#[derive(Debug, Clone, Error)]
pub enum LiveError {
    /// The channel could not even be constructed (unusable endpoint)
    #[error("channel construction failed: {0}")]
    Construction(String),

    /// A connect attempt failed before the handshake completed
    #[error("connect failed: {0}")]
    Connect(String),

    /// The established channel reported a transport-level error
    #[error("transport error: {0}")]
    Transport(String),

    /// The server pushed an error payload; the channel stays open
    #[error("server error: {0}")]
    Protocol(String),

    /// The reconnect budget is spent; the session is terminal
    #[error("reconnect budget exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

type OpenFn = Box<dyn Fn() + Send + Sync>;
type MessageFn = Box<dyn Fn(StateUpdate, &str) + Send + Sync>;
type CloseFn = Box<dyn Fn(CloseInfo) + Send + Sync>;
type ErrorFn = Box<dyn Fn(LiveError) + Send + Sync>;
type ReconnectFn = Box<dyn Fn(u32) + Send + Sync>;

/// Caller-supplied lifecycle callbacks. All optional.
///
/// Callbacks run on the session task; keep them short and non-blocking.
#[derive(Default)]
pub struct LiveHandlers {
    open: Option<OpenFn>,
    message: Option<MessageFn>,
    close: Option<CloseFn>,
    error: Option<ErrorFn>,
    reconnect: Option<ReconnectFn>,
}

impl LiveHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked once per successful (re)establishment.
    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.open = Some(Box::new(f));
        self
    }

    /// Invoked with each forwarded state update and its raw frame.
    pub fn on_message(mut self, f: impl Fn(StateUpdate, &str) + Send + Sync + 'static) -> Self {
        self.message = Some(Box::new(f));
        self
    }

    /// Invoked when the peer closes the channel.
    pub fn on_close(mut self, f: impl Fn(CloseInfo) + Send + Sync + 'static) -> Self {
        self.close = Some(Box::new(f));
        self
    }

    /// Invoked for every surfaced failure; see [`LiveError`].
    pub fn on_error(mut self, f: impl Fn(LiveError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Invoked when a replacement session establishes, with the attempt
    /// number that succeeded, immediately before its `on_open`.
    pub fn on_reconnect(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.reconnect = Some(Box::new(f));
        self
    }

    fn emit_open(&self) {
        if let Some(f) = &self.open {
            f();
        }
    }

    fn emit_message(&self, update: StateUpdate, raw: &str) {
        if let Some(f) = &self.message {
            f(update, raw);
        }
    }

    fn emit_close(&self, info: CloseInfo) {
        if let Some(f) = &self.close {
            f(info);
        }
    }

    fn emit_error(&self, error: LiveError) {
        if let Some(f) = &self.error {
            f(error);
        }
    }

    fn emit_reconnect(&self, attempt: u32) {
        if let Some(f) = &self.reconnect {
            f(attempt);
        }
    }
}

// ============================================================================
// SESSION HANDLE
// ============================================================================

/// Handle to one live session.
///
/// Dropping the handle closes the session. `close` is idempotent and
/// safe to call after the session has already ended; no callback fires
/// after it.
#[derive(Debug)]
pub struct LiveHandle {
    simulation_id: u64,
    shutdown: watch::Sender<bool>,
    established: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
}

impl LiveHandle {
    pub fn simulation_id(&self) -> u64 {
        self.simulation_id
    }

    /// Whether the channel has completed its opening handshake and is
    /// currently up.
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    /// Reconnect attempts consumed since the last establishment.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Requests teardown: cancels heartbeat timers, closes the channel
    /// with code 1000 if it is up, and detaches every callback.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// OPEN
// ============================================================================

/// Opens a live session for one simulation.
///
/// Builds the channel URL from the endpoint and simulation id and spawns
/// the session task. Returns `None` — after reporting
/// [`LiveError::Construction`] — when no channel URL can be formed;
/// every later failure is reported through the handlers instead.
pub fn open<C: ViewerContext>(
    ctx: Arc<C>,
    transport: Arc<dyn LiveTransport>,
    endpoint: &ServerEndpoint,
    simulation_id: u64,
    config: LiveConfig,
    handlers: LiveHandlers,
) -> Option<LiveHandle> {
    if !endpoint.is_usable() {
        handlers.emit_error(LiveError::Construction(format!(
            "unusable endpoint host {:?}",
            endpoint.host
        )));
        return None;
    }

    let url = endpoint.channel_url(simulation_id);
    info!(simulation_id, %url, "opening live channel");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let established = Arc::new(AtomicBool::new(false));
    let attempts = Arc::new(AtomicU32::new(0));

    let session = SessionTask {
        ctx: Arc::clone(&ctx),
        transport,
        url,
        simulation_id,
        config,
        handlers,
        established: Arc::clone(&established),
        attempts: Arc::clone(&attempts),
        shutdown: shutdown_rx,
    };
    ctx.spawn("live-session", session.run());

    Some(LiveHandle {
        simulation_id,
        shutdown: shutdown_tx,
        established,
        attempts,
    })
}

// ============================================================================
// SESSION TASK
// ============================================================================

/// Why an established channel stopped being driven.
enum SessionEnd {
    /// The handle requested teardown
    Shutdown,

    /// The peer sent a close frame
    Closed(CloseInfo),

    /// The stream ended without a close frame
    StreamEnded,

    /// No acknowledgement arrived within the heartbeat window
    HeartbeatTimeout,

    /// An outbound heartbeat could not be written
    SendFailed,
}

struct SessionTask<C: ViewerContext> {
    ctx: Arc<C>,
    transport: Arc<dyn LiveTransport>,
    url: String,
    simulation_id: u64,
    config: LiveConfig,
    handlers: LiveHandlers,
    established: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
    shutdown: watch::Receiver<bool>,
}

impl<C: ViewerContext> SessionTask<C> {
    async fn run(mut self) {
        let mut ever_established = false;

        loop {
            // CONNECTING
            let connect_result = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return,
                result = self.transport.connect(&self.url) => result,
            };

            let mut channel = match connect_result {
                Ok(channel) => channel,
                Err(error) => {
                    self.handlers.emit_error(LiveError::Connect(error.to_string()));
                    if !ever_established {
                        // A channel that never opened successfully is not
                        // reconnected; re-arming takes an explicit `open`.
                        warn!(
                            simulation_id = self.simulation_id,
                            %error,
                            "initial connect failed, session terminal"
                        );
                        return;
                    }
                    if !self.backoff().await {
                        return;
                    }
                    continue;
                }
            };

            // OPEN
            let resumed_attempt = self.attempts.swap(0, Ordering::SeqCst);
            self.established.store(true, Ordering::SeqCst);
            if ever_established {
                info!(
                    simulation_id = self.simulation_id,
                    attempt = resumed_attempt,
                    "live channel re-established"
                );
                self.handlers.emit_reconnect(resumed_attempt);
            } else {
                info!(simulation_id = self.simulation_id, "live channel established");
            }
            ever_established = true;
            self.handlers.emit_open();

            let end = self.drive(channel.as_mut()).await;
            self.established.store(false, Ordering::SeqCst);

            match end {
                SessionEnd::Shutdown => {
                    // Deliberate teardown: close quietly, detach callbacks.
                    let _ = channel.close(1000).await;
                    debug!(simulation_id = self.simulation_id, "live channel closed by client");
                    return;
                }
                SessionEnd::Closed(info) if info.is_normal() => {
                    info!(simulation_id = self.simulation_id, %info, "live channel closed");
                    self.handlers.emit_close(info);
                    return;
                }
                SessionEnd::Closed(info) => {
                    warn!(
                        simulation_id = self.simulation_id,
                        %info,
                        "live channel closed abnormally"
                    );
                    self.handlers.emit_close(info);
                }
                SessionEnd::StreamEnded => {
                    warn!(simulation_id = self.simulation_id, "live channel stream ended");
                    self.handlers.emit_close(CloseInfo::abnormal());
                }
                SessionEnd::HeartbeatTimeout | SessionEnd::SendFailed => {
                    // Liveness failure: the link is dead even though no
                    // close arrived. Tear down without a close callback.
                    let _ = channel.close(1000).await;
                }
            }

            if !self.backoff().await {
                return;
            }
        }
    }

    /// Drives one established channel: heartbeats out, frames in.
    ///
    /// Deadlines are re-derived from the context clock each iteration so
    /// the loop stays accurate however often frames arrive.
    async fn drive(&mut self, channel: &mut dyn LiveChannel) -> SessionEnd {
        let mut next_beat = self.ctx.now() + self.config.heartbeat_interval;
        let mut ack_deadline: Option<Duration> = None;

        loop {
            let now = self.ctx.now();
            let beat_in = next_beat.saturating_sub(now);
            let ack_armed = ack_deadline.is_some();
            let ack_in = ack_deadline
                .map(|deadline| deadline.saturating_sub(now))
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                biased;

                _ = self.shutdown.changed() => return SessionEnd::Shutdown,

                _ = self.ctx.sleep(ack_in), if ack_armed => {
                    warn!(
                        simulation_id = self.simulation_id,
                        "heartbeat unacknowledged, treating connection as dead"
                    );
                    return SessionEnd::HeartbeatTimeout;
                }

                _ = self.ctx.sleep(beat_in) => {
                    if let Err(error) = channel.send_text(protocol::heartbeat_frame()).await {
                        warn!(simulation_id = self.simulation_id, %error, "heartbeat send failed");
                        return SessionEnd::SendFailed;
                    }
                    let sent_at = self.ctx.now();
                    ack_deadline = Some(sent_at + self.config.heartbeat_timeout);
                    next_beat = sent_at + self.config.heartbeat_interval;
                }

                event = channel.recv() => match event {
                    Some(ChannelEvent::Text(raw)) => match protocol::classify(&raw) {
                        Ok(Inbound::HeartbeatAck) => {
                            ack_deadline = None;
                        }
                        Ok(Inbound::ProtocolError(message)) => {
                            warn!(simulation_id = self.simulation_id, %message, "server error frame");
                            self.handlers.emit_error(LiveError::Protocol(message));
                        }
                        Ok(Inbound::Update(update)) => {
                            self.handlers.emit_message(update, &raw);
                        }
                        Ok(Inbound::Incomplete) => {
                            debug!(simulation_id = self.simulation_id, "discarding incomplete frame");
                        }
                        Err(error) => {
                            warn!(simulation_id = self.simulation_id, %error, "discarding unparsable frame");
                        }
                    },
                    Some(ChannelEvent::Error(error)) => {
                        // Reported on its own; the reconnect decision
                        // belongs to the close that follows.
                        self.handlers.emit_error(LiveError::Transport(error.to_string()));
                    }
                    Some(ChannelEvent::Closed(info)) => return SessionEnd::Closed(info),
                    None => return SessionEnd::StreamEnded,
                },
            }
        }
    }

    /// Consumes one reconnect attempt and waits out the backoff delay.
    ///
    /// Returns false when the budget is spent or teardown was requested;
    /// the session ends in either case.
    async fn backoff(&mut self) -> bool {
        let used = self.attempts.load(Ordering::SeqCst);
        if used >= self.config.retry_attempts {
            warn!(
                simulation_id = self.simulation_id,
                attempts = used,
                "reconnect budget exhausted"
            );
            self.handlers
                .emit_error(LiveError::RetriesExhausted { attempts: used });
            return false;
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = reconnect_delay(self.config.initial_delay, attempt);
        info!(
            simulation_id = self.simulation_id,
            attempt,
            max = self.config.retry_attempts,
            ?delay,
            "scheduling reconnect"
        );

        tokio::select! {
            biased;
            _ = self.shutdown.changed() => false,
            _ = self.ctx.sleep(delay) => true,
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// At most one live session per simulation id.
///
/// Opening a session for an id that already has one supersedes it: the
/// previous handle is dropped, which tears its task down before the new
/// session is created.
pub struct LiveConnections<C: ViewerContext> {
    ctx: Arc<C>,
    transport: Arc<dyn LiveTransport>,
    endpoint: ServerEndpoint,
    sessions: HashMap<u64, LiveHandle>,
}

impl<C: ViewerContext> LiveConnections<C> {
    pub fn new(ctx: Arc<C>, transport: Arc<dyn LiveTransport>, endpoint: ServerEndpoint) -> Self {
        Self {
            ctx,
            transport,
            endpoint,
            sessions: HashMap::new(),
        }
    }

    /// Opens (or replaces) the session for a simulation. Returns false
    /// when the channel could not be constructed.
    pub fn open(&mut self, simulation_id: u64, config: LiveConfig, handlers: LiveHandlers) -> bool {
        if let Some(previous) = self.sessions.remove(&simulation_id) {
            previous.close();
        }
        match open(
            Arc::clone(&self.ctx),
            Arc::clone(&self.transport),
            &self.endpoint,
            simulation_id,
            config,
            handlers,
        ) {
            Some(handle) => {
                self.sessions.insert(simulation_id, handle);
                true
            }
            None => false,
        }
    }

    pub fn handle(&self, simulation_id: u64) -> Option<&LiveHandle> {
        self.sessions.get(&simulation_id)
    }

    /// Closes the session for a simulation, if any.
    pub fn close(&mut self, simulation_id: u64) {
        self.sessions.remove(&simulation_id);
    }

    /// Closes every session.
    pub fn close_all(&mut self) {
        self.sessions.clear();
    }
}

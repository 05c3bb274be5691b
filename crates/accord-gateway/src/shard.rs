//! The gateway session state machine.
//!
//! A [`Shard`] owns one logical gateway session and drives it across
//! physical connections:
//!
//! ```text
//! Disconnected → Connecting → AwaitingHello → Identifying | Resuming
//!      ▲                                              │
//!      │ cancel / fatal                               ▼
//!      └──────────── Reconnecting ◄──────────── Connected
//! ```
//!
//! Per connection, three tasks cooperate: the event loop (this module,
//! owns the read half and the session), the heartbeat task (shares the
//! [`HeartbeatState`] and the sequence counter), and a writer task that
//! owns the write half and drains an `mpsc` queue. Dispatches reach the
//! consumer in socket order over a bounded channel; the sequence used
//! for resuming advances only once a dispatch has been handed over.

use std::sync::Arc;
use std::time::{Duration, Instant};

use accord_ratelimit::{Method, RateLimitError, RestClient};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::{Backoff, random_between};
use crate::close_code::{self, CloseAction};
use crate::config::ShardConfig;
use crate::connection::{Connection, Frame, FrameSink, FrameStream, Transport};
use crate::error::{GatewayError, GatewayResult};
use crate::heartbeat::{self, HeartbeatState, HeartbeatTask};
use crate::protocol::{
    self, DispatchEvent, GatewayBotResponse, GatewayCommand, GatewayEvent, Hello, Identify,
    PresenceUpdate, RequestGuildMembers, Resume, VoiceStateUpdate,
};
use crate::session::SessionState;

/// How long the writer gets to flush after the event loop exits.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Outbound frame queue capacity.
const OUTBOUND_BUFFER: usize = 64;

/// User command queue capacity.
const COMMAND_BUFFER: usize = 32;

/// Close code for a normal close; Discord ends the session.
const CLOSE_NORMAL: u16 = 1000;

/// Close code that leaves the session resumable.
const CLOSE_RESUMABLE: u16 = 4000;

// ── Public types ─────────────────────────────────────────────

/// Observable shard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Not running, or stopped.
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open, waiting for Hello.
    AwaitingHello,
    /// Identify sent, waiting for `READY`.
    Identifying,
    /// Resume sent, waiting for `RESUMED` or a replayed dispatch.
    Resuming,
    /// Steady state.
    Connected,
    /// Waiting before the next connection.
    Reconnecting,
}

/// A dispatch delivered to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Sequence number.
    pub sequence: u64,
    /// Event name (`t`).
    pub name: String,
    /// Event data (`d`).
    pub data: serde_json::Value,
}

/// Cloneable handle for sending commands over a running shard.
///
/// Commands queue while the shard is between connections and are sent
/// once it is connected again.
#[derive(Debug, Clone)]
pub struct ShardSender {
    tx: mpsc::Sender<GatewayCommand>,
}

impl ShardSender {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Protocol`] for Heartbeat, Identify and
    /// Resume, which the shard sends itself, and
    /// [`GatewayError::Shutdown`] if the shard is gone.
    pub async fn send(&self, command: GatewayCommand) -> GatewayResult<()> {
        if command.is_lifecycle() {
            return Err(GatewayError::Protocol(format!(
                "opcode {} is managed by the shard",
                command.op()
            )));
        }
        self.tx
            .send(command)
            .await
            .map_err(|_| GatewayError::Shutdown)
    }

    /// Update the bot's presence.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn update_presence(&self, presence: PresenceUpdate) -> GatewayResult<()> {
        self.send(GatewayCommand::PresenceUpdate(presence)).await
    }

    /// Join, move or leave a voice channel.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn update_voice_state(&self, update: VoiceStateUpdate) -> GatewayResult<()> {
        self.send(GatewayCommand::VoiceStateUpdate(update)).await
    }

    /// Request guild member chunks.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn request_guild_members(&self, request: RequestGuildMembers) -> GatewayResult<()> {
        self.send(GatewayCommand::RequestGuildMembers(request)).await
    }
}

/// What the outer reconnection loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopAction {
    /// Stop and return `Ok(())`.
    Shutdown,
    /// Reconnect, resuming if possible.
    Resume,
    /// Reconnect with a new session.
    Reidentify,
    /// Server invalidated the session.
    InvalidSession { resumable: bool },
}

impl LoopAction {
    /// Close code to send when leaving a connection for this action.
    fn close_code(self) -> u16 {
        match self {
            Self::Resume | Self::InvalidSession { resumable: true } => CLOSE_RESUMABLE,
            Self::Shutdown | Self::Reidentify | Self::InvalidSession { resumable: false } => {
                CLOSE_NORMAL
            },
        }
    }
}

// ── Shard ────────────────────────────────────────────────────

/// One gateway shard.
pub struct Shard {
    config: ShardConfig,
    transport: Arc<dyn Transport>,
    http: reqwest::Client,
    rest: Option<RestClient>,
    session: SessionState,
    state: watch::Sender<ShardState>,
    events: mpsc::Sender<Event>,
    commands: mpsc::Receiver<GatewayCommand>,
    command_tx: mpsc::Sender<GatewayCommand>,
    cancel: CancellationToken,
    backoff: Backoff,
    discovered_url: Option<String>,
    connect_failures: u32,
    protocol_errors: u32,
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("shard", &self.config.shard())
            .field("state", &*self.state.borrow())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Shard {
    /// Create a shard. Does not connect yet.
    ///
    /// Returns the shard and the receiver for its dispatches. Cancelling
    /// `cancel` closes the connection and makes [`run`](Self::run)
    /// return `Ok(())`.
    #[must_use]
    pub fn new(
        config: ShardConfig,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (events, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (state, _) = watch::channel(ShardState::Disconnected);
        let backoff = Backoff::new(config.backoff_base, config.backoff_max);
        let shard = Self {
            config,
            transport,
            http: reqwest::Client::new(),
            rest: None,
            session: SessionState::new(),
            state,
            events,
            commands,
            command_tx,
            cancel,
            backoff,
            discovered_url: None,
            connect_failures: 0,
            protocol_errors: 0,
        };
        (shard, events_rx)
    }

    /// Use a specific HTTP client for gateway discovery.
    ///
    /// Ignored once a [`RestClient`] is set.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Send gateway discovery through a rate-limited REST client, so it
    /// shares buckets with every other call made with the same token.
    #[must_use]
    pub fn with_rest_client(mut self, rest: RestClient) -> Self {
        self.rest = Some(rest);
        self
    }

    /// A handle for sending commands.
    #[must_use]
    pub fn sender(&self) -> ShardSender {
        ShardSender {
            tx: self.command_tx.clone(),
        }
    }

    /// Watch the shard state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ShardState> {
        self.state.subscribe()
    }

    /// The session carried across connections.
    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Run the shard until cancelled or a fatal error.
    ///
    /// Reconnects, resumes and re-identifies internally.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`GatewayError`]: authentication failure, invalid
    /// or disallowed intents, invalid shard, sharding required, invalid
    /// API version, repeated connect failures or repeated protocol
    /// errors.
    pub async fn run(&mut self) -> GatewayResult<()> {
        let result = self.run_loop().await;
        self.set_state(ShardState::Disconnected);
        match result {
            Ok(()) | Err(GatewayError::Shutdown) => {
                info!(shard = ?self.config.shard(), "Shard stopped");
                Ok(())
            },
            Err(e) => {
                error!(error = %e, "Fatal Gateway error");
                Err(e)
            },
        }
    }

    async fn run_loop(&mut self) -> GatewayResult<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(GatewayError::Shutdown);
            }

            let action = match self.connect_and_run().await {
                Ok(action) => action,
                Err(e) => self.handle_connection_error(e)?,
            };
            self.handle_loop_action(action).await?;
        }
    }

    /// Decide how long to wait, and with which session, before the next
    /// connection.
    async fn handle_loop_action(&mut self, action: LoopAction) -> GatewayResult<()> {
        let delay = match action {
            LoopAction::Shutdown => return Err(GatewayError::Shutdown),
            LoopAction::Resume => self.backoff.next_delay(),
            LoopAction::Reidentify => {
                self.session.clear();
                self.backoff.next_delay()
            },
            LoopAction::InvalidSession { resumable } => {
                if !resumable {
                    self.session.clear();
                }
                random_between(
                    self.config.invalid_session_delay_min,
                    self.config.invalid_session_delay_max,
                )
            },
        };

        self.set_state(ShardState::Reconnecting);
        info!(
            delay_ms = delay.as_millis(),
            attempt = self.backoff.attempt(),
            resume = self.session.can_resume(),
            "Reconnecting after delay"
        );
        self.sleep_or_shutdown(delay).await
    }

    /// Classify an error from a connection attempt.
    fn handle_connection_error(&mut self, err: GatewayError) -> GatewayResult<LoopAction> {
        if err.is_fatal() || matches!(err, GatewayError::Shutdown) {
            return Err(err);
        }
        if err.is_protocol() {
            self.protocol_error(&err)?;
            return Ok(LoopAction::Resume);
        }
        if let GatewayError::Closed(code) = err
            && close_code::classify(code) == CloseAction::Reidentify
        {
            info!(code, "Closed before Hello, starting a new session");
            return Ok(LoopAction::Reidentify);
        }

        self.connect_failures = self.connect_failures.saturating_add(1);
        if self.connect_failures >= self.config.max_connect_attempts {
            return Err(GatewayError::ConnectFailed {
                attempts: self.connect_failures,
                last_error: err.to_string(),
            });
        }
        warn!(
            error = %err,
            failures = self.connect_failures,
            "Gateway connection error"
        );
        Ok(LoopAction::Resume)
    }

    /// Count a protocol error; fatal once past the bound.
    fn protocol_error(&mut self, err: &GatewayError) -> GatewayResult<()> {
        self.protocol_errors = self.protocol_errors.saturating_add(1);
        warn!(error = %err, count = self.protocol_errors, "Gateway protocol error");
        if self.protocol_errors > self.config.max_protocol_errors {
            return Err(GatewayError::TooManyProtocolErrors(self.protocol_errors));
        }
        Ok(())
    }

    /// One physical connection: connect, Hello, authenticate, event loop.
    async fn connect_and_run(&mut self) -> GatewayResult<LoopAction> {
        if self.session.can_resume()
            && self.session.resume_attempts() >= self.config.max_resume_attempts
        {
            warn!(
                attempts = self.session.resume_attempts(),
                "Resume attempts exhausted, starting a new session"
            );
            self.session.clear();
        }
        let resuming = self.session.can_resume();
        let url = self.gateway_url(resuming).await?;

        self.set_state(ShardState::Connecting);
        info!(url = %url, resuming, shard = ?self.config.shard(), "Connecting to Discord Gateway");
        let Connection { mut sink, mut stream } = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(LoopAction::Shutdown),
            result = self.transport.connect(&url) => result?,
        };

        self.set_state(ShardState::AwaitingHello);
        let hello = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                let _ = sink.send(Frame::close(CLOSE_NORMAL)).await;
                return Ok(LoopAction::Shutdown);
            }
            result = wait_for_hello(stream.as_mut(), self.config.hello_timeout) => result?,
        };
        self.connect_failures = 0;
        debug!(interval_ms = hello.heartbeat_interval, "Received Hello");

        let heartbeat = Arc::new(HeartbeatState::new(
            Duration::from_millis(hello.heartbeat_interval),
            self.config.heartbeat_tolerance,
        ));
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(OUTBOUND_BUFFER);
        let mut writer = spawn_writer(sink, outbound_rx);
        let connection_cancel = self.cancel.child_token();
        let (zombie_tx, zombie_rx) = oneshot::channel();
        let heartbeat_handle = tokio::spawn(heartbeat::run_heartbeat(HeartbeatTask {
            state: Arc::clone(&heartbeat),
            sequence: Arc::clone(self.session.sequence()),
            outbound: outbound_tx.clone(),
            zombie: zombie_tx,
            cancel: connection_cancel.clone(),
        }));

        let action = match self.authenticate(&outbound_tx, resuming).await {
            Ok(()) => {
                self.event_loop(stream.as_mut(), &outbound_tx, &heartbeat, zombie_rx, resuming)
                    .await
            },
            Err(e) => Err(e),
        };

        connection_cancel.cancel();
        heartbeat_handle.abort();

        if let Ok(action) = &action {
            let _ = outbound_tx.send(Frame::close(action.close_code())).await;
        }
        drop(outbound_tx);
        if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }

        action
    }

    /// Send Identify, or Resume if a session can be resumed.
    async fn authenticate(
        &mut self,
        outbound: &mpsc::Sender<Frame>,
        resuming: bool,
    ) -> GatewayResult<()> {
        let resume = if resuming {
            self.session.resume_info()
        } else {
            None
        };
        let command = match resume {
            Some((session_id, seq)) => {
                self.session.record_resume_attempt();
                self.set_state(ShardState::Resuming);
                info!(
                    session_id = %session_id,
                    seq,
                    attempt = self.session.resume_attempts(),
                    "Resuming session"
                );
                GatewayCommand::Resume(Resume {
                    token: self.config.token.clone(),
                    session_id,
                    seq,
                })
            },
            None => {
                self.set_state(ShardState::Identifying);
                info!(shard = ?self.config.shard(), intents = self.config.intents.bits(), "Identifying");
                GatewayCommand::Identify(Box::new(self.identify_payload()))
            },
        };
        let text = command.encode()?;
        outbound
            .send(Frame::Text(text))
            .await
            .map_err(|_| GatewayError::Transport("writer closed before authentication".into()))
    }

    fn identify_payload(&self) -> Identify {
        Identify {
            token: self.config.token.clone(),
            intents: self.config.intents,
            properties: self.config.properties.clone(),
            shard: Some(self.config.shard()),
            large_threshold: self.config.large_threshold,
            presence: self.config.presence.clone(),
        }
    }

    /// Read frames until the connection should be left.
    async fn event_loop(
        &mut self,
        stream: &mut dyn FrameStream,
        outbound: &mpsc::Sender<Frame>,
        heartbeat: &HeartbeatState,
        mut zombie: oneshot::Receiver<()>,
        resuming: bool,
    ) -> GatewayResult<LoopAction> {
        let mut connected = false;
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    info!("Shard received shutdown signal");
                    return Ok(LoopAction::Shutdown);
                }

                signal = &mut zombie => {
                    if signal.is_ok() {
                        warn!("Zombie connection detected, reconnecting");
                    } else {
                        debug!("Heartbeat task ended, reconnecting");
                    }
                    return Ok(LoopAction::Resume);
                }

                Some(command) = self.commands.recv(), if connected => {
                    forward_command(&command, outbound).await;
                }

                frame = stream.recv() => {
                    let action = match frame {
                        Some(Ok(Frame::Text(text))) => {
                            self.handle_text(&text, outbound, heartbeat, resuming, &mut connected)
                                .await?
                        },
                        Some(Ok(Frame::Close { code, reason })) => {
                            Some(handle_close_code(code, &reason)?)
                        },
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket read error");
                            Some(LoopAction::Resume)
                        },
                        None => {
                            warn!("WebSocket stream ended");
                            Some(LoopAction::Resume)
                        },
                    };
                    if let Some(action) = action {
                        return Ok(action);
                    }
                }
            }
        }
    }

    /// Handle one text frame. Returns `Some` to leave the connection.
    async fn handle_text(
        &mut self,
        text: &str,
        outbound: &mpsc::Sender<Frame>,
        heartbeat: &HeartbeatState,
        resuming: bool,
        connected: &mut bool,
    ) -> GatewayResult<Option<LoopAction>> {
        let event = match protocol::decode(text.as_bytes()) {
            Ok(event) => event,
            Err(e) => {
                self.protocol_error(&GatewayError::Decode(e))?;
                return Ok(Some(LoopAction::Resume));
            },
        };

        match event {
            GatewayEvent::Dispatch { sequence, event } => {
                self.handle_dispatch(sequence, event, resuming, connected)
                    .await
            },
            GatewayEvent::Heartbeat => {
                trace!("Server requested heartbeat");
                if heartbeat::send_heartbeat(heartbeat, self.session.sequence(), outbound).await {
                    Ok(None)
                } else {
                    Ok(Some(LoopAction::Resume))
                }
            },
            GatewayEvent::HeartbeatAck => {
                heartbeat.record_acknowledged(Instant::now());
                trace!(
                    latency_ms = ?heartbeat.latency().map(|d| d.as_millis()),
                    "Heartbeat ACK received"
                );
                Ok(None)
            },
            GatewayEvent::Reconnect => {
                info!("Server requested reconnect (op=7)");
                Ok(Some(LoopAction::Resume))
            },
            GatewayEvent::InvalidSession { resumable } => {
                info!(resumable, "Invalid session (op=9)");
                Ok(Some(LoopAction::InvalidSession { resumable }))
            },
            GatewayEvent::Hello(_) => {
                self.protocol_error(&GatewayError::Protocol("unexpected Hello mid-session".into()))?;
                Ok(Some(LoopAction::Resume))
            },
        }
    }

    /// Handle a dispatch and deliver it downstream.
    async fn handle_dispatch(
        &mut self,
        sequence: u64,
        event: DispatchEvent,
        resuming: bool,
        connected: &mut bool,
    ) -> GatewayResult<Option<LoopAction>> {
        match &event {
            DispatchEvent::Ready(ready) => {
                info!(
                    session_id = %ready.session_id,
                    user_id = %ready.user.id,
                    "Gateway session established (READY)"
                );
                self.session.clear();
                self.session
                    .establish(ready.session_id.clone(), &ready.resume_gateway_url);
                self.mark_connected(connected);
            },
            DispatchEvent::Resumed => {
                info!(seq = sequence, "Gateway session resumed");
                self.session.resume_succeeded();
                self.mark_connected(connected);
            },
            DispatchEvent::Other { .. } => {
                if resuming && !*connected {
                    debug!(seq = sequence, "Replayed dispatch after resume");
                    self.session.resume_succeeded();
                    self.mark_connected(connected);
                }
            },
        }

        let (name, data) = event.into_parts();
        trace!(event = %name, seq = sequence, "Dispatch");
        let delivery = Event {
            sequence,
            name,
            data,
        };
        let delivered = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(Some(LoopAction::Shutdown)),
            result = self.events.send(delivery) => result.is_ok(),
        };
        if !delivered {
            trace!(seq = sequence, "Event receiver dropped");
        }
        if !self.session.sequence().advance(sequence) {
            debug!(seq = sequence, current = ?self.session.sequence().get(), "Sequence did not advance");
        }
        Ok(None)
    }

    fn mark_connected(&mut self, connected: &mut bool) {
        *connected = true;
        self.backoff.reset();
        self.protocol_errors = 0;
        self.set_state(ShardState::Connected);
    }

    /// The URL for the next connection.
    async fn gateway_url(&mut self, resuming: bool) -> GatewayResult<String> {
        if resuming && let Some(url) = self.session.resume_url() {
            return Ok(protocol::with_gateway_query(url));
        }
        if let Some(url) = &self.config.gateway_url {
            return Ok(protocol::with_gateway_query(url));
        }
        if let Some(url) = &self.discovered_url {
            return Ok(protocol::with_gateway_query(url));
        }
        let url = self.fetch_gateway_url().await?;
        let full = protocol::with_gateway_query(&url);
        self.discovered_url = Some(url);
        Ok(full)
    }

    /// Discover the gateway URL through `GET /gateway/bot`.
    async fn fetch_gateway_url(&self) -> GatewayResult<String> {
        let body = match &self.rest {
            Some(rest) => fetch_through_policy(rest).await?,
            None => self.fetch_direct().await?,
        };
        if let Some(recommended) = body.shards
            && recommended > self.config.shard_count
        {
            warn!(
                recommended,
                configured = self.config.shard_count,
                "Discord recommends more shards than configured"
            );
        }
        Ok(body.url)
    }

    async fn fetch_direct(&self) -> GatewayResult<GatewayBotResponse> {
        let url = format!("{}/gateway/bot", self.config.api_base.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .header("Authorization", format!("Bot {}", self.config.token))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GatewayError::AuthenticationFailed);
        }
        Ok(resp.error_for_status()?.json().await?)
    }

    fn set_state(&self, state: ShardState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Shard state changed");
        }
    }

    /// Sleep, or return [`GatewayError::Shutdown`] on cancellation.
    async fn sleep_or_shutdown(&self, duration: Duration) -> GatewayResult<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(GatewayError::Shutdown),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Classify a close frame received mid-session.
fn handle_close_code(code: u16, reason: &str) -> GatewayResult<LoopAction> {
    match close_code::classify(code) {
        CloseAction::Fatal => {
            error!(code, reason, "Fatal close code");
            Err(GatewayError::from_close_code(code))
        },
        CloseAction::Reidentify => {
            info!(code, reason, "Close code requires a new session");
            Ok(LoopAction::Reidentify)
        },
        CloseAction::Resume => {
            warn!(code, reason, "Connection closed, will resume");
            Ok(LoopAction::Resume)
        },
    }
}

/// `GET /gateway/bot` through the rate limiter. A rejected token is fatal.
async fn fetch_through_policy(rest: &RestClient) -> GatewayResult<GatewayBotResponse> {
    match rest
        .send::<GatewayBotResponse>(Method::GET, "/gateway/bot", None)
        .await
    {
        Ok(body) => Ok(body),
        Err(RateLimitError::Api { status: 401, .. }) => Err(GatewayError::AuthenticationFailed),
        Err(e) => Err(e.into()),
    }
}

/// Wait for Hello, which must be the first text frame.
async fn wait_for_hello(stream: &mut dyn FrameStream, timeout: Duration) -> GatewayResult<Hello> {
    let hello = async {
        match stream.recv().await {
            Some(Ok(Frame::Text(text))) => match protocol::decode(text.as_bytes())? {
                GatewayEvent::Hello(hello) => Ok(hello),
                _ => Err(GatewayError::Protocol(
                    "expected Hello as the first frame".into(),
                )),
            },
            Some(Ok(Frame::Close { code, .. })) => {
                if close_code::classify(code) == CloseAction::Fatal {
                    Err(GatewayError::from_close_code(code))
                } else {
                    Err(GatewayError::Closed(code))
                }
            },
            Some(Err(e)) => Err(e),
            None => Err(GatewayError::Transport(
                "connection closed before Hello".into(),
            )),
        }
    };

    tokio::time::timeout(timeout, hello)
        .await
        .map_err(|_| GatewayError::HelloTimeout)?
}

/// Encode a user command onto the outbound queue.
async fn forward_command(command: &GatewayCommand, outbound: &mpsc::Sender<Frame>) {
    match command.encode() {
        Ok(text) => {
            debug!(op = command.op(), "Sending command");
            if outbound.send(Frame::Text(text)).await.is_err() {
                debug!(op = command.op(), "Writer closed, command dropped");
            }
        },
        Err(e) => warn!(error = %e, op = command.op(), "Failed to encode command"),
    }
}

/// Spawn the writer task. It exits after sending a close frame, on a
/// send error, or when every sender is gone.
fn spawn_writer(mut sink: Box<dyn FrameSink>, mut outbound: mpsc::Receiver<Frame>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let closing = matches!(frame, Frame::Close { .. });
            if let Err(e) = sink.send(frame).await {
                debug!(error = %e, "Writer task: send failed");
                break;
            }
            if closing {
                break;
            }
        }
    })
}

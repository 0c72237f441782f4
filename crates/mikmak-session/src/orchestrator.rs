//! The session orchestrator: drives the handshake over real connections.
//!
//! [`MikmakClient::connect`] owns the connection lifecycle:
//!
//! ```text
//!            ┌────────────── PendingSwitch (no delay, no retry) ─────────┐
//!            ▼                                                            │
//! dial ──→ run receive loop ──→ on_disconnect ──┬─ switch pending ───────┘
//!  ▲                                            ├─ stopped ──→ return SessionEnd
//!  │                                            └─ unexpected:
//!  │                                                 retries left? ──no──→ return
//!  └──────────── sleep(reconnection_delay) ◀─────────yes
//! ```
//!
//! Message handling is delegated to the pure [`handshake::step`]
//! function; this module applies what it returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mikmak_protocol::ServerDescriptor;
use mikmak_transport::{
    CloseHandle, ConnectionHandler, ConnectionTarget, DisconnectReason, Flow, MessageSink,
    TcpTransport,
};
use tokio::sync::Notify;

use crate::events::{EventBus, SessionEvent};
use crate::handshake::{self, Directive, HandshakeContext, Phase, Step};
use crate::state::SessionState;
use crate::{ClientBuilder, ClientConfig, SessionError};

/// Why [`MikmakClient::connect`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// [`ShutdownHandle::disconnect`] was called.
    Shutdown,
    /// The server list had no server matching `server_to_join`, or no
    /// server was wanted.
    ServerNotFound,
    /// The connection kept dropping and every retry was used.
    RetriesExhausted,
}

// ---------------------------------------------------------------------------
// ShutdownHandle
// ---------------------------------------------------------------------------

/// Stops a running session from another task.
///
/// Clears the running flag, closes the live connection, and interrupts a
/// pending reconnection delay. No reconnect follows. A disconnect issued
/// before [`MikmakClient::connect`] makes that call return
/// [`SessionEnd::Shutdown`] without dialing.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    /// Set by `disconnect`, cleared when the session it stopped ends.
    requested: Arc<AtomicBool>,
    live: Arc<Mutex<Option<CloseHandle>>>,
    wake: Arc<Notify>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            requested: Arc::new(AtomicBool::new(false)),
            live: Arc::new(Mutex::new(None)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn disconnect(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        if let Some(close) = self.live().take() {
            close.close();
        }
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Marks the session running. Returns `false` if a disconnect was
    /// already requested.
    fn start(&self) -> bool {
        self.running.store(true, Ordering::SeqCst);
        if self.requested.swap(false, Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Stops without touching the connection; the caller ends it.
    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.requested.store(false, Ordering::SeqCst);
    }

    fn attach(&self, close: CloseHandle) {
        *self.live() = Some(close.clone());
        // A disconnect between dial and attach would otherwise be missed.
        if !self.is_running() {
            close.close();
        }
    }

    fn detach(&self) {
        self.live().take();
    }

    /// Sleeps for `delay` unless a disconnect comes first.
    async fn sleep(&self, delay: Duration) {
        let deadline = tokio::time::Instant::now() + delay;
        while self.is_running() {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = self.wake.notified() => {}
            }
        }
    }

    fn live(&self) -> std::sync::MutexGuard<'_, Option<CloseHandle>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// MikmakClient
// ---------------------------------------------------------------------------

/// A client session: login, server switch, and reconnection.
///
/// Register subscribers through [`events`](Self::events) before calling
/// [`connect`](Self::connect).
#[derive(Debug)]
pub struct MikmakClient {
    config: ClientConfig,
    state: SessionState,
    events: EventBus,
    phase: Phase,
    first_connection: bool,
    /// The server picked from the list; reconnects go here.
    selected: Option<ServerDescriptor>,
    /// Set when the current connection is being closed to switch servers.
    pending_switch: Option<ConnectionTarget>,
    retries: u32,
    end: Option<SessionEnd>,
    shutdown: ShutdownHandle,
}

impl MikmakClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: SessionState::default(),
            events: EventBus::new(),
            phase: Phase::Stopped,
            first_connection: true,
            selected: None,
            pending_switch: None,
            retries: 0,
            end: None,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn builder(username: impl Into<String>, password: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(username, password)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Reconnection attempts used since the last `connect()`.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn selected_server(&self) -> Option<&ServerDescriptor> {
        self.selected.as_ref()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Same as [`ShutdownHandle::disconnect`].
    pub fn disconnect(&self) {
        self.shutdown.disconnect();
    }

    /// Runs the session until it stops.
    ///
    /// Starts at the bootstrap address with a fresh retry budget. Returns
    /// once the session is shut down, has nowhere to go, or has used up
    /// its retries. Nothing is published to subscribers when it stops.
    pub async fn connect(&mut self) -> Result<SessionEnd, SessionError> {
        self.config.validate()?;

        self.retries = 0;
        self.first_connection = true;
        self.selected = None;
        self.pending_switch = None;
        self.end = None;

        if !self.shutdown.start() {
            tracing::info!("disconnect requested before connect");
            return Ok(self.finish());
        }

        let transport = TcpTransport::new(self.config.transport());
        let mut target = self.config.bootstrap_target();

        loop {
            if !self.shutdown.is_running() {
                return Ok(self.finish());
            }

            self.set_phase(Phase::Connecting);
            tracing::info!(%target, "connecting");
            match transport.connect(&target, &mut *self).await {
                Ok(conn) => {
                    self.shutdown.attach(conn.close_handle());
                    conn.run(&mut *self).await;
                    self.shutdown.detach();
                }
                Err(e) => tracing::warn!(error = %e, "connection failed"),
            }

            if let Some(next) = self.pending_switch.take() {
                self.set_phase(Phase::Reconnecting);
                target = next;
                continue;
            }
            if !self.shutdown.is_running() {
                return Ok(self.finish());
            }

            if self.retries >= self.config.max_retries {
                tracing::info!(retries = self.retries, "reconnection attempts exhausted");
                self.end = Some(SessionEnd::RetriesExhausted);
                return Ok(self.finish());
            }
            self.retries += 1;
            self.set_phase(Phase::Reconnecting);
            tracing::info!(
                attempt = self.retries,
                max = self.config.max_retries,
                delay = ?self.config.reconnection_delay,
                "disconnected, reconnecting"
            );
            self.shutdown.sleep(self.config.reconnection_delay).await;
            target = self.reconnect_target();
        }
    }

    fn reconnect_target(&self) -> ConnectionTarget {
        match &self.selected {
            Some(server) if !self.first_connection => {
                ConnectionTarget::new(server.ip.clone(), server.port)
            }
            _ => self.config.bootstrap_target(),
        }
    }

    fn finish(&mut self) -> SessionEnd {
        self.shutdown.stop();
        self.set_phase(Phase::Stopped);
        let end = self.end.take().unwrap_or(SessionEnd::Shutdown);
        tracing::info!(?end, "session stopped");
        end
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = %self.phase, to = %phase, "phase");
            self.phase = phase;
        }
    }

    /// Applies a step's patch, events and phase; returns what to send.
    fn apply(&mut self, step: Step) -> (Vec<String>, Option<Directive>) {
        self.state.apply(step.patch);
        if let Some(phase) = step.phase {
            self.set_phase(phase);
        }
        for event in &step.events {
            self.events.publish(event);
        }
        (step.outgoing, step.directive)
    }

    fn follow(&mut self, directive: Directive) -> Flow {
        match directive {
            Directive::SwitchServer(server) => {
                let target = ConnectionTarget::new(server.ip.clone(), server.port);
                tracing::info!(server = %server.name, %target, "switching server");
                self.first_connection = false;
                self.selected = Some(server);
                self.pending_switch = Some(target);
            }
            Directive::Terminate => {
                let available: Vec<&str> = self
                    .state
                    .server_list
                    .iter()
                    .flatten()
                    .map(|server| server.name.as_str())
                    .collect();
                tracing::info!(
                    wanted = ?self.config.server_to_join,
                    ?available,
                    "no server to join, disconnecting"
                );
                self.end = Some(SessionEnd::ServerNotFound);
                self.shutdown.stop();
            }
        }
        Flow::Close
    }
}

impl ConnectionHandler for MikmakClient {
    type Error = SessionError;

    async fn on_connect<S: MessageSink>(&mut self, sink: &mut S) {
        let (outgoing, _) = self.apply(handshake::on_connect());
        for message in &outgoing {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    }

    async fn on_message<S: MessageSink>(
        &mut self,
        sink: &mut S,
        message: &str,
    ) -> Result<Flow, SessionError> {
        let step = {
            let ctx = HandshakeContext {
                username: &self.config.username,
                password: &self.config.password,
                first_connection: self.first_connection,
                server_to_join: self.config.server_to_join.as_deref(),
                clean_ingame: self.config.clean_ingame,
            };
            handshake::step(&self.state, &ctx, message)
        };
        let (outgoing, directive) = self.apply(step);

        let mut failed = None;
        for out in &outgoing {
            if let Err(e) = sink.send(out).await {
                failed = Some(e);
                break;
            }
        }

        self.events
            .publish(&SessionEvent::Message(message.to_string()));

        let flow = directive.map_or(Flow::Continue, |d| self.follow(d));
        match failed {
            Some(e) if flow == Flow::Continue => Err(e.into()),
            _ => Ok(flow),
        }
    }

    async fn on_disconnect(&mut self, reason: &DisconnectReason) {
        if reason.is_unexpected() {
            tracing::info!(%reason, phase = %self.phase, "connection lost");
        } else {
            tracing::debug!(%reason, phase = %self.phase, "connection closed");
        }
    }
}

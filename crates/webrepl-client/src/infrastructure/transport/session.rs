//! An authenticated WebREPL session.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──socket open──▶ AuthPending
//!       ▲                                                     │
//!       │                                        password accepted
//!       │                                                     ▼
//!       └──────────── any I/O error, close() ────────────── Ready
//! ```
//!
//! # Channel mode
//!
//! While `Ready`, the session also tracks whether the last exchange was text
//! or binary.  Before a binary exchange, and when going back to text after
//! one, the session discards whatever the device left queued on the socket.
//! See [`ChannelMode::requires_drain`].
//!
//! A session is owned by exactly one caller and every operation takes
//! `&mut self`; there is no internal locking.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrepl_core::protocol::repl;
use webrepl_core::{ChannelMode, DeviceEndpoint};

use super::link::{Connector, DeviceLink, LinkError};
use crate::error::DeviceError;

/// Upper bound on messages discarded by one drain, so a chatty device
/// cannot keep a drain running forever.
const MAX_DRAIN_MESSAGES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AuthPending,
    Ready,
}

/// Per-operation time limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTimeouts {
    /// TCP connect plus WebSocket upgrade.
    pub connect: Duration,
    /// Best-effort wait for the `Password:` greeting.
    pub greeting: Duration,
    /// Wait for `WebREPL connected` after sending the password.
    pub auth: Duration,
    /// Quiet period that ends a drain.
    pub drain: Duration,
    /// Quiet period that ends the drain after Ctrl-C.
    pub interrupt_drain: Duration,
    /// Wait for a pong.
    pub ping: Duration,
    /// Wait for each read while collecting command output.
    pub poll: Duration,
    /// Wait for each read of a transfer acknowledgement or payload.
    pub ack: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            greeting: Duration::from_millis(500),
            auth: Duration::from_secs(2),
            drain: Duration::from_millis(200),
            interrupt_drain: Duration::from_millis(500),
            ping: Duration::from_secs(2),
            poll: Duration::from_millis(100),
            ack: Duration::from_secs(2),
        }
    }
}

impl SessionTimeouts {
    /// Tighter limits for discovery probes: a full handshake stays under
    /// about five seconds.
    pub fn probe() -> Self {
        Self {
            connect: Duration::from_secs(3),
            greeting: Duration::from_millis(300),
            auth: Duration::from_millis(1500),
            ..Self::default()
        }
    }
}

pub struct Session {
    id: Uuid,
    endpoint: DeviceEndpoint,
    connector: Arc<dyn Connector>,
    link: Option<Box<dyn DeviceLink>>,
    state: SessionState,
    mode: ChannelMode,
    timeouts: SessionTimeouts,
}

impl Session {
    /// Creates a disconnected session.  Call [`Session::connect`] next.
    pub fn new(endpoint: DeviceEndpoint, connector: Arc<dyn Connector>) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint,
            connector,
            link: None,
            state: SessionState::Disconnected,
            mode: ChannelMode::Text,
            timeouts: SessionTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Creates and connects a session in one step.
    ///
    /// # Errors
    ///
    /// See [`Session::connect`].
    pub async fn open(
        endpoint: DeviceEndpoint,
        connector: Arc<dyn Connector>,
        timeouts: SessionTimeouts,
    ) -> Result<Self, DeviceError> {
        let mut session = Self::new(endpoint, connector).with_timeouts(timeouts);
        session.connect().await?;
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::clone(&self.connector)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn timeouts(&self) -> &SessionTimeouts {
        &self.timeouts
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready && self.link.is_some()
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Opens the socket and logs in.
    ///
    /// The greeting is optional: some firmware builds send `Password:` late
    /// or not at all, so its absence is not an error.  The password is
    /// always sent and the reply must contain `WebREPL connected` or the
    /// prompt within the auth timeout.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::Connectivity`] when the socket cannot be opened or
    ///   dies during the handshake.
    /// - [`DeviceError::Authentication`] when the password is not accepted
    ///   in time.  The socket is closed before returning.
    pub async fn connect(&mut self) -> Result<(), DeviceError> {
        self.close().await;
        self.state = SessionState::Connecting;
        info!(session = %self.id, "connecting to {}", self.endpoint);

        let mut link = match self
            .connector
            .open(&self.endpoint, self.timeouts.connect)
            .await
        {
            Ok(link) => link,
            Err(e) => {
                self.state = SessionState::Disconnected;
                debug!(session = %self.id, "connect failed: {e}");
                return Err(e);
            }
        };
        self.state = SessionState::AuthPending;

        match link.recv(self.timeouts.greeting).await {
            Ok(Some(greeting)) => {
                let prompted = String::from_utf8_lossy(&greeting).contains(repl::PASSWORD_PROMPT);
                debug!(session = %self.id, prompted, "greeting received");
            }
            Ok(None) => debug!(session = %self.id, "no greeting; sending password anyway"),
            Err(e) => return Err(self.abort_handshake(link, e).await),
        }

        if let Err(e) = link
            .send_text(&repl::command_line(&self.endpoint.password))
            .await
        {
            return Err(self.abort_handshake(link, e).await);
        }

        let deadline = Instant::now() + self.timeouts.auth;
        let mut reply = String::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match link.recv(remaining).await {
                Ok(Some(bytes)) => {
                    reply.push_str(&String::from_utf8_lossy(&bytes));
                    if repl::is_auth_accepted(&reply) {
                        self.link = Some(link);
                        self.state = SessionState::Ready;
                        self.mode = ChannelMode::Text;
                        // The prompt often trails the banner in a frame of its own.
                        let window = self.timeouts.drain;
                        self.drain(window).await?;
                        info!(session = %self.id, "authenticated with {}", self.endpoint);
                        return Ok(());
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(self.abort_handshake(link, e).await),
            }
        }

        warn!(session = %self.id, "password rejected by {}", self.endpoint);
        let _ = link.close().await;
        self.state = SessionState::Disconnected;
        Err(DeviceError::Authentication {
            endpoint: self.endpoint.addr(),
        })
    }

    async fn abort_handshake(
        &mut self,
        mut link: Box<dyn DeviceLink>,
        e: LinkError,
    ) -> DeviceError {
        let _ = link.close().await;
        self.state = SessionState::Disconnected;
        DeviceError::Connectivity {
            endpoint: self.endpoint.addr(),
            reason: format!("handshake: {e}"),
        }
    }

    /// Sends Ctrl-C to stop the board's main program and discards the echo.
    ///
    /// Passive sessions (log following) skip this so the running program
    /// keeps printing.
    ///
    /// # Errors
    ///
    /// [`DeviceError::NotConnected`] or [`DeviceError::Connectivity`].
    pub async fn interrupt_running_program(&mut self) -> Result<(), DeviceError> {
        let interrupt = char::from(repl::INTERRUPT).to_string();
        self.send_text(&interrupt).await?;
        let window = self.timeouts.interrupt_drain;
        let discarded = self.drain(window).await?;
        debug!(session = %self.id, discarded, "interrupted running program");
        self.mode = ChannelMode::Text;
        Ok(())
    }

    /// Pings the device.  A failed ping tears the link down and returns
    /// `false`; it never reconnects.
    pub async fn is_alive(&mut self) -> bool {
        let wait = self.timeouts.ping;
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        match link.ping(wait).await {
            Ok(()) => true,
            Err(e) => {
                debug!(session = %self.id, "ping failed: {e}");
                self.close().await;
                false
            }
        }
    }

    /// Makes sure the session is usable, reconnecting at most once.
    ///
    /// # Errors
    ///
    /// Whatever the single reconnect attempt returns.
    pub async fn ensure_alive(&mut self) -> Result<(), DeviceError> {
        if self.is_alive().await {
            return Ok(());
        }
        warn!(session = %self.id, "link to {} is dead; reconnecting once", self.endpoint);
        self.connect().await
    }

    /// Closes the link.  Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.close().await {
                debug!(session = %self.id, "close: {e}");
            }
            info!(session = %self.id, "closed session with {}", self.endpoint);
        }
        self.state = SessionState::Disconnected;
        self.mode = ChannelMode::Text;
    }

    // ── Raw I/O ───────────────────────────────────────────────────────────────

    /// Any link failure ends the session.
    async fn fail(&mut self, e: LinkError) -> DeviceError {
        warn!(session = %self.id, "link to {} failed: {e}", self.endpoint);
        self.close().await;
        DeviceError::Connectivity {
            endpoint: self.endpoint.addr(),
            reason: e.to_string(),
        }
    }

    fn link(&mut self) -> Result<&mut Box<dyn DeviceLink>, DeviceError> {
        match self.state {
            SessionState::Ready => self.link.as_mut().ok_or(DeviceError::NotConnected),
            _ => Err(DeviceError::NotConnected),
        }
    }

    /// Sends `text` exactly as given.
    pub async fn send_text(&mut self, text: &str) -> Result<(), DeviceError> {
        let result = self.link()?.send_text(text).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Sends `line` followed by CRLF.
    pub async fn send_line(&mut self, line: &str) -> Result<(), DeviceError> {
        self.send_text(&repl::command_line(line)).await
    }

    pub async fn send_binary(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        let result = self.link()?.send_binary(data).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Reads the next message, or `None` after `wait` of silence.
    pub async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, DeviceError> {
        let result = self.link()?.recv(wait).await;
        match result {
            Ok(data) => Ok(data),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Discards incoming messages until `window` passes with nothing new.
    /// Returns the number of bytes thrown away.
    pub async fn drain(&mut self, window: Duration) -> Result<usize, DeviceError> {
        let mut discarded = 0;
        for _ in 0..MAX_DRAIN_MESSAGES {
            match self.recv(window).await? {
                Some(bytes) => discarded += bytes.len(),
                None => break,
            }
        }
        if discarded > 0 {
            debug!(session = %self.id, discarded, "drained stray bytes");
        }
        Ok(discarded)
    }

    // ── Mode switching ────────────────────────────────────────────────────────

    /// Prepares the wire for a `"WA"`/`"WB"` exchange.  Always drains.
    pub async fn begin_binary_exchange(&mut self) -> Result<(), DeviceError> {
        self.switch_mode(ChannelMode::Binary).await
    }

    /// Prepares the wire for REPL text.  Drains only after binary traffic.
    pub async fn ensure_text_mode(&mut self) -> Result<(), DeviceError> {
        self.switch_mode(ChannelMode::Text).await
    }

    async fn switch_mode(&mut self, to: ChannelMode) -> Result<(), DeviceError> {
        self.link()?;
        if ChannelMode::requires_drain(self.mode, to) {
            let window = self.timeouts.drain;
            self.drain(window).await?;
        }
        if self.mode != to {
            debug!(session = %self.id, "channel mode {} -> {}", self.mode, to);
        }
        self.mode = to;
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("mode", &self.mode)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

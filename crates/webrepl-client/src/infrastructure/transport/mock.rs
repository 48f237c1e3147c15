//! Scripted in-memory device for tests.
//!
//! [`MockLink`] plays the board's side of a WebREPL socket from a script:
//! frames already waiting when the socket opens, replies triggered by text
//! the client sends, and replies triggered by the n-th binary message.
//! Everything the client sends is recorded for assertions.
//!
//! `MockLink` is a cheap handle (`Clone` shares the same state), so a test
//! keeps one copy for assertions while the session owns another.
//!
//! This module is public so integration tests and downstream crates can
//! drive the application layer without a board on the network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use webrepl_core::protocol::repl;
use webrepl_core::DeviceEndpoint;

use super::link::{Connector, DeviceLink, LinkError};
use crate::error::DeviceError;

#[derive(Default)]
struct LinkState {
    incoming: VecDeque<Vec<u8>>,
    sent_text: Vec<String>,
    sent_binary: Vec<Vec<u8>>,
    text_rules: Vec<(String, Vec<Vec<u8>>)>,
    binary_rules: HashMap<usize, Vec<Vec<u8>>>,
    ping_fails: bool,
    fail_sends: bool,
    hang_up_when_idle: bool,
    closed: bool,
    close_calls: usize,
}

/// Handle to a scripted device connection.
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    /// A silent link with no script.
    pub fn new() -> Self {
        Self::default()
    }

    /// A link that greets with `Password: ` and accepts `password`.
    pub fn device(password: &str) -> Self {
        Self::new()
            .with_incoming(format!("{} ", repl::PASSWORD_PROMPT).as_bytes())
            .reply_to_text(&repl::command_line(password), &[b"\r\nWebREPL connected\r\n>>> "])
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        // A panicking test thread poisons the lock; the state is still usable.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // ── Script ────────────────────────────────────────────────────────────────

    /// Queues a frame that is waiting before the client reads anything.
    pub fn with_incoming(self, frame: &[u8]) -> Self {
        self.push_incoming(frame);
        self
    }

    /// Whenever a sent text message contains `trigger`, queue `frames`.
    pub fn reply_to_text(self, trigger: &str, frames: &[&[u8]]) -> Self {
        self.lock().text_rules.push((
            trigger.to_owned(),
            frames.iter().map(|f| f.to_vec()).collect(),
        ));
        self
    }

    /// When the `index`-th binary message (0-based) is sent, queue `frames`.
    pub fn reply_to_binary(self, index: usize, frames: &[&[u8]]) -> Self {
        self.lock()
            .binary_rules
            .insert(index, frames.iter().map(|f| f.to_vec()).collect());
        self
    }

    // ── Live controls ─────────────────────────────────────────────────────────

    pub fn push_incoming(&self, frame: &[u8]) {
        self.lock().incoming.push_back(frame.to_vec());
    }

    pub fn set_ping_ok(&self, ok: bool) {
        self.lock().ping_fails = !ok;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Reports the connection as closed once nothing is left to read.
    pub fn set_hang_up_when_idle(&self, hang_up: bool) {
        self.lock().hang_up_when_idle = hang_up;
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub fn sent_text(&self) -> Vec<String> {
        self.lock().sent_text.clone()
    }

    pub fn sent_binary(&self) -> Vec<Vec<u8>> {
        self.lock().sent_binary.clone()
    }

    pub fn pending_incoming(&self) -> usize {
        self.lock().incoming.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    fn check_send(state: &LinkState) -> Result<(), LinkError> {
        if state.closed {
            return Err(LinkError::Closed);
        }
        if state.fail_sends {
            return Err(LinkError::Transport("scripted send failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceLink for MockLink {
    async fn send_text(&mut self, text: &str) -> Result<(), LinkError> {
        let mut state = self.lock();
        Self::check_send(&state)?;
        state.sent_text.push(text.to_owned());
        let replies: Vec<Vec<u8>> = state
            .text_rules
            .iter()
            .filter(|(trigger, _)| text.contains(trigger.as_str()))
            .flat_map(|(_, frames)| frames.iter().cloned())
            .collect();
        state.incoming.extend(replies);
        Ok(())
    }

    async fn send_binary(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let mut state = self.lock();
        Self::check_send(&state)?;
        let index = state.sent_binary.len();
        state.sent_binary.push(data.to_vec());
        if let Some(frames) = state.binary_rules.get(&index).cloned() {
            state.incoming.extend(frames);
        }
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(LinkError::Closed);
            }
            if let Some(frame) = state.incoming.pop_front() {
                return Ok(Some(frame));
            }
            if state.hang_up_when_idle {
                state.closed = true;
                return Err(LinkError::Closed);
            }
        }
        tokio::time::sleep(wait).await;
        Ok(None)
    }

    async fn ping(&mut self, _wait: Duration) -> Result<(), LinkError> {
        let state = self.lock();
        if state.closed {
            Err(LinkError::Closed)
        } else if state.ping_fails {
            Err(LinkError::Timeout)
        } else {
            Ok(())
        }
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        let mut state = self.lock();
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

type LinkFactory = Box<dyn Fn(u32) -> MockLink + Send + Sync>;

/// Hands out [`MockLink`]s and counts connection attempts.
pub struct MockConnector {
    factory: LinkFactory,
    attempts: AtomicU32,
    accept_from: u32,
    accept_until: Option<u32>,
    hosts: Option<Vec<String>>,
    opened: Mutex<Vec<MockLink>>,
}

impl MockConnector {
    /// Accepts every attempt.  `factory` receives the 1-based attempt number.
    pub fn new(factory: impl Fn(u32) -> MockLink + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            attempts: AtomicU32::new(0),
            accept_from: 1,
            accept_until: None,
            hosts: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt is accepted by a fresh board with the factory password.
    pub fn healthy() -> Self {
        Self::new(|_| MockLink::device(webrepl_core::DEFAULT_PASSWORD))
    }

    /// Refuses every attempt.
    pub fn unreachable() -> Self {
        let mut connector = Self::healthy();
        connector.accept_from = u32::MAX;
        connector
    }

    /// Refuses the first `n` attempts.
    pub fn failing_until(mut self, n: u32) -> Self {
        self.accept_from = n + 1;
        self
    }

    /// Refuses every attempt after the `n`-th.
    pub fn refusing_after(mut self, n: u32) -> Self {
        self.accept_until = Some(n);
        self
    }

    /// Only accepts connections to the listed hosts.
    pub fn accepting_hosts(mut self, hosts: &[&str]) -> Self {
        self.hosts = Some(hosts.iter().map(|h| (*h).to_owned()).collect());
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Links handed out so far, oldest first.
    pub fn opened(&self) -> Vec<MockLink> {
        self.opened
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        _timeout: Duration,
    ) -> Result<Box<dyn DeviceLink>, DeviceError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let host_ok = self
            .hosts
            .as_ref()
            .map_or(true, |hosts| hosts.iter().any(|h| *h == endpoint.host));
        let in_window = n >= self.accept_from && self.accept_until.map_or(true, |u| n <= u);

        if !(host_ok && in_window) {
            return Err(DeviceError::Connectivity {
                endpoint: endpoint.addr(),
                reason: "connection refused".into(),
            });
        }

        let link = (self.factory)(n);
        self.opened
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(link.clone());
        Ok(Box::new(link))
    }
}

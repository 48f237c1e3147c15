//! WebSocket implementation of [`DeviceLink`] using `tokio-tungstenite`.
//!
//! # What is tokio-tungstenite? (for beginners)
//!
//! `tungstenite` implements the WebSocket protocol (RFC 6455): the HTTP
//! upgrade handshake and the message framing.  `tokio-tungstenite` wraps it
//! in an async `Stream` (incoming messages) + `Sink` (outgoing messages) so
//! it can be driven with `.next().await` and `.send(msg).await` from the
//! `futures-util` extension traits.
//!
//! The WebREPL daemon sends its REPL output as text messages and its
//! transfer records as binary messages.  This module hides that difference:
//! both arrive as raw bytes.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use webrepl_core::DeviceEndpoint;

use super::link::{Connector, DeviceLink, LinkError};
use crate::error::DeviceError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl From<tungstenite::Error> for LinkError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                LinkError::Closed
            }
            other => LinkError::Transport(other.to_string()),
        }
    }
}

/// A live WebSocket to a WebREPL daemon.
pub struct WsLink {
    stream: WsStream,
    /// Data messages that arrived while waiting for a pong.
    pending: VecDeque<Vec<u8>>,
}

impl WsLink {
    pub fn new(stream: WsStream) -> Self {
        Self {
            stream,
            pending: VecDeque::new(),
        }
    }
}

/// Extracts the payload of a data message.  Control frames yield `None`.
fn payload(msg: Message) -> Result<Option<Vec<u8>>, LinkError> {
    match msg {
        Message::Text(text) => Ok(Some(text.into_bytes())),
        Message::Binary(data) => Ok(Some(data)),
        Message::Close(_) => Err(LinkError::Closed),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
    }
}

#[async_trait]
impl DeviceLink for WsLink {
    async fn send_text(&mut self, text: &str) -> Result<(), LinkError> {
        self.stream.send(Message::Text(text.to_owned())).await?;
        Ok(())
    }

    async fn send_binary(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.stream.send(Message::Binary(data.to_vec())).await?;
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        if let Some(data) = self.pending.pop_front() {
            return Ok(Some(data));
        }

        let deadline = Instant::now() + wait;
        loop {
            let msg = match timeout_at(deadline, self.stream.next()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(LinkError::Closed),
                Ok(Some(result)) => result?,
            };
            if let Some(data) = payload(msg)? {
                trace!(len = data.len(), "ws recv");
                return Ok(Some(data));
            }
        }
    }

    async fn ping(&mut self, wait: Duration) -> Result<(), LinkError> {
        self.stream.send(Message::Ping(b"webrepl".to_vec())).await?;

        let deadline = Instant::now() + wait;
        loop {
            let msg = match timeout_at(deadline, self.stream.next()).await {
                Err(_) => return Err(LinkError::Timeout),
                Ok(None) => return Err(LinkError::Closed),
                Ok(Some(result)) => result?,
            };
            if let Message::Pong(_) = msg {
                return Ok(());
            }
            // Keep device output that raced the pong for the next recv().
            if let Some(data) = payload(msg)? {
                self.pending.push_back(data);
            }
        }
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(e) => match LinkError::from(e) {
                LinkError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}

/// Opens [`WsLink`]s with `connect_async`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        wait: Duration,
    ) -> Result<Box<dyn DeviceLink>, DeviceError> {
        let url = endpoint.url();
        debug!("opening {url}");

        match timeout(wait, connect_async(url.as_str())).await {
            Ok(Ok((stream, _response))) => Ok(Box::new(WsLink::new(stream))),
            Ok(Err(e)) => Err(DeviceError::Connectivity {
                endpoint: endpoint.addr(),
                reason: e.to_string(),
            }),
            Err(_) => Err(DeviceError::Connectivity {
                endpoint: endpoint.addr(),
                reason: format!("connect timed out after {wait:?}"),
            }),
        }
    }
}

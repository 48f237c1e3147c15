//! The seam between a [`super::Session`] and the bytes on the wire.
//!
//! A [`DeviceLink`] is one open, already-upgraded WebSocket.  A [`Connector`]
//! opens new ones.  The session logic only ever sees these two traits, so
//! the same handshake, drain and reconnect code runs against a real board
//! and against the scripted [`super::mock::MockLink`] in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use webrepl_core::DeviceEndpoint;

use crate::error::DeviceError;

/// Failure reported by a link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// No reply within the allowed time.
    #[error("timed out")]
    Timeout,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// One open WebSocket to a device.
#[async_trait]
pub trait DeviceLink: Send {
    /// Sends a text message.
    async fn send_text(&mut self, text: &str) -> Result<(), LinkError>;

    /// Sends a binary message.
    async fn send_binary(&mut self, data: &[u8]) -> Result<(), LinkError>;

    /// Waits up to `wait` for the next data message, text or binary.
    ///
    /// `Ok(None)` means nothing arrived in time.  Control frames are handled
    /// internally and never returned.
    async fn recv(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, LinkError>;

    /// Sends a WebSocket ping and waits up to `wait` for the pong.
    async fn ping(&mut self, wait: Duration) -> Result<(), LinkError>;

    /// Closes the connection.  Calling it on a dead link is not an error.
    async fn close(&mut self) -> Result<(), LinkError>;
}

/// Opens links to devices.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a link to `endpoint`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Connectivity`] when the socket or the
    /// WebSocket upgrade cannot be completed in time.
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceLink>, DeviceError>;
}

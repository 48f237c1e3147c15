//! webrepl-client library crate.
//!
//! Talks to a MicroPython board (ESP8266) over its WebREPL WebSocket: finds
//! the board on the local network, logs in, runs Python lines, uploads and
//! downloads files, and reboots it.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! webrepl (CLI)
//!     ↓
//! application/       discovery, command, file_transfer, reset, monitor
//!     ↓
//! infrastructure/
//!   ├── transport/   DeviceLink trait, WebSocket link, Session, scripted mock
//!   ├── network/     local IPv4 lookup, /24 port scan, WebREPL probe
//!   └── storage/     TOML config, on-disk IP cache
//!     ↓
//! webrepl-core       frames, ack scanner, REPL markers, domain types
//! ```
//!
//! # For beginners: one socket, two dialects
//!
//! The board multiplexes a text REPL and a binary file-transfer protocol on
//! the same WebSocket.  When it switches between them it sometimes leaves a
//! few stray bytes behind.  The [`infrastructure::transport::Session`] keeps
//! track of which dialect is active and drains the wire whenever a switch
//! could have left something behind, and the acknowledgement reader in
//! [`application::file_transfer`] scans past any noise that slips through.

/// Typed error enums shared by the whole crate.
pub mod error;

/// Application layer: the operations a user asks for.
pub mod application;

/// Infrastructure layer: sockets, file system, configuration.
pub mod infrastructure;

pub use error::{DeviceError, ProtocolFailure, TransferStage};

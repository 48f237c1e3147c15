//! # webrepl-core
//!
//! Shared library for the WebREPL device client containing the binary
//! file-transfer frame codec, the text REPL markers, and the small domain
//! types (endpoints, cache entries) that the client crate builds on.
//!
//! This crate has zero dependencies on sockets, the file system, or an async
//! runtime.  Everything here is a pure function over bytes and values, which
//! keeps the protocol rules testable without a device on the network.
//!
//! # Architecture overview (for beginners)
//!
//! A MicroPython board running WebREPL exposes a single WebSocket.  Over that
//! one connection it speaks two very different dialects:
//!
//! - **Text REPL** – you type a line of Python, the board echoes it, prints
//!   the result and finishes with the `>>> ` prompt.
//!
//! - **Binary file transfer** – a fixed 82-byte request record starting with
//!   `"WA"`, answered by a 4-byte record starting with `"WB"`, followed by the
//!   raw file bytes in 1 KiB pieces.
//!
//! This crate defines:
//!
//! - **`protocol`** – the request/response frames, the resynchronizing
//!   acknowledgement scanner, the REPL text markers, and the
//!   [`ChannelMode`] state machine that decides when stray bytes must be
//!   drained.
//!
//! - **`domain`** – the [`DeviceEndpoint`] a session connects to and the
//!   [`CacheEntry`] record that remembers where a device was last found.

pub mod domain;
pub mod protocol;

pub use domain::cache::{CacheEntry, CACHE_TTL_SECS};
pub use domain::endpoint::{DeviceEndpoint, DEFAULT_PASSWORD, DEFAULT_PORT, FALLBACK_ADDRESS};
pub use protocol::frame::{FrameError, Opcode, ResponseCode, TransferFrame};
pub use protocol::mode::ChannelMode;
pub use protocol::resync::AckScanner;

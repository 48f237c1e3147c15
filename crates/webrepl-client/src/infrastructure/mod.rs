//! Infrastructure layer: everything that touches sockets or the disk.

/// Local IPv4 lookup, subnet port scan and the WebREPL probe.
pub mod network;

/// TOML configuration and the on-disk IP cache.
pub mod storage;

/// WebSocket links and authenticated sessions.
pub mod transport;

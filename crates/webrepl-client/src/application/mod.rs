//! Application layer: the operations the CLI sequences.
//!
//! Each module works on a borrowed [`crate::infrastructure::transport::Session`]
//! (or, for discovery, on a [`discovery::NetworkProbe`]) and contains no
//! socket code of its own.

pub mod command;
pub mod discovery;
pub mod file_transfer;
pub mod monitor;
pub mod reset;

pub use command::execute;
pub use discovery::{locate_device, DiscoveryResolver, NetworkProbe};
pub use file_transfer::{read_ack, receive_file, send_file, TransferRequest};
pub use monitor::{follow_output, FollowEnd};
pub use reset::{reset, reset_and_reconnect, wait_for_reboot, RebootPolicy};

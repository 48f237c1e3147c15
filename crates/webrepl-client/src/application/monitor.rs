//! Passive log streaming.
//!
//! After a reboot the board's `main.py` prints status lines on the REPL.
//! [`follow_output`] forwards them to a sink without sending anything, so
//! the running program is not interrupted.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};
use webrepl_core::protocol::repl;

use crate::infrastructure::transport::Session;

/// Why [`follow_output`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowEnd {
    /// `running` was cleared.
    Stopped,
    /// The connection dropped or was never open.
    Disconnected,
}

/// Forwards device output to `sink` until `running` clears or the link dies.
///
/// Chunks that are nothing but a prompt echo are dropped.  `running` is
/// checked between polls, so it takes at most one poll interval to notice.
pub async fn follow_output<F>(session: &mut Session, running: &AtomicBool, mut sink: F) -> FollowEnd
where
    F: FnMut(&str),
{
    if !session.is_ready() {
        return FollowEnd::Disconnected;
    }
    info!(session = %session.id(), "following output from {}", session.endpoint());

    let poll = session.timeouts().interrupt_drain;
    while running.load(Ordering::Relaxed) {
        match session.recv(poll).await {
            Ok(Some(bytes)) => {
                let text = String::from_utf8_lossy(&bytes);
                if !repl::is_prompt_echo(&text) {
                    sink(&text);
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!(session = %session.id(), "output stream ended: {e}");
                return FollowEnd::Disconnected;
            }
        }
    }
    FollowEnd::Stopped
}

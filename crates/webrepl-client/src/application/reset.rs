//! Rebooting the board and waiting for it to come back.
//!
//! A reset is fire-and-forget: the board drops the socket as it reboots,
//! so no reply is awaited.  Reconnecting is a separate, bounded polling
//! loop, because the board needs a few seconds to boot and rejoin WiFi.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use webrepl_core::protocol::repl;
use webrepl_core::DeviceEndpoint;

use crate::error::DeviceError;
use crate::infrastructure::transport::{Connector, Session, SessionTimeouts};

/// Pause between the reset lines so the REPL handles them one at a time.
const STEP_PAUSE: Duration = Duration::from_millis(100);

/// How long and how often to try reconnecting after a reset.
#[derive(Debug, Clone, PartialEq)]
pub struct RebootPolicy {
    pub max_attempts: u32,
    /// Sleep before the first attempt.
    pub initial_wait: Duration,
    /// Delay before the second attempt.
    pub retry_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RebootPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_wait: Duration::from_secs(5),
            retry_delay: Duration::from_secs(3),
            backoff: 1.5,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RebootPolicy {
    /// Delay before attempt `attempt` (0-based).  Zero before the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff.max(1.0).powi(attempt as i32 - 1);
        self.retry_delay.mul_f64(factor).min(self.max_delay)
    }
}

/// Sends Ctrl-C, `import machine`, `machine.reset()`.  Returns `true` when
/// all three went out.  The session is closed afterwards either way.
pub async fn reset(session: &mut Session) -> bool {
    let sent = send_reset_sequence(session).await;
    match &sent {
        Ok(()) => info!(session = %session.id(), "reset sent to {}", session.endpoint()),
        Err(e) => warn!(session = %session.id(), "reset failed: {e}"),
    }
    session.close().await;
    sent.is_ok()
}

async fn send_reset_sequence(session: &mut Session) -> Result<(), DeviceError> {
    session.ensure_text_mode().await?;
    session
        .send_text(&char::from(repl::INTERRUPT).to_string())
        .await?;
    for line in repl::RESET_COMMANDS {
        tokio::time::sleep(STEP_PAUSE).await;
        session.send_line(line).await?;
    }
    Ok(())
}

/// Polls until the board accepts a new session or the attempts run out.
pub async fn wait_for_reboot(
    endpoint: &DeviceEndpoint,
    connector: Arc<dyn Connector>,
    timeouts: SessionTimeouts,
    policy: &RebootPolicy,
) -> Option<Session> {
    info!(
        "waiting {:?} for {endpoint} to reboot ({} attempts)",
        policy.initial_wait, policy.max_attempts
    );
    tokio::time::sleep(policy.initial_wait).await;

    for attempt in 0..policy.max_attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut session =
            Session::new(endpoint.clone(), Arc::clone(&connector)).with_timeouts(timeouts);
        match session.connect().await {
            Ok(()) => {
                info!("{endpoint} is back after {} attempt(s)", attempt + 1);
                return Some(session);
            }
            Err(e) => debug!("reconnect attempt {} failed: {e}", attempt + 1),
        }
    }

    warn!("{endpoint} did not come back");
    None
}

/// Resets the board and waits for it to come back.
///
/// # Errors
///
/// - [`DeviceError::Connectivity`] when the reset lines could not be sent.
/// - [`DeviceError::DeviceReset`] when every reconnect attempt failed.
pub async fn reset_and_reconnect(
    session: &mut Session,
    policy: &RebootPolicy,
) -> Result<Session, DeviceError> {
    let endpoint = session.endpoint().clone();
    let connector = session.connector();
    let timeouts = *session.timeouts();

    if !reset(session).await {
        return Err(DeviceError::Connectivity {
            endpoint: endpoint.addr(),
            reason: "reset commands could not be sent".into(),
        });
    }

    wait_for_reboot(&endpoint, connector, timeouts, policy)
        .await
        .ok_or(DeviceError::DeviceReset {
            attempts: policy.max_attempts,
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Running Python lines on the board's REPL.
//!
//! The REPL has no framing, so a command is "done" when its output shows
//! the prompt again, or an exception, or when the overall timeout runs out.
//! After an exception marker the reader keeps going just long enough to
//! capture the rest of the traceback: up to the next prompt, or until one
//! poll comes back empty.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use webrepl_core::protocol::repl::{self, OutputStatus};

use crate::infrastructure::transport::Session;

/// Sends `command` and collects the device's output.
///
/// Never fails: a transport error before the command is sent yields an
/// empty string, and one while reading yields whatever was collected.  The
/// returned text includes the device's echo of the command.
pub async fn execute(session: &mut Session, command: &str, timeout: Duration) -> String {
    if let Err(e) = session.ensure_text_mode().await {
        warn!(session = %session.id(), "cannot run command: {e}");
        return String::new();
    }
    if let Err(e) = session.send_line(command).await {
        warn!(session = %session.id(), "cannot send command: {e}");
        return String::new();
    }

    let poll = session.timeouts().poll;
    let deadline = Instant::now() + timeout;
    let mut output = String::new();
    let mut saw_error = false;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(session = %session.id(), "command timed out after {timeout:?}");
            break;
        }

        match session.recv(poll.min(remaining)).await {
            Ok(Some(bytes)) => {
                output.push_str(&String::from_utf8_lossy(&bytes));
                match repl::classify(&output) {
                    OutputStatus::Prompt => break,
                    OutputStatus::Error => saw_error = true,
                    OutputStatus::Pending => {}
                }
            }
            Ok(None) if saw_error => break,
            Ok(None) => {}
            Err(e) => {
                warn!(session = %session.id(), "read failed mid-command: {e}");
                break;
            }
        }
    }

    output
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::infrastructure::transport::mock::{MockConnector, MockLink};
    use webrepl_core::DeviceEndpoint;

    async fn session_with(link: MockLink) -> Session {
        let connector = Arc::new(MockConnector::new(move |_| link.clone()));
        Session::open(
            DeviceEndpoint::with_defaults("192.168.1.50"),
            connector,
            Default::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_is_collected_until_prompt() {
        // Arrange
        let link = MockLink::device("admin")
            .reply_to_text("print(21 * 2)", &[b"print(21 * 2)\r\n", b"42\r\n>>> "]);
        let mut session = session_with(link.clone()).await;
        let started = Instant::now();

        // Act
        let out = execute(&mut session, "print(21 * 2)", Duration::from_secs(5)).await;

        // Assert
        assert!(out.contains("42"));
        assert!(out.ends_with(">>> "));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(link.sent_text().last().map(String::as_str), Some("print(21 * 2)\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_login_prompt_does_not_shift_results() {
        // Arrange: the board sends its first prompt in a frame of its own.
        let link = MockLink::new()
            .with_incoming(b"Password: ")
            .reply_to_text("admin\r\n", &[b"\r\nWebREPL connected\r\n", b">>> "])
            .reply_to_text("1+1", &[b"1+1\r\n2\r\n>>> "])
            .reply_to_text("print('x')", &[b"print('x')\r\nx\r\n>>> "]);
        let mut session = session_with(link).await;

        // Act
        let first = execute(&mut session, "1+1", Duration::from_secs(5)).await;
        let second = execute(&mut session, "print('x')", Duration::from_secs(5)).await;

        // Assert
        assert_eq!(first, "1+1\r\n2\r\n>>> ");
        assert_eq!(second, "print('x')\r\nx\r\n>>> ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_traceback_is_captured_in_full() {
        // Arrange: the error arrives in pieces, then the prompt.
        let link = MockLink::device("admin").reply_to_text(
            "undefined_name",
            &[
                b"Traceback (most recent call last):\r\n",
                b"  File \"<stdin>\", line 1, in <module>\r\n",
                b"NameError: name 'undefined_name' isn't defined\r\n",
                b">>> ",
            ],
        );
        let mut session = session_with(link).await;

        // Act
        let out = execute(&mut session, "undefined_name", Duration::from_secs(5)).await;

        // Assert
        assert!(out.contains("Traceback"));
        assert!(out.contains("NameError"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_without_prompt_stops_at_first_quiet_poll() {
        let link = MockLink::device("admin")
            .reply_to_text("boom", &[b"SyntaxError: invalid syntax\r\n"]);
        let mut session = session_with(link).await;
        let started = Instant::now();

        let out = execute(&mut session, "boom", Duration::from_secs(30)).await;

        assert!(out.contains("SyntaxError"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_returns_after_timeout() {
        let link = MockLink::device("admin");
        let mut session = session_with(link).await;
        let started = Instant::now();

        let out = execute(&mut session, "import time", Duration::from_secs(2)).await;

        assert!(out.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_returns_empty_string() {
        let link = MockLink::device("admin");
        let mut session = session_with(link.clone()).await;
        link.set_fail_sends(true);

        let out = execute(&mut session, "print(1)", Duration::from_secs(2)).await;

        assert_eq!(out, "");
    }
}

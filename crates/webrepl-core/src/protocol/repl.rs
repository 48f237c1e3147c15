//! Text REPL markers and helpers.
//!
//! The text channel has no framing of its own.  The client decides that a
//! command has finished by watching for the interactive prompt or for one of
//! the strings MicroPython prints when an exception escapes.

/// Interactive prompt printed when the REPL is ready for input.
pub const PROMPT: &str = ">>>";

/// Banner printed after a correct password.
pub const CONNECTED_MARKER: &str = "WebREPL connected";

/// Text the device sends when it wants the password.
pub const PASSWORD_PROMPT: &str = "Password:";

/// Strings that signal an exception in command output.
pub const ERROR_MARKERS: [&str; 3] = ["Traceback", "Error:", "SyntaxError"];

/// Ctrl-C: interrupts whatever program the board is running.
pub const INTERRUPT: u8 = 0x03;

/// Line terminator the REPL expects.
pub const LINE_END: &str = "\r\n";

/// Lines sent, in order, to reboot the board.
pub const RESET_COMMANDS: [&str; 2] = ["import machine", "machine.reset()"];

/// What a chunk of accumulated output says about the running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// Neither a prompt nor an error has been seen yet.
    Pending,
    /// The prompt came back; the command completed.
    Prompt,
    /// An exception was reported.
    Error,
}

/// Classifies accumulated command output.
///
/// A prompt wins over an error marker: when both are present the trace has
/// already been followed by the next prompt and nothing more will arrive.
pub fn classify(output: &str) -> OutputStatus {
    if output.contains(PROMPT) {
        OutputStatus::Prompt
    } else if ERROR_MARKERS.iter().any(|m| output.contains(m)) {
        OutputStatus::Error
    } else {
        OutputStatus::Pending
    }
}

/// Returns `true` when the reply to a password line means the session is
/// authenticated.
pub fn is_auth_accepted(reply: &str) -> bool {
    reply.contains(CONNECTED_MARKER) || reply.contains(PROMPT)
}

/// Returns `true` when `chunk` is nothing but a bare prompt echo.
///
/// Passive log streaming drops these so the output reads like the device's
/// own print statements.
pub fn is_prompt_echo(chunk: &str) -> bool {
    matches!(chunk, ">>> " | ">>> \r\n" | "\r\n>>> ")
}

/// Formats a command as the bytes the REPL expects.
pub fn command_line(command: &str) -> String {
    format!("{command}{LINE_END}")
}

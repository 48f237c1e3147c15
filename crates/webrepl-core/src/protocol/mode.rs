//! The two dialects that share one WebREPL connection.

/// Which sub-protocol the session is currently speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// Line-oriented Python REPL.
    #[default]
    Text,
    /// `"WA"`/`"WB"` framed file transfer.
    Binary,
}

impl ChannelMode {
    /// Returns `true` when bytes already queued on the socket must be
    /// discarded before speaking `to` after `from`.
    ///
    /// Every binary exchange starts from an empty wire, even when the
    /// previous exchange was binary too.  Returning to text after a binary
    /// exchange also drains.  Text followed by text does not.
    ///
    /// ```rust
    /// use webrepl_core::ChannelMode;
    ///
    /// assert!(ChannelMode::requires_drain(ChannelMode::Text, ChannelMode::Binary));
    /// assert!(!ChannelMode::requires_drain(ChannelMode::Text, ChannelMode::Text));
    /// ```
    pub fn requires_drain(from: ChannelMode, to: ChannelMode) -> bool {
        !matches!((from, to), (ChannelMode::Text, ChannelMode::Text))
    }
}

impl std::fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelMode::Text => f.write_str("text"),
            ChannelMode::Binary => f.write_str("binary"),
        }
    }
}

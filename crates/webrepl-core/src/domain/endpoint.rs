//! Where a WebREPL device lives and how to log in to it.

/// Port WebREPL listens on unless reconfigured.
pub const DEFAULT_PORT: u16 = 8266;

/// Address the board answers on when it runs its own access point.
pub const FALLBACK_ADDRESS: &str = "192.168.4.1";

/// Factory WebREPL password.
pub const DEFAULT_PASSWORD: &str = "admin";

/// A device a session can connect to.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl DeviceEndpoint {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
        }
    }

    /// Endpoint on the default port with the factory password.
    pub fn with_defaults(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_PORT, DEFAULT_PASSWORD)
    }

    /// WebSocket URL for this endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// `host:port`, used in log lines and error messages.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// The password must never reach a log line, so Debug is written by hand.
impl std::fmt::Debug for DeviceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"***")
            .finish()
    }
}

impl std::fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_uses_ws_scheme() {
        let ep = DeviceEndpoint::with_defaults("192.168.1.50");
        assert_eq!(ep.url(), "ws://192.168.1.50:8266");
    }

    #[test]
    fn test_debug_and_display_hide_password() {
        let ep = DeviceEndpoint::new("10.0.0.2", 8266, "s3cret");
        assert!(!format!("{ep:?}").contains("s3cret"));
        assert!(!format!("{ep}").contains("s3cret"));
    }
}

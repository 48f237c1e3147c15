//! The real [`NetworkProbe`]: sockets on the local network.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;
use webrepl_core::DeviceEndpoint;

use super::scan::{local_ipv4, scan_port};
use crate::application::discovery::NetworkProbe;
use crate::infrastructure::transport::{Connector, Session, SessionTimeouts};

/// Hard ceiling on one protocol probe, handshake included.
const PROBE_BUDGET: Duration = Duration::from_secs(5);

/// Probes hosts by logging in to them over WebREPL.
pub struct LanProbe {
    port: u16,
    password: String,
    connector: Arc<dyn Connector>,
    scan_timeout: Duration,
    max_in_flight: usize,
}

impl LanProbe {
    pub fn new(port: u16, password: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            port,
            password: password.into(),
            connector,
            scan_timeout: Duration::from_millis(500),
            max_in_flight: 100,
        }
    }

    /// Per-host connect timeout and concurrency for the subnet scan.
    pub fn with_scan_limits(mut self, scan_timeout: Duration, max_in_flight: usize) -> Self {
        self.scan_timeout = scan_timeout;
        self.max_in_flight = max_in_flight;
        self
    }
}

#[async_trait]
impl NetworkProbe for LanProbe {
    async fn probe(&self, host: &str) -> bool {
        let endpoint = DeviceEndpoint::new(host, self.port, self.password.clone());
        let mut session = Session::new(endpoint, Arc::clone(&self.connector))
            .with_timeouts(SessionTimeouts::probe());

        let accepted = matches!(timeout(PROBE_BUDGET, session.connect()).await, Ok(Ok(())));
        session.close().await;
        debug!("probe {host}:{} -> {accepted}", self.port);
        accepted
    }

    async fn local_ipv4(&self) -> Option<Ipv4Addr> {
        local_ipv4().await
    }

    async fn scan(&self, hosts: Vec<Ipv4Addr>) -> Vec<Ipv4Addr> {
        scan_port(hosts, self.port, self.scan_timeout, self.max_in_flight).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::mock::{MockConnector, MockLink};

    #[tokio::test(start_paused = true)]
    async fn test_probe_accepts_only_the_device_with_matching_password() {
        // Arrange
        let connector = Arc::new(
            MockConnector::new(|_| MockLink::device("admin")).accepting_hosts(&["10.0.0.7"]),
        );
        let probe = LanProbe::new(8266, "admin", connector.clone());

        // Act / Assert
        assert!(probe.probe("10.0.0.7").await);
        assert!(!probe.probe("10.0.0.8").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_with_wrong_password_fails_and_closes() {
        let link = MockLink::device("admin");
        let connector = Arc::new(MockConnector::new({
            let link = link.clone();
            move |_| link.clone()
        }));
        let probe = LanProbe::new(8266, "nope", connector);

        assert!(!probe.probe("10.0.0.7").await);
        assert!(link.is_closed());
    }
}

//! End-to-end workflows against a scripted board.
//!
//! # Purpose
//!
//! These tests drive the public API the same way the `webrepl` binary does:
//! locate the board, open a session, run code, upload and download files,
//! then reboot and reconnect.  The board is a [`MockLink`] handed out by a
//! [`MockConnector`], so no sockets are opened and the clock is paused.
//!
//! # What a scripted board answers
//!
//! ```text
//! Client                               Board (MockLink)
//! ──────                               ────────────────
//! connect                              "Password: "
//! "admin\r\n"                          "WebREPL connected\r\n>>> "
//! "print(21 * 2)\r\n"                  "42\r\n>>> "
//! WA frame (binary #0)                 "WB\0\0"
//! last chunk / GET poll (binary #n)    "WB\0\0" or a length-prefixed chunk
//! ```
//!
//! Subnet scanning is replaced by a probe that reports no LAN address, so
//! discovery only ever visits the cached, configured and fallback hosts.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::assert_ok;

use webrepl_client::application::{
    execute, locate_device, receive_file, reset_and_reconnect, send_file, DiscoveryResolver,
    NetworkProbe, RebootPolicy, TransferRequest,
};
use webrepl_client::infrastructure::network::LanProbe;
use webrepl_client::infrastructure::storage::IpCache;
use webrepl_client::infrastructure::transport::mock::{MockConnector, MockLink};
use webrepl_client::infrastructure::transport::{Connector, Session, SessionTimeouts};
use webrepl_core::{DeviceEndpoint, DEFAULT_PASSWORD, DEFAULT_PORT, FALLBACK_ADDRESS};

const BOARD: &str = "192.168.1.77";
const OK: &[u8] = b"WB\x00\x00";

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Real protocol probe with the subnet scan switched off.
struct NoScanProbe(LanProbe);

#[async_trait]
impl NetworkProbe for NoScanProbe {
    async fn probe(&self, host: &str) -> bool {
        self.0.probe(host).await
    }

    async fn local_ipv4(&self) -> Option<Ipv4Addr> {
        None
    }

    async fn scan(&self, _hosts: Vec<Ipv4Addr>) -> Vec<Ipv4Addr> {
        Vec::new()
    }
}

fn resolver(connector: &Arc<MockConnector>) -> DiscoveryResolver<NoScanProbe> {
    let connector: Arc<dyn Connector> = connector.clone();
    let probe = LanProbe::new(DEFAULT_PORT, DEFAULT_PASSWORD, connector);
    DiscoveryResolver::new(NoScanProbe(probe), FALLBACK_ADDRESS)
}

/// A board at [`BOARD`] that answers one expression and one small upload.
fn scripted_board() -> MockLink {
    MockLink::device(DEFAULT_PASSWORD)
        .reply_to_text("print(21 * 2)", &[b"print(21 * 2)\r\n", b"42\r\n>>> "])
        .reply_to_binary(0, &[OK])
        .reply_to_binary(1, &[OK])
}

fn quick_reboot() -> RebootPolicy {
    RebootPolicy {
        max_attempts: 3,
        initial_wait: Duration::from_millis(200),
        retry_delay: Duration::from_millis(100),
        backoff: 1.5,
        max_delay: Duration::from_millis(300),
    }
}

// ── Workflows ─────────────────────────────────────────────────────────────────

/// Cache hit, then exec, upload and reboot on the located board.
#[tokio::test(start_paused = true)]
async fn test_cached_board_runs_code_uploads_and_reboots() {
    // Arrange: the cache already knows the board.
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = IpCache::new(cache_dir.path());
    assert_ok!(cache.put("esp8266", BOARD));
    let connector = Arc::new(MockConnector::new(|_| scripted_board()).accepting_hosts(&[BOARD]));

    // Act 1: locate.  Only the cached address is probed.
    let host = locate_device(&resolver(&connector), &cache, "esp8266", None).await;
    assert_eq!(host.as_deref(), Some(BOARD));
    assert_eq!(connector.attempts(), 1);

    // Act 2: open a session and run one expression.
    let endpoint = DeviceEndpoint::with_defaults(BOARD);
    let mut session = Session::open(endpoint, connector.clone(), SessionTimeouts::default())
        .await
        .unwrap();
    let output = execute(&mut session, "print(21 * 2)", Duration::from_secs(2)).await;
    assert!(output.contains("42"), "output was {output:?}");

    // Act 3: upload a small file on the same session.
    let files = tempfile::tempdir().unwrap();
    let local = files.path().join("boot.py");
    std::fs::write(&local, b"import webrepl\nwebrepl.start()\n").unwrap();
    assert_ok!(send_file(&mut session, &TransferRequest::new(&local, "boot.py")).await);

    // Act 4: reboot and wait for the board to return.
    let fresh = reset_and_reconnect(&mut session, &quick_reboot())
        .await
        .unwrap();

    // Assert
    assert!(fresh.is_ready());
    assert!(!session.is_ready());
    let opened = connector.opened();
    let live = &opened[1];
    let binary = live.sent_binary();
    assert_eq!(binary.len(), 2);
    assert_eq!(&binary[0][..3], b"WA\x01");
    assert_eq!(binary[1], b"import webrepl\nwebrepl.start()\n");
    let text = live.sent_text();
    assert_eq!(
        &text[text.len() - 3..],
        &["\x03", "import machine\r\n", "machine.reset()\r\n"]
    );
    assert!(live.is_closed());
    assert_eq!(connector.attempts(), 3);
}

/// A stale cached address falls through to the configured one, which is
/// then written back to the cache.
#[tokio::test(start_paused = true)]
async fn test_stale_cache_entry_is_replaced_by_configured_address() {
    // Arrange
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = IpCache::new(cache_dir.path());
    assert_ok!(cache.put("esp8266", "192.168.1.12"));
    let connector = Arc::new(MockConnector::healthy().accepting_hosts(&[BOARD]));

    // Act
    let host = locate_device(&resolver(&connector), &cache, "esp8266", Some(BOARD)).await;

    // Assert: cached, configured, and nothing else.
    assert_eq!(host.as_deref(), Some(BOARD));
    assert_eq!(connector.attempts(), 2);
    assert_eq!(cache.get("esp8266").as_deref(), Some(BOARD));
}

/// Nothing answers anywhere, so discovery ends at the fallback and fails.
#[tokio::test(start_paused = true)]
async fn test_unreachable_board_is_not_cached() {
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = IpCache::new(cache_dir.path());
    let connector = Arc::new(MockConnector::unreachable());

    let host = locate_device(&resolver(&connector), &cache, "esp8266", Some(BOARD)).await;

    assert!(host.is_none());
    // Configured address, then the fallback.
    assert_eq!(connector.attempts(), 2);
    assert!(cache.get("esp8266").is_none());
}

/// Downloads a two-chunk file into a nested local directory.
#[tokio::test(start_paused = true)]
async fn test_download_writes_nested_local_file() {
    // Arrange: request ack, two chunks, end marker, completion ack.
    let link = MockLink::device(DEFAULT_PASSWORD)
        .reply_to_binary(0, &[OK])
        .reply_to_binary(1, &[b"\x06\x00", b"print("])
        .reply_to_binary(2, &[b"\x04\x00", b"1)\r\n"])
        .reply_to_binary(3, &[b"\x00\x00", OK]);
    let connector = Arc::new(MockConnector::new({
        let link = link.clone();
        move |_| link.clone()
    }));
    let mut session = Session::open(
        DeviceEndpoint::with_defaults(BOARD),
        connector,
        SessionTimeouts::default(),
    )
    .await
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("backup").join("main.py");

    // Act
    let written = receive_file(&mut session, "main.py", &target).await.unwrap();

    // Assert
    assert_eq!(written, 10);
    assert_eq!(std::fs::read(&target).unwrap(), b"print(1)\r\n");
    assert_eq!(&link.sent_binary()[0][..3], b"WA\x02");
}

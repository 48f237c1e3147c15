//! Local-network helpers: our own IPv4 address and a bounded /24 port scan.
//!
//! # How the local address is found (for beginners)
//!
//! "Connecting" a UDP socket sends no packets; it only asks the OS which
//! interface and source address it *would* use to reach the target.  Asking
//! for a route to a public address (`8.8.8.8:80`) therefore yields the LAN
//! address of the default interface without any traffic leaving the host.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use futures_util::{stream, StreamExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

/// Route probe target.  Never contacted.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// The IPv4 address of the interface that holds the default route.
pub async fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect(ROUTE_PROBE_ADDR).await.ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() && !ip.is_loopback() => Some(ip),
        _ => None,
    }
}

/// Hosts `.1` through `.254` of the /24 containing `ip`, in address order.
pub fn subnet_hosts(ip: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, _] = ip.octets();
    (1..=254).map(|d| Ipv4Addr::new(a, b, c, d)).collect()
}

/// TCP-connects to `port` on every host, at most `max_in_flight` at a
/// time, and returns the hosts that accepted, in the order given.
///
/// `buffered` (not `buffer_unordered`) keeps results in input order, so
/// when two boards answer the lower address wins later on.
pub async fn scan_port(
    hosts: Vec<Ipv4Addr>,
    port: u16,
    connect_timeout: Duration,
    max_in_flight: usize,
) -> Vec<Ipv4Addr> {
    let total = hosts.len();
    let open: Vec<Ipv4Addr> = stream::iter(hosts)
        .map(|ip| async move {
            let reachable = matches!(
                timeout(connect_timeout, TcpStream::connect((ip, port))).await,
                Ok(Ok(_))
            );
            (ip, reachable)
        })
        .buffered(max_in_flight.max(1))
        .filter_map(|(ip, reachable)| async move { reachable.then_some(ip) })
        .collect()
        .await;

    debug!("scanned {total} hosts on port {port}: {} open", open.len());
    open
}

//! LAN discovery plumbing.

pub mod probe;
pub mod scan;

pub use probe::LanProbe;
pub use scan::{local_ipv4, scan_port, subnet_hosts};

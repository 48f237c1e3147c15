//! Cache record remembering the last address a device answered on.
//!
//! The on-disk text form is two lines:
//! ```text
//! 192.168.1.50
//! 1718000000.25
//! ```
//! the address followed by the Unix time (seconds, fractional) it was saved.

/// Seven days.  An entry older than this is treated as absent.
pub const CACHE_TTL_SECS: f64 = 604_800.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub address: String,
    /// Unix seconds at which the entry was written.
    pub timestamp: f64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, address: impl Into<String>, timestamp: f64) -> Self {
        Self {
            key: key.into(),
            address: address.into(),
            timestamp,
        }
    }

    /// Parses the two-line text form.  Returns `None` for anything malformed
    /// (missing line, empty address, non-numeric or non-finite timestamp).
    pub fn parse(key: &str, text: &str) -> Option<Self> {
        let mut lines = text.lines().map(str::trim);
        let address = lines.next().filter(|a| !a.is_empty())?;
        let timestamp: f64 = lines.next()?.parse().ok()?;
        if !timestamp.is_finite() {
            return None;
        }
        Some(Self::new(key, address, timestamp))
    }

    /// Renders the two-line text form.
    pub fn render(&self) -> String {
        format!("{}\n{}\n", self.address, self.timestamp)
    }

    /// Seconds elapsed between the write and `now`.
    pub fn age(&self, now: f64) -> f64 {
        now - self.timestamp
    }

    /// An entry exactly at the TTL is still fresh; only strictly older
    /// entries expire.
    pub fn is_fresh(&self, now: f64) -> bool {
        self.age(now) <= CACHE_TTL_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_boundary() {
        // Arrange
        let entry = CacheEntry::new("dev", "10.0.0.5", 1_000.0);

        // Act / Assert
        assert!(entry.is_fresh(1_000.0 + CACHE_TTL_SECS));
        assert!(!entry.is_fresh(1_000.0 + CACHE_TTL_SECS + 1.0));
        assert!(!entry.is_fresh(1_000.0 + CACHE_TTL_SECS + 0.001));
    }

    #[test]
    fn test_parse_render_preserves_fractional_timestamp() {
        let entry = CacheEntry::new("dev", "192.168.1.50", 1718000000.25);
        let parsed = CacheEntry::parse("dev", &entry.render()).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        assert!(CacheEntry::parse("k", "").is_none());
        assert!(CacheEntry::parse("k", "10.0.0.1").is_none());
        assert!(CacheEntry::parse("k", "10.0.0.1\nyesterday").is_none());
        assert!(CacheEntry::parse("k", "\n123.0").is_none());
        assert!(CacheEntry::parse("k", "10.0.0.1\nNaN").is_none());
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let parsed = CacheEntry::parse("k", "  10.0.0.1 \r\n 42 \r\n").unwrap();
        assert_eq!(parsed.address, "10.0.0.1");
        assert_eq!(parsed.timestamp, 42.0);
    }
}

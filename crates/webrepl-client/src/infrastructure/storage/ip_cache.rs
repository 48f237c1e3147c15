//! Durable cache of the last address each device answered on.
//!
//! One small text file per key, `ip_<key>.txt`, in a per-user cache
//! directory:
//! - Windows:  `%LOCALAPPDATA%\webrepl`
//! - macOS:    `~/Library/Caches/webrepl`
//! - others:   `$XDG_CACHE_HOME/webrepl` or `~/.cache/webrepl`
//!
//! Entries older than seven days read as absent.  A file that cannot be
//! parsed also reads as absent; it is overwritten by the next `put`.
//!
//! There is no cross-process locking.  Two processes writing the same key
//! race and the last write wins.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};
use webrepl_core::CacheEntry;

#[derive(Debug, Error)]
pub enum CacheError {
    /// No per-user cache directory could be derived from the environment.
    #[error("could not determine cache directory")]
    NoCacheDir,

    #[error("I/O error on cache file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What [`IpCache::clear`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    Key(String),
    All,
}

#[derive(Debug, Clone)]
pub struct IpCache {
    dir: PathBuf,
}

impl IpCache {
    /// A cache rooted at `dir`.  The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// A cache in the platform's per-user cache directory.
    ///
    /// # Errors
    ///
    /// [`CacheError::NoCacheDir`] when no base directory is known.
    pub fn open_default() -> Result<Self, CacheError> {
        platform_cache_dir().map(Self::new).ok_or(CacheError::NoCacheDir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("ip_{}.txt", sanitize_key(key)))
    }

    /// The cached address for `key`, if present and fresh.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, unix_now())
    }

    /// Like [`IpCache::get`] with an explicit clock.
    pub fn get_at(&self, key: &str, now: f64) -> Option<String> {
        let path = self.path_for(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("cannot read {}: {e}", path.display());
                }
                return None;
            }
        };

        let Some(entry) = CacheEntry::parse(key, &text) else {
            debug!("ignoring malformed cache file {}", path.display());
            return None;
        };
        if !entry.is_fresh(now) {
            debug!(key, age = entry.age(now), "cache entry expired");
            return None;
        }
        Some(entry.address)
    }

    /// Stores `address` for `key` with the current time.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] if the directory or file cannot be written.
    pub fn put(&self, key: &str, address: &str) -> Result<(), CacheError> {
        self.put_at(key, address, unix_now())
    }

    /// Like [`IpCache::put`] with an explicit timestamp.
    pub fn put_at(&self, key: &str, address: &str, now: f64) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(key);
        let entry = CacheEntry::new(key, address, now);
        std::fs::write(&path, entry.render()).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(key, address, "cached device address");
        Ok(())
    }

    /// Removes one entry or all of them.  Missing files are not an error.
    /// Returns how many files were removed.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] for failures other than "not found".
    pub fn clear(&self, scope: ClearScope) -> Result<usize, CacheError> {
        let paths = match scope {
            ClearScope::Key(key) => vec![self.path_for(&key)],
            ClearScope::All => self.entry_files()?,
        };

        let mut removed = 0;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }
        Ok(removed)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        Ok(entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("ip_") && n.ends_with(".txt"))
            })
            .collect())
    }
}

/// Keeps `[A-Za-z0-9_-]`; everything else becomes `_`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn platform_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("LOCALAPPDATA").map(|p| PathBuf::from(p).join("webrepl"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Caches").join("webrepl"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))?;
        Some(base.join("webrepl"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use webrepl_core::CACHE_TTL_SECS;

    fn cache() -> (tempfile::TempDir, IpCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = IpCache::new(dir.path().join("webrepl"));
        (dir, cache)
    }

    #[test]
    fn test_put_then_get_returns_address() {
        // Arrange
        let (_dir, cache) = cache();

        // Act
        cache.put_at("esp8266", "192.168.1.50", 1_000.0).unwrap();

        // Assert
        assert_eq!(cache.get_at("esp8266", 1_001.0).as_deref(), Some("192.168.1.50"));
    }

    #[test]
    fn test_entry_at_exact_ttl_is_fresh_and_one_second_later_is_gone() {
        let (_dir, cache) = cache();
        cache.put_at("k", "10.0.0.5", 1_000.0).unwrap();

        assert!(cache.get_at("k", 1_000.0 + CACHE_TTL_SECS).is_some());
        assert!(cache.get_at("k", 1_000.0 + CACHE_TTL_SECS + 1.0).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let (_dir, cache) = cache();
        cache.put_at("k", "10.0.0.5", 1.0).unwrap();
        cache.put_at("k", "10.0.0.6", 2.0).unwrap();
        assert_eq!(cache.get_at("k", 3.0).as_deref(), Some("10.0.0.6"));
    }

    #[test]
    fn test_file_format_is_two_lines() {
        let (_dir, cache) = cache();
        cache.put_at("dev", "10.0.0.5", 1718000000.5).unwrap();

        let text = std::fs::read_to_string(cache.dir().join("ip_dev.txt")).unwrap();

        assert_eq!(text, "10.0.0.5\n1718000000.5\n");
    }

    #[test]
    fn test_corrupt_file_reads_as_absent() {
        let (_dir, cache) = cache();
        std::fs::create_dir_all(cache.dir()).unwrap();
        std::fs::write(cache.dir().join("ip_k.txt"), "10.0.0.5\nnot-a-number\n").unwrap();

        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_missing_directory_reads_as_absent() {
        let (_dir, cache) = cache();
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_keys_are_sanitized_into_file_names() {
        assert_eq!(sanitize_key("living room/esp"), "living_room_esp");
        assert_eq!(sanitize_key("gallinero-01_a"), "gallinero-01_a");

        let (_dir, cache) = cache();
        cache.put_at("../escape", "10.0.0.9", 5.0).unwrap();
        assert!(cache.dir().join("ip____escape.txt").exists());
    }

    #[test]
    fn test_clear_key_and_all() {
        let (_dir, cache) = cache();
        cache.put_at("a", "10.0.0.1", 5.0).unwrap();
        cache.put_at("b", "10.0.0.2", 5.0).unwrap();
        cache.put_at("c", "10.0.0.3", 5.0).unwrap();

        assert_eq!(cache.clear(ClearScope::Key("a".into())).unwrap(), 1);
        assert_eq!(cache.clear(ClearScope::Key("a".into())).unwrap(), 0);
        assert_eq!(cache.clear(ClearScope::All).unwrap(), 2);
        assert!(cache.get_at("b", 6.0).is_none());
    }

    #[test]
    fn test_clear_all_on_missing_directory_is_ok() {
        let (_dir, cache) = cache();
        assert_eq!(cache.clear(ClearScope::All).unwrap(), 0);
    }
}

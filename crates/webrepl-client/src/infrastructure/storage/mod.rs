//! On-disk state: the TOML config file and the device address cache.

pub mod config;
pub mod ip_cache;

pub use config::{load_config, load_config_from, save_config_to, ClientConfig, ConfigError};
pub use ip_cache::{CacheError, ClearScope, IpCache};

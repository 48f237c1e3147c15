//! `webrepl`: command-line client for MicroPython boards running WebREPL.
//!
//! # Usage
//!
//! ```text
//! webrepl [OPTIONS] <COMMAND>
//!
//! Commands:
//!   find         Locate the board and print its address
//!   exec         Run one line of Python and print the output
//!   put          Upload a file
//!   get          Download a file
//!   reset        Reboot the board and wait for it to come back
//!   logs         Stream the board's output without interrupting it
//!   cache-clear  Forget cached addresses
//!
//! Options:
//!   --host <HOST>          Board address; probed before the subnet scan
//!   --port <PORT>          WebREPL port
//!   --password <PASSWORD>  WebREPL password
//!   --key <KEY>            Address cache key
//!   --config <PATH>        Config file (default: platform config dir)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable           | Flag         |
//! |--------------------|--------------|
//! | `WEBREPL_HOST`     | `--host`     |
//! | `WEBREPL_PORT`     | `--port`     |
//! | `WEBREPL_PASSWORD` | `--password` |
//! | `WEBREPL_KEY`      | `--key`      |
//! | `WEBREPL_CONFIG`   | `--config`   |
//!
//! Flags beat environment variables, which beat the config file.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use webrepl_client::application::{
    execute, follow_output, locate_device, receive_file, reset, reset_and_reconnect,
    send_file, DiscoveryResolver, FollowEnd, TransferRequest,
};
use webrepl_client::infrastructure::network::LanProbe;
use webrepl_client::infrastructure::storage::{
    load_config, load_config_from, ClearScope, ClientConfig, ConfigError, IpCache,
};
use webrepl_client::infrastructure::transport::{Connector, Session, WsConnector};
use webrepl_core::DeviceEndpoint;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "webrepl",
    about = "Find, program and reboot MicroPython boards over WebREPL",
    version
)]
struct Cli {
    /// Board address.  Probed after the cached address and before the subnet scan.
    #[arg(long, global = true, env = "WEBREPL_HOST")]
    host: Option<String>,

    /// WebREPL port.
    #[arg(long, global = true, env = "WEBREPL_PORT")]
    port: Option<u16>,

    /// WebREPL password.
    #[arg(long, global = true, env = "WEBREPL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Address cache key.
    #[arg(long, global = true, env = "WEBREPL_KEY")]
    key: Option<String>,

    /// Path to the TOML config file.
    #[arg(long, global = true, env = "WEBREPL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Locate the board and print its address.
    Find,
    /// Run one line of Python and print the output.
    Exec {
        code: String,
        /// Overall timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Upload a file.  Nested remote paths create directories on the board.
    Put {
        local: PathBuf,
        /// Remote path; defaults to the local file name.
        remote: Option<String>,
    },
    /// Download a file.
    Get {
        remote: String,
        /// Local path; defaults to the remote file name.
        local: Option<PathBuf>,
    },
    /// Reboot the board and wait for it to come back.
    Reset {
        /// Stream the board's output after it reconnects.
        #[arg(long)]
        follow: bool,
    },
    /// Stream the board's output without interrupting it.
    Logs,
    /// Forget the cached address for the key, or all of them.
    CacheClear {
        #[arg(long)]
        all: bool,
    },
}

impl Cli {
    /// Loads the config file and applies flag overrides on top.
    fn resolve_config(&self) -> anyhow::Result<ClientConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => match load_config() {
                Ok(cfg) => cfg,
                Err(ConfigError::NoPlatformConfigDir) => ClientConfig::default(),
                Err(e) => return Err(e).context("loading config"),
            },
        };

        if let Some(host) = &self.host {
            cfg.device.address = Some(host.clone());
        }
        if let Some(port) = self.port {
            cfg.device.port = port;
        }
        if let Some(password) = &self.password {
            cfg.device.password = password.clone();
        }
        if let Some(key) = &self.key {
            cfg.device.cache_key = key.clone();
        }
        Ok(cfg)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.resolve_config()?;

    // RUST_LOG wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    let cache = match IpCache::open_default() {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("address cache disabled: {e}");
            None
        }
    };

    if let Command::CacheClear { all } = cli.command {
        return clear_cache(cache.as_ref(), &cfg, all);
    }

    // Local file problems surface before the board is searched for or interrupted.
    let upload = match &cli.command {
        Command::Put { local, remote } => {
            Some(prepare_upload(&cfg, local, remote.as_deref()).await?)
        }
        _ => None,
    };

    let connector: Arc<dyn Connector> = Arc::new(WsConnector);
    let Some(host) = find_device(&cfg, cache.as_ref(), Arc::clone(&connector)).await else {
        bail!("no WebREPL device found");
    };

    if let Command::Find = cli.command {
        println!("{host}");
        return Ok(());
    }

    let endpoint = DeviceEndpoint::new(host, cfg.device.port, cfg.device.password.clone());
    let mut session = Session::open(endpoint, connector, cfg.session_timeouts())
        .await
        .context("connecting to device")?;

    let passive = matches!(cli.command, Command::Logs);
    if cfg.session.interrupt_on_connect && !passive {
        session
            .interrupt_running_program()
            .await
            .context("interrupting running program")?;
    }

    let outcome = tokio::select! {
        result = run(&cli.command, upload.as_ref(), &cfg, &mut session) => result,
        () = ctrl_c() => {
            info!("received Ctrl+C; closing session");
            Ok(())
        }
    };

    session.close().await;
    outcome
}

/// Resolves on Ctrl+C.  If the handler cannot be installed it never resolves,
/// so the command still runs to completion.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn find_device(
    cfg: &ClientConfig,
    cache: Option<&IpCache>,
    connector: Arc<dyn Connector>,
) -> Option<String> {
    let probe = LanProbe::new(cfg.device.port, cfg.device.password.clone(), connector)
        .with_scan_limits(cfg.scan_timeout(), cfg.discovery.max_in_flight);
    let resolver = DiscoveryResolver::new(probe, cfg.discovery.fallback_address.clone());
    let configured = cfg.device.address.as_deref();

    match cache {
        Some(cache) => locate_device(&resolver, cache, &cfg.device.cache_key, configured).await,
        None => resolver.resolve(None, configured).await,
    }
}

/// Builds the upload request for `put` and checks the local file.
async fn prepare_upload(
    cfg: &ClientConfig,
    local: &Path,
    remote: Option<&str>,
) -> anyhow::Result<TransferRequest> {
    let remote = match remote {
        Some(remote) => remote.to_owned(),
        None => file_name_of(local)?,
    };
    let request = TransferRequest::new(local, remote).with_max_size(cfg.device.max_file_size);
    request
        .validate()
        .await
        .with_context(|| format!("checking {}", local.display()))?;
    Ok(request)
}

async fn run(
    command: &Command,
    upload: Option<&TransferRequest>,
    cfg: &ClientConfig,
    session: &mut Session,
) -> anyhow::Result<()> {
    match command {
        Command::Exec { code, timeout_ms } => {
            let timeout = timeout_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or_else(|| cfg.command_timeout());
            let output = execute(session, code, timeout).await;
            print!("{output}");
        }
        Command::Put { local, remote } => {
            let request = match upload {
                Some(request) => request.clone(),
                None => prepare_upload(cfg, local, remote.as_deref()).await?,
            };
            send_file(session, &request)
                .await
                .with_context(|| format!("uploading {}", local.display()))?;
        }
        Command::Get { remote, local } => {
            let local = match local {
                Some(local) => local.clone(),
                None => PathBuf::from(file_name_of(Path::new(remote))?),
            };
            let bytes = receive_file(session, remote, &local)
                .await
                .with_context(|| format!("downloading {remote}"))?;
            info!("wrote {bytes} bytes to {}", local.display());
        }
        Command::Reset { follow } => {
            if *follow {
                let fresh = reset_and_reconnect(session, &cfg.reboot_policy()).await?;
                *session = fresh;
                stream_logs(session).await;
            } else if !reset(session).await {
                bail!("reset commands could not be sent");
            }
        }
        Command::Logs => stream_logs(session).await,
        Command::Find | Command::CacheClear { .. } => {}
    }
    Ok(())
}

async fn stream_logs(session: &mut Session) {
    let running = AtomicBool::new(true);
    let end = follow_output(session, &running, |text| print!("{text}")).await;
    if end == FollowEnd::Disconnected {
        info!("device closed the connection");
    }
}

fn clear_cache(cache: Option<&IpCache>, cfg: &ClientConfig, all: bool) -> anyhow::Result<()> {
    let Some(cache) = cache else {
        bail!("no cache directory available");
    };
    let scope = if all {
        ClearScope::All
    } else {
        ClearScope::Key(cfg.device.cache_key.clone())
    };
    let removed = cache.clear(scope).context("clearing address cache")?;
    info!("removed {removed} cached address(es)");
    Ok(())
}

fn file_name_of(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .with_context(|| format!("{} has no file name", path.display()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Socksvpn - SOCKS5 proxy with a framed packet tunnel
//!
//! This is the main entry point for the Socksvpn server.

use anyhow::Result;
use clap::Parser;
use socksvpn::config::{load_config, Config};
use socksvpn::server::run_server;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Socksvpn - SOCKS5 CONNECT proxy and framed packet tunnel server
#[derive(Parser, Debug)]
#[command(name = "socksvpn")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tunnel listener port
    #[arg(short, long)]
    port: Option<u16>,

    /// SOCKS5 listener port
    #[arg(long)]
    socks_port: Option<u16>,

    /// Run only the SOCKS5 listener
    #[arg(long)]
    socks_only: bool,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

impl Args {
    /// Command-line flags take precedence over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.tunnel.listen.set_port(port);
        }
        if let Some(port) = self.socks_port {
            config.socks.listen.set_port(port);
        }
        if self.socks_only {
            config.tunnel.enabled = false;
        }
    }

    fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            self.log_level.as_str()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(args.log_level(), args.json_log)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };
    args.apply(&mut config);

    info!("Socksvpn v{}", socksvpn::VERSION);
    info!("SOCKS5 listener: {}", config.socks.listen);
    if config.tunnel.enabled {
        info!("Tunnel listener: {}", config.tunnel.listen);
    }

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx_clone.send(true);
    });

    run_server(config, shutdown_rx).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                }
            }
        }
        Err(e) => {
            warn!("Failed to setup SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    // On Windows, only handle Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C, shutting down...");
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "socksvpn",
            "--port",
            "7000",
            "--socks-port",
            "1090",
            "--socks-only",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.tunnel.listen.port(), 7000);
        assert_eq!(config.socks.listen.port(), 1090);
        assert_eq!(config.socks.listen.ip().to_string(), "127.0.0.1");
        assert!(!config.tunnel.enabled);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Args::parse_from(["socksvpn"]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.tunnel.listen.port(), 9876);
        assert_eq!(config.socks.listen.port(), 1080);
        assert!(config.tunnel.enabled);
        assert_eq!(args.log_level(), "info");
    }

    #[test]
    fn test_debug_flag_wins() {
        let args = Args::parse_from(["socksvpn", "--debug", "--log-level", "warn"]);
        assert_eq!(args.log_level(), "debug");
    }
}

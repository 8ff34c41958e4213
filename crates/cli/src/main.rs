//! sippbx: SUBSCRIBE/NOTIFY manager for voicemail and call-state events
//!
//! Reads JSON-lines events on stdin and writes NOTIFY requests and
//! diagnostics as JSON lines on stdout.

mod bus;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sippbx_subscription_core::SippbxConfig;
use tracing::info;

use crate::logging::{log_welcome, setup_logging, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "sippbx")]
#[command(about = "SIP event subscription manager for message-summary and dialog packages")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SIPPBX_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SIPPBX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Voicemail spool directory
    #[arg(long, env = "SIPPBX_VOICEMAIL_ROOT")]
    voicemail_root: Option<PathBuf>,

    /// Seconds between timer ticks
    #[arg(long, default_value_t = 1)]
    tick_interval: u64,
}

impl Cli {
    fn load_config(&self) -> Result<SippbxConfig> {
        let mut config = match &self.config {
            Some(path) => SippbxConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SippbxConfig::default(),
        };
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        if let Some(root) = &self.voicemail_root {
            config.voicemail.root = root.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn tick_interval(&self) -> Result<Duration> {
        if self.tick_interval == 0 {
            bail!("--tick-interval must be at least 1 second");
        }
        Ok(Duration::from_secs(self.tick_interval))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    let tick_interval = cli.tick_interval()?;

    setup_logging(&LoggingConfig::from_settings(&config.logging)?)?;
    log_welcome("sippbx", env!("CARGO_PKG_VERSION"));
    info!(
        "Voicemail spool at {}, sweep every {}s",
        config.voicemail.root.display(),
        config.subscription.sweep_interval
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    bus::run_bus(&config, tick_interval, stdin, tokio::io::stdout(), shutdown).await?;

    info!("sippbx stopped");
    Ok(())
}

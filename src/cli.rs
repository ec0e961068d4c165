//! Command-line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config;

/// mTLS authorization gateway with SPIFFE identity, OPA decisions and an audit trail
#[derive(Parser, Debug)]
#[command(name = "authz-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML); environment variables override it
    #[arg(short, long, env = "AUTHZ_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Path to a .env file loaded before configuration
    #[arg(long, env = "AUTHZ_GATEWAY_ENV_FILE", global = true)]
    pub env_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "AUTHZ_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "AUTHZ_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Call the protected endpoint periodically with a client certificate
    Poll,

    /// Summarize allowed vs denied decisions in an audit log
    TrustScore {
        /// Audit log to read
        #[arg(short, long, env = "AUDIT_PATH", default_value = "/shared/audit.jsonl")]
        input: PathBuf,

        /// Keep watching and print whenever the tally changes
        #[arg(short, long)]
        watch: bool,

        /// Poll interval in watch mode (e.g. "2s", "500ms")
        #[arg(long, default_value = "2s", value_parser = parse_interval)]
        interval: Duration,
    },
}

/// Watch interval: any duration [`config::parse_duration`] accepts, except zero.
fn parse_interval(s: &str) -> Result<Duration, String> {
    let interval = config::parse_duration(s)?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

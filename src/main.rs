//! authz-gateway - mTLS authorization gateway
//!
//! Terminates mutual TLS, asks OPA whether the caller may proceed and keeps an
//! append-only audit trail of every decision.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use authz_gateway::{
    audit::TrustScore,
    cli::{Cli, Command},
    config::{GatewayConfig, PollerConfig, load_env_file},
    gateway::Gateway,
    poller::Poller,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    load_env_file(cli.env_file.as_deref());

    match cli.command {
        Some(Command::Poll) => run_poller(cli.config.as_deref()).await,
        Some(Command::TrustScore {
            ref input,
            watch,
            interval,
        }) => run_trust_score(input, watch, interval).await,
        Some(Command::Serve) | None => run_server(cli.config.as_deref()).await,
    }
}

/// Run the gateway server
async fn run_server(config_path: Option<&Path>) -> ExitCode {
    let config = match GatewayConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listen_addr,
        "Starting authz gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}

/// Run the periodic mTLS caller
async fn run_poller(config_path: Option<&Path>) -> ExitCode {
    let poller = match PollerConfig::load(config_path).and_then(Poller::new) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to create poller: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = poller.run() => {
            if let Err(e) = result {
                error!("Poller error: {e}");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Poller stopped");
        }
    }
    ExitCode::SUCCESS
}

/// Print the allow/deny tally, once or whenever it changes
async fn run_trust_score(input: &Path, watch: bool, interval: Duration) -> ExitCode {
    let mut last: Option<TrustScore> = None;
    loop {
        match TrustScore::load(input).await {
            Ok(tally) => {
                if last != Some(tally) {
                    println!("{tally}");
                    last = Some(tally);
                }
            }
            Err(e) => {
                eprintln!("❌ Failed to read {}: {e}", input.display());
                if !watch {
                    return ExitCode::FAILURE;
                }
            }
        }

        if !watch {
            return ExitCode::SUCCESS;
        }
        tokio::time::sleep(interval).await;
    }
}

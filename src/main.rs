//! spica-mcp executable.
//!
//! Loads configuration, registers every tool and serves MCP over stdio.
//! Logs go to stderr since stdout carries the protocol.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spica_mcp::config::DEFAULT_CONFIG_FILE;
use spica_mcp::{Config, McpServer, McpSession, ToolRegistry};

/// MCP server exposing the Spica REST API and documentation search.
#[derive(Parser, Debug)]
#[command(name = "spica-mcp", version, about)]
struct Cli {
    /// Path to the JSON config file ({"baseUrl": ..., "apiKey": ...})
    #[arg(long, env = "SPICA_MCP_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::load(&cli.config);
    info!(
        base_url = %config.base_url,
        docs = config.docs.is_configured(),
        "starting spica-mcp"
    );

    let registry = match ToolRegistry::standard() {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "failed to register tools");
            return ExitCode::FAILURE;
        }
    };

    let server = McpServer::new(registry, McpSession::new(&config));
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

//! symexec-mcp: stdio MCP server for sandboxed symbolic analysis.
//!
//! Startup order matters: configuration is loaded and bounds-checked before
//! anything else, the process-wide memory cap is applied before the first
//! request, and the transport only starts once both succeed. Configuration
//! bounds violations and cap failures exit non-zero. On shutdown the unit
//! registry is swept as a backstop against leaked isolation entries.

mod server;

use std::sync::Arc;

use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

use symexec::{apply_memory_cap, sweep_registry, Config, ProbeEngine};

use crate::server::SymbolicServer;

/// Sandboxed symbolic-execution analysis over MCP stdio.
#[derive(Parser, Debug)]
#[command(name = "symexec-mcp", version, about)]
struct Args {
    /// Ceiling on candidate paths explored per analysis by the built-in engine
    #[arg(long, default_value_t = 240)]
    max_paths: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the MCP transport.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = apply_memory_cap(config.memory_limit_mb) {
        eprintln!("startup error: {err}");
        std::process::exit(2);
    }

    tracing::info!(
        memory_limit_mb = config.memory_limit_mb,
        code_size_limit = config.code_size_limit,
        "symexec-mcp starting"
    );

    let server = SymbolicServer::new(Arc::new(config), ProbeEngine::new(args.max_paths));
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    let swept = sweep_registry();
    if swept > 0 {
        tracing::warn!(swept, "registry entries remained at shutdown");
    }
    Ok(())
}

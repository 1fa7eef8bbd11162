//! bedside CLI and server entry point.
//!
//! Binary name: `bedside`
//!
//! Loads configuration, sets up tracing, then either prints information or
//! runs the REST + WebSocket server until Ctrl+C / SIGTERM.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use bedside_infra::config::{load_config, resolve_config_path};
use bedside_observe::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or logging
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "bedside", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&TracingOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        json: cli.log_json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = load_config(&config_path).await;

    let result = match cli.command {
        Commands::Config => cli::config::print_config(&config, &config_path, cli.quiet),

        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            serve(AppState::init(config)?, cli.quiet).await
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    };

    shutdown_tracing();
    result
}

async fn serve(state: AppState, quiet: bool) -> anyhow::Result<()> {
    let server = &state.config().server;
    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if !quiet {
        println!(
            "  {} bedside listening on {}",
            console::style("⚡").bold(),
            console::style(format!("http://{addr}")).cyan()
        );
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }
    tracing::info!(%addr, scenarios = state.config().scenarios.len(), "server started");

    let shutdown = CancellationToken::new();
    let reaper = state.orchestrator.reaper().spawn(shutdown.clone());

    let router = http::router::build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Err(e) = reaper.await {
        tracing::warn!(error = %e, "session reaper did not stop cleanly");
    }

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

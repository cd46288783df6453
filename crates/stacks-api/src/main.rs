//! Stacks CLI and server entry point.
//!
//! Binary name: `stacks`
//!
//! Parses CLI arguments, loads configuration, initializes logging, the
//! database and the chat hub, then dispatches to the command handler or
//! starts the HTTP/WebSocket server.

mod cli;
mod http;
mod state;

use std::sync::Arc;

use clap::Parser;

use cli::{Cli, Commands, SessionAction, UserAction};
use state::{AppState, ConcreteHub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (data_dir, config) = state::load_settings().await;

    stacks_observe::tracing_setup::init_tracing(
        cli::verbosity_filter(cli.verbose, cli.quiet),
        config.server.json_logs,
        config.server.otel,
    )
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init(data_dir, config).await?;

    let result = run(cli, state).await;
    stacks_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::User { action } => match action {
            UserAction::Add { name, role } => {
                cli::user::add_user(&state, &name, role, cli.json).await?;
            }
        },

        Commands::Session { action } => match action {
            SessionAction::Issue { user, ttl_hours } => {
                cli::session::issue_session(&state, user, ttl_hours, cli.json).await?;
            }
            SessionAction::Revoke { token } => {
                cli::session::revoke_session(&state, &token, cli.json).await?;
            }
        },

        Commands::Serve { port, host } => {
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            tracing::info!(%addr, data_dir = %state.data_dir.display(), "Server listening");
            if !cli.quiet {
                println!(
                    "  {} Stacks listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let hub = state.hub.clone();
            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal(hub.clone()))
                .await?;

            // No-op if the signal path already drained the hub.
            hub.shutdown().await;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then close every live connection and drain
/// the router before axum stops serving.
async fn shutdown_signal(hub: Arc<ConcreteHub>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, closing connections");
    hub.shutdown().await;
}

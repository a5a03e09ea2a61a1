use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chartmux::chart::ChartController;
use chartmux::config::{ControllerConfig, ServerConfig};
use chartmux::server::{AppState, create_router};

#[derive(Parser)]
#[command(name = "chartmux")]
#[command(about = "Multi-tenant front for a Helm chart repository server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Base URL of the backend chart server
        #[arg(long, env = "CHART_BACKEND_URL")]
        backend_url: String,

        /// Public endpoint of this registry (e.g., "https://registry.example.com").
        /// Absolute chart URLs under "<endpoint>/chartrepo/" are mapped back onto the backend.
        #[arg(long, env = "EXT_ENDPOINT", default_value = "")]
        external_endpoint: String,

        /// Namespace served by the aggregated index and search endpoints (repeatable)
        #[arg(long = "namespace", short = 'n')]
        namespaces: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chartmux=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            backend_url,
            external_endpoint,
            namespaces,
        } => {
            if backend_url.trim().is_empty() {
                bail!("A backend URL is required. Pass --backend-url or set CHART_BACKEND_URL.");
            }

            let config = ServerConfig {
                host,
                port,
                namespaces,
            };
            let controller_config = ControllerConfig::from_env(backend_url, external_endpoint);
            let controller = ChartController::new(controller_config).await?;

            if config.namespaces.is_empty() {
                info!("No namespaces configured; aggregated index and search will be empty");
            }

            let state = Arc::new(AppState::new(
                Arc::new(controller),
                config.namespaces.clone(),
            ));

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

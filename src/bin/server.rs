//! cellarium-server: the remote store for cellarium clients.
//!
//! Holds per-identity record collections and fans the full snapshot out
//! over SSE to every subscriber on any change.

use cellarium::cli::ServerArgs;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app = cellarium::create_router();
    let addr = format!("{}:{}", args.bind, args.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("[server] Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("[server] cellarium-server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("[server] Server error: {}", e);
        std::process::exit(1);
    }
}

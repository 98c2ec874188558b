//! vhub server - standalone notification hub.

use std::future::IntoFuture;
use std::net::SocketAddr;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vhub_core::Hub;
use vhub_server::{create_router, AppState, Args};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_filter = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "vhub_server={0},vhub_core={0},tower_http=info",
                    log_filter
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting vhub server");

    let config = args.into_config()?;
    tracing::info!(
        listen = %config.listen,
        outbox_capacity = config.hub.outbox_capacity(),
        write_timeout_secs = config.pump.write_timeout.as_secs(),
        pong_wait_secs = config.pump.pong_wait.as_secs(),
        ping_interval_secs = ?config.pump.ping_interval.map(|d| d.as_secs()),
        max_frame_bytes = config.max_frame_bytes,
        jwt_leeway_secs = config.jwt_leeway_secs,
        "configuration loaded"
    );

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Spawn shutdown signal handler
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx_clone.send(());
    });

    // Start the hub coordinator
    let (hub, mut coordinator) = Hub::spawn(config.hub.clone(), shutdown_rx);

    let listener = TcpListener::bind(config.listen).await?;
    let app = create_router(AppState::new(hub, config));

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = server_shutdown.recv().await;
    })
    .into_future();
    tokio::pin!(server);

    tracing::info!("server ready, accepting connections");

    tokio::select! {
        result = &mut server => {
            result?;
            // The listener is closed; wait for the hub to close every session.
            if let Err(e) = coordinator.await {
                tracing::error!(error = %e, "notification hub failed during shutdown");
                return Err(anyhow!("notification hub failed: {}", e));
            }
        }
        joined = &mut coordinator => {
            if let Err(e) = joined {
                tracing::error!(error = %e, "notification hub stopped unexpectedly");
                let _ = shutdown_tx.send(());
                return Err(anyhow!("notification hub failed: {}", e));
            }
            server.await?;
        }
    }

    tracing::info!("server shutdown complete");
    Ok(())
}

//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::config::ServerConfig;
use crate::health::Health;
use crate::service::ArchiveService;

use super::routes::routes;

/// Start the HTTP server with provided service.
pub async fn serve(config: ServerConfig, service: Arc<ArchiveService>) -> anyhow::Result<()> {
    let shutdown_rx = service.shutdown_rx();
    let app = routes(service.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Starting passivo server on {}", actual_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.await_explicit_shutdown, shutdown_rx))
        .await?;

    service.set_health(Health::ShuttingDown).await;
    info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (SIGTERM, SIGINT, or /shutdown endpoint).
///
/// A signal handler that cannot be installed is logged and treated as
/// "never fires"; the remaining sources still work.
async fn shutdown_signal(await_explicit_shutdown: bool, mut shutdown_rx: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        if await_explicit_shutdown {
            // Ignore SIGTERM - wait forever (until SIGINT or explicit shutdown)
            tracing::info!("await_explicit_shutdown enabled, ignoring SIGTERM");
            std::future::pending::<()>().await
        } else {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await
                }
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = {
        let _ = await_explicit_shutdown;
        std::future::pending::<()>()
    };

    let explicit_shutdown = async {
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = explicit_shutdown => {
            info!("Shutdown requested via /shutdown endpoint...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;
    use std::time::Duration;

    #[tokio::test]
    async fn explicit_shutdown_resolves_signal() {
        let service = ArchiveService::new(RecordStore::in_memory());
        let waiter = tokio::spawn(shutdown_signal(true, service.shutdown_rx()));
        service.trigger_shutdown();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("shutdown signal did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_request() {
        let service = Arc::new(ArchiveService::new(RecordStore::in_memory()));
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        let server = tokio::spawn(serve(config, service.clone()));
        service.trigger_shutdown();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(service.health().await.state, Health::ShuttingDown);
    }
}

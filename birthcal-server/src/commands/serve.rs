use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use birthcal_core::AppConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::build_service;
use crate::routes;
use crate::server::{self, ConnectionLimits};
use crate::state::AppState;

/// Serve the feed on localhost and keep it fresh until interrupted.
pub async fn run(config: AppConfig) -> Result<()> {
    let port = config.port()?;
    let service = Arc::new(build_service(&config)?);

    let shutdown = CancellationToken::new();
    let (trigger_tx, trigger_rx) = mpsc::channel(1);
    spawn_signal_handlers(shutdown.clone(), trigger_tx);

    let worker = {
        let service = Arc::clone(&service);
        let cancel = shutdown.clone();
        let interval = config.refresh_interval();
        tokio::spawn(async move { service.run(interval, cancel, trigger_rx).await })
    };

    let app = routes::router(AppState::new(Arc::clone(service.cache())));
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind {addr}"))?;

    tracing::info!(component = "server", port, "Server listening");
    println!("birthcal listening on http://{}", addr);

    server::serve(listener, app, ConnectionLimits::default(), shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = worker.await {
        tracing::error!(component = "worker", error = %e, "Sync worker panicked");
    }

    let status = service.status();
    tracing::info!(
        component = "server",
        last_phase = ?status.phase,
        last_success = ?status.last_success,
        last_error = ?status.last_error,
        "Server stopped"
    );

    Ok(())
}

/// Ctrl-C/SIGTERM stop the server; SIGHUP asks for an immediate sync.
fn spawn_signal_handlers(shutdown: CancellationToken, trigger: mpsc::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(component = "server", error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::info!(component = "server", "Shutdown signal received");
        shutdown.cancel();
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut hangup) = signal(SignalKind::hangup()) else {
            return;
        };
        while hangup.recv().await.is_some() {
            // A full channel means a sync is already queued
            let _ = trigger.try_send(());
        }
    });

    #[cfg(not(unix))]
    drop(trigger);
}

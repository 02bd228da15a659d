//! Process bootstrap: one axum server per listener plus the self-metrics
//! server, all stopped together on Ctrl-C / SIGTERM.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use promrelay_core::error::{RelayError, Result};

use crate::app_state::ListenerState;
use crate::config::RelayConfig;
use crate::obs::RelayMetrics;
use crate::router;

/// Serve every configured listener until `shutdown` fires.
///
/// A listener that fails to bind is logged; the others keep serving.
pub async fn run(
    cfg: &RelayConfig,
    self_metrics: Option<String>,
    shutdown: CancellationToken,
) -> Result<()> {
    let metrics = Arc::new(RelayMetrics::new());
    let mut servers = JoinSet::new();

    for (name, lc) in &cfg.listeners {
        let addr = lc.bind_address()?;
        let state = ListenerState::new(name, lc, Arc::clone(&metrics))?;
        let app = router::build_router(state);
        let shutdown = shutdown.clone();
        let name = name.clone();

        servers.spawn(async move {
            tracing::info!(listener = %name, %addr, "start");
            if let Err(e) = serve(&addr, app, shutdown).await {
                tracing::error!(listener = %name, %addr, error = %e, "listener stopped");
            }
        });
    }

    if let Some(addr) = self_metrics {
        let app = router::build_ops_router(Arc::clone(&metrics));
        let shutdown = shutdown.clone();
        servers.spawn(async move {
            tracing::info!(%addr, "listening self metrics");
            if let Err(e) = serve(&addr, app, shutdown).await {
                tracing::error!(%addr, error = %e, "self metrics server stopped");
            }
        });
    }

    while let Some(joined) = servers.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "server task failed");
        }
    }
    Ok(())
}

async fn serve(addr: &str, app: axum::Router, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::Internal(format!("bind {addr} failed: {e}")))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| RelayError::Internal(format!("server error: {e}")))
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
    tracing::info!("signal received, starting graceful shutdown");
}

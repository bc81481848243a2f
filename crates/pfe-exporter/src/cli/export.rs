//! `pfe export`: watch the directory and serve `/metrics` until signalled.

use tokio::sync::watch;
use tracing::info;

use pfe_core::error::{PfeError, Result};

use crate::app_state::AppState;
use crate::config::ExporterConfig;
use crate::router;

pub async fn run_export(cfg: ExporterConfig) -> Result<()> {
    let listen = cfg.export.listen_addr()?;

    if let Some(pid_file) = &cfg.export.pid_file {
        std::fs::write(pid_file, std::process::id().to_string())
            .map_err(|e| PfeError::Internal(format!("could not write pid file {pid_file}: {e}")))?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(cfg, shutdown_rx).await?;
    let app = router::build_router(state.clone());

    info!(%listen, "pfe exporter starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| PfeError::Internal(format!("bind {listen} failed: {e}")))?;

    let draining = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            draining.set_draining();
            let _ = shutdown_tx.send(true);
        })
        .await
        .map_err(|e| PfeError::Internal(format!("server failed: {e}")))?;

    state.store().stopped().await;
    info!("pfe exporter stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("shutting down on SIGINT"),
        _ = terminate => info!("shutting down on SIGTERM"),
    }
}

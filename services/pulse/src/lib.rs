//! Pulse - live monitor-health view
//!
//! Loads a REST snapshot of one monitor, then keeps it current from pushed
//! check results, refetching whenever the backend reports a status change.

pub mod backoff;
pub mod channel;
pub mod config;
pub(crate) mod connection;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod events;
pub mod io;
pub mod metrics;
pub mod session;
pub mod snapshot;
pub mod status_api;
pub mod types;

pub use channel::EventChannelClient;
pub use config::{load_config, Config};
pub use engine::{ReconciliationEngine, ResyncStep};
pub use error::{PulseError, Result};
pub use session::{MonitorSession, MonitorTarget};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::io::{HttpClient, ReqwestHttpClient};
use crate::snapshot::{RestSnapshotLoader, SnapshotLoader};

/// Run the live view described by `config` until Ctrl-C
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    let target = MonitorTarget::new(
        config
            .session
            .team_id
            .clone()
            .ok_or_else(|| PulseError::Config("no team id configured".to_string()))?,
        config
            .session
            .monitor_id
            .clone()
            .ok_or_else(|| PulseError::Config("no monitor id configured".to_string()))?,
        config.session.period,
    );

    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(
        config.api.api_token.clone(),
        Duration::from_secs(config.api.request_timeout_seconds),
    ));
    let loader: Arc<dyn SnapshotLoader> =
        Arc::new(RestSnapshotLoader::new(&config.api.base_url, http));
    let channel = Arc::new(EventChannelClient::new(config.channel.clone()));
    let cancel = CancellationToken::new();

    // The view is still useful from the snapshot alone; reconnects pick the channel up later
    if let Err(e) = channel.connect().await {
        tracing::warn!("Event channel unavailable, showing snapshot only: {}", e);
    }

    let mut session =
        match MonitorSession::open(loader, Arc::clone(&channel), target.clone(), &config).await {
            Ok(session) => session,
            Err(e) => {
                if e.is_terminal() {
                    tracing::error!("Monitor '{}' cannot be shown: {}", target.monitor_id, e);
                } else {
                    tracing::error!(
                        "Initial snapshot for '{}' failed, try again later: {}",
                        target.monitor_id,
                        e
                    );
                }
                channel.disconnect().await?;
                return Err(e);
            }
        };

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        cancel_for_signal.cancel();
    });

    if config.status_api.enabled {
        let port = config.status_api.port;
        let engine = session.engine();
        let cancel_for_api = cancel.clone();

        tokio::spawn(async move {
            let router = status_api::build_router(engine);
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!("Status API listening on http://{}", addr);

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(
                        "Failed to bind status API to port {}: {}. Continuing without it.",
                        port,
                        e
                    );
                    return;
                }
            };

            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    cancel_for_api.cancelled().await;
                })
                .await
                .ok();

            tracing::debug!("Status API stopped");
        });
    }

    tracing::info!("Live view on '{}' started", target.monitor_id);
    log_updates(&session, &cancel).await;

    session.close().await?;
    channel.disconnect().await?;
    tracing::info!("Live view on '{}' stopped", target.monitor_id);
    Ok(())
}

/// Log a one-line summary after every change until cancelled
async fn log_updates(session: &MonitorSession, cancel: &CancellationToken) {
    let mut changes = session.changes();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let engine = session.engine();
                let engine = engine.read().await;
                if let (Some(monitor), Some(stats)) = (engine.monitor(), engine.stats()) {
                    tracing::info!(
                        "{}: {} | uptime {:.2}% ({}/{}) | avg {:.1} ms | resync {}",
                        monitor.id,
                        monitor.last_status,
                        stats.uptime_percentage,
                        stats.successful_checks,
                        stats.total_checks,
                        stats.avg_response_time,
                        engine.resync_state()
                    );
                }
            }
        }
    }
}

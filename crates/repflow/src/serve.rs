// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `repflow serve` command implementation.
//!
//! Wires the full orchestrator: SQLite storage with a startup sweep over
//! abandoned runs, the Anthropic provider, the source fan-out (public web,
//! internal knowledge, semantic index), the workflow engine with tracing
//! and metrics observers, the event broadcaster, and the HTTP/WebSocket
//! gateway. Supports graceful shutdown via signal handlers.

use std::sync::Arc;
use std::time::Duration;

use repflow_anthropic::AnthropicProvider;
use repflow_config::RepflowConfig;
use repflow_core::error::RepflowError;
use repflow_core::{EventSink, StoragePort};
use repflow_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig};
use repflow_metrics::{MetricsObserver, PrometheusAdapter};
use repflow_sources::{
    ContentIndex, FidelitySearcher, IndexSource, MyGpsSearcher, SourceFanOut,
};
use repflow_storage::SqliteStorage;
use repflow_workflow::engine::EngineConfig;
use repflow_workflow::{EventBroadcaster, TracingObserver, WorkflowEngine};
use tracing::{info, warn};

/// Path of the content index database, derived from the main database path.
pub fn index_path(database_path: &str) -> String {
    format!("{database_path}.index")
}

/// Initializes the tracing subscriber from the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("repflow={log_level},info")));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Builds the source fan-out from configuration.
///
/// Registration order is the preference order: public site first, then
/// internal knowledge, then the local index.
async fn build_fanout(config: &RepflowConfig) -> Result<SourceFanOut, RepflowError> {
    let mut fanout = SourceFanOut::new();

    fanout.register(Arc::new(FidelitySearcher::new(
        &config.search.fidelity_base_url,
    )?));

    fanout.register(Arc::new(MyGpsSearcher::new(
        config.search.mygps_api_url.clone(),
        config.search.mygps_api_key.clone(),
    )?));

    if config.search.index_enabled {
        let index = ContentIndex::open(&index_path(&config.storage.database_path)).await?;
        fanout.register(Arc::new(IndexSource::new(Arc::new(index))));
    }

    info!(sources = ?fanout.source_tags(), "source fan-out configured");
    Ok(fanout)
}

/// Runs the `repflow serve` command until a shutdown signal arrives.
pub async fn run_serve(config: RepflowConfig) -> Result<(), RepflowError> {
    init_tracing(&config.agent.log_level);

    info!(name = config.agent.name.as_str(), "starting repflow serve");

    // Storage first: everything else persists through it.
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;

    // Prometheus recorder before any metric is recorded.
    let prometheus = match PrometheusAdapter::new() {
        Ok(adapter) => Some(Arc::new(adapter)),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable, continuing without /metrics");
            None
        }
    };

    let provider = Arc::new(AnthropicProvider::new(&config.anthropic)?);
    let fanout = Arc::new(build_fanout(&config).await?);
    let events = Arc::new(EventBroadcaster::default());

    let engine = Arc::new(
        WorkflowEngine::new(
            provider,
            fanout,
            storage.clone() as Arc<dyn StoragePort>,
            events.clone() as Arc<dyn EventSink>,
            EngineConfig::from_config(&config),
        )
        .with_observer(Arc::new(TracingObserver))
        .with_observer(Arc::new(MetricsObserver::default())),
    );

    // Crash recovery: finalize runs a previous process left in flight.
    let swept = engine.recover_abandoned().await?;
    if swept > 0 {
        info!(swept, "startup sweep finalized abandoned runs");
    }

    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
        bearer_token: config.gateway.bearer_token.clone(),
    };
    let state = GatewayState {
        engine: engine.clone(),
        storage: storage.clone() as Arc<dyn StoragePort>,
        events,
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render: prometheus
                .map(|p| Arc::new(move || p.render()) as Arc<dyn Fn() -> String + Send + Sync>),
        },
    };

    let server_handle = tokio::spawn(async move {
        if let Err(e) = repflow_gateway::start_server(&server_config, state).await {
            tracing::error!(error = %e, "gateway server error");
        }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    server_handle.abort();

    // Cancel in-flight runs; each aborts at its next state boundary and
    // finalizes its record before releasing the single-flight slot.
    let cancelled = engine.cancel_all_runs();
    if cancelled > 0 {
        info!(cancelled, "cancelling in-flight runs");
        let drain_deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !engine.flights().is_empty() && tokio::time::Instant::now() < drain_deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if !engine.flights().is_empty() {
            warn!("runs still in flight at drain deadline; the startup sweep will finalize them");
        }
    }

    storage.close().await?;

    info!("repflow serve stopped");
    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_path_derives_from_database_path() {
        assert_eq!(index_path("repflow.db"), "repflow.db.index");
        assert_eq!(index_path("/var/lib/repflow/data.db"), "/var/lib/repflow/data.db.index");
    }
}

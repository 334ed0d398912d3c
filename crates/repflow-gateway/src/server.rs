// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use repflow_core::{RepflowError, StoragePort};
use repflow_workflow::{EventBroadcaster, WorkflowEngine};
use tower_http::cors::CorsLayer;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;
use crate::ws;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The workflow engine driving runs.
    pub engine: Arc<WorkflowEngine>,
    /// Persistence port for CRUD handlers.
    pub storage: Arc<dyn StoragePort>,
    /// Event broadcaster backing the WebSocket streams.
    pub events: Arc<EventBroadcaster>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Health state for unauthenticated endpoints.
    pub health: HealthState,
}

/// Gateway server configuration (mirrors GatewayConfig from repflow-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Bearer token for auth (None = auth disabled).
    pub bearer_token: Option<String>,
}

/// Builds the gateway router over the shared state.
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    // Unauthenticated public routes (health + metrics for systemd and Prometheus).
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    // Routes requiring authentication.
    let api_routes = Router::new()
        .route("/v1/conversations", post(handlers::post_conversations))
        .route("/v1/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/v1/conversations/{id}/status",
            patch(handlers::patch_conversation_status),
        )
        .route(
            "/v1/conversations/{id}/messages",
            post(handlers::post_messages).get(handlers::get_messages),
        )
        .route("/v1/conversations/{id}/runs", post(handlers::post_runs))
        .route(
            "/v1/conversations/{id}/runs/cancel",
            post(handlers::post_cancel_run),
        )
        .route(
            "/v1/conversations/{id}/resolutions",
            get(handlers::list_resolutions),
        )
        .route("/v1/resolutions/{id}", get(handlers::get_resolution))
        .route(
            "/v1/resolutions/{id}/approval",
            post(handlers::post_approval),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state.clone());

    // WebSocket route (read-only event stream; no bearer middleware so
    // browser clients can connect directly).
    let ws_routes = Router::new()
        .route("/v1/conversations/{id}/events", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
}

/// Start the gateway HTTP/WebSocket server and serve until the task is
/// aborted.
pub async fn start_server(config: &ServerConfig, state: GatewayState) -> Result<(), RepflowError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RepflowError::Internal(format!(
                "failed to bind gateway to {addr}: {e}"
            )))?;

    tracing::info!("gateway server listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| RepflowError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use repflow_config::model::StorageConfig;
    use repflow_core::NullEventSink;
    use repflow_storage::SqliteStorage;
    use repflow_workflow::engine::EngineConfig;
    use repflow_sources::SourceFanOut;

    use super::*;

    /// Building the router exercises every route registration; a bad path
    /// pattern or missing handler fails here.
    #[tokio::test]
    async fn router_builds_over_real_state() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("gateway.db");
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();

        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(NoopProvider),
            Arc::new(SourceFanOut::new()),
            storage.clone() as Arc<dyn StoragePort>,
            Arc::new(NullEventSink),
            EngineConfig::from_config(&repflow_config::RepflowConfig::default()),
        ));

        let state = GatewayState {
            engine,
            storage,
            events: Arc::new(EventBroadcaster::default()),
            auth: AuthConfig { bearer_token: None },
            health: HealthState {
                start_time: Instant::now(),
                prometheus_render: None,
            },
        };
        let _router = build_router(state);
    }

    struct NoopProvider;

    #[async_trait::async_trait]
    impl repflow_core::ComponentAdapter for NoopProvider {
        fn name(&self) -> &str {
            "noop"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> repflow_core::AdapterType {
            repflow_core::AdapterType::Provider
        }
        async fn health_check(
            &self,
        ) -> Result<repflow_core::HealthStatus, RepflowError> {
            Ok(repflow_core::HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), RepflowError> {
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl repflow_core::LlmProvider for NoopProvider {
        async fn complete(
            &self,
            request: repflow_core::types::CompletionRequest,
        ) -> Result<repflow_core::types::CompletionResponse, RepflowError> {
            Ok(repflow_core::types::CompletionResponse {
                text: String::new(),
                model: request.model,
                usage: repflow_core::types::TokenUsage::default(),
            })
        }
    }
}

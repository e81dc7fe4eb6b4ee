//! HTTP and MCP front door for the Thunder flow engine.
//!
//! A thin axum layer: request/response mapping, error-class translation,
//! and the MCP tool surface. All behavior lives in the engine and the flow
//! service.

mod error;
mod execute;
mod flows;
mod mcp;
mod meta;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use thunder_core::config::DefaultFlowConfig;
use thunder_core::provider::ApplicationProvider;
use thunder_flow::FlowEngine;
use thunder_store::FlowService;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use meta::{FlowMetadataProvider, MetaTargetType};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub flows: Arc<FlowService>,
    pub engine: Arc<FlowEngine>,
    pub applications: Arc<dyn ApplicationProvider>,
    pub metadata: Arc<dyn FlowMetadataProvider>,
    pub default_flows: DefaultFlowConfig,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/flow/execute", post(execute::execute_flow))
        .route(
            "/flow/execute/{flow_id}",
            axum::routing::delete(execute::cancel_flow),
        )
        .route("/flow/meta", get(meta::flow_meta))
        .route("/flows", get(flows::list_flows).post(flows::create_flow))
        .route(
            "/flows/{id}",
            get(flows::get_flow)
                .put(flows::update_flow)
                .delete(flows::delete_flow),
        )
        .route("/flows/{id}/versions", get(flows::list_versions))
        .route("/flows/{id}/versions/{version}", get(flows::get_version))
        .route("/flows/{id}/restore", post(flows::restore_flow))
        .route("/mcp", post(mcp::handle_rpc))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP" }))
}

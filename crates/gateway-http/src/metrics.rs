//! Supplemented ambient endpoints: `/healthz`, `/metrics`, `/v0/stats`.
//! None of these are named by the core spec; they exist because every
//! complete deployment of a gateway like this one needs them.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use gateway_core::GatewayError;
use prometheus::Encoder;
use serde_json::json;

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz)).route("/metrics", get(metrics)).route("/v0/stats", get(stats))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let families = state.metrics.gather();
    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
    }
    ([(header::CONTENT_TYPE, encoder.format_type())], buffer)
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let servers = state.store.list_servers().await.map_err(GatewayError::from)?;
    let mut tool_count = 0usize;
    let mut enabled_tool_count = 0usize;
    for server in &servers {
        let tools = state.store.list_tools_by_server(&server.name).await.map_err(GatewayError::from)?;
        tool_count += tools.len();
        enabled_tool_count += tools.iter().filter(|t| t.enabled).count();
    }
    let groups = state.store.list_groups().await.map_err(GatewayError::from)?;
    Ok(Json(json!({
        "servers": servers.len(),
        "tools": tool_count,
        "tools_enabled": enabled_tool_count,
        "tool_groups": groups.len(),
    })))
}

//! `GET/POST /servers`, `DELETE /servers/{name}` (spec §6).

use crate::auth_extract::api_context;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get};
use axum::{Json, Router};
use gateway_core::service::RegisterServerInput;
use gateway_store::TransportConfig;
use serde::Deserialize;
use serde_json::{json, Value};

pub fn router() -> Router<AppState> {
    Router::new().route("/servers", get(list_servers).post(register_server)).route("/servers/:name", delete(deregister_server))
}

async fn list_servers(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    api_context(&state, &headers).await?;
    let servers = state.store.list_servers().await.map_err(gateway_core::GatewayError::from)?;
    let out: Vec<Value> = servers
        .into_iter()
        .map(|s| json!({ "name": s.name, "description": s.description, "transport": s.transport }))
        .collect();
    Ok(Json(json!({ "servers": out })))
}

#[derive(Debug, Deserialize)]
struct RegisterServerRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(flatten)]
    transport: TransportConfig,
}

async fn register_server(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<RegisterServerRequest>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    state
        .service
        .register_server(RegisterServerInput { name: body.name.clone(), description: body.description, transport: body.transport })
        .await?;
    Ok(Json(json!({ "name": body.name, "status": "registered" })))
}

async fn deregister_server(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    state.service.deregister_server(&name).await?;
    Ok(Json(json!({ "name": name, "status": "deregistered" })))
}

//! `GET /tools?server=…`, `GET /tool?name=…`, `POST /tools/invoke`,
//! `POST /tools/enable?entity=…`, `POST /tools/disable?entity=…` (spec §6).

use crate::auth_extract::api_context;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use gateway_core::GatewayError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tool", get(get_tool))
        .route("/tools/invoke", post(invoke_tool))
        .route("/tools/enable", post(enable_tools))
        .route("/tools/disable", post(disable_tools))
}

#[derive(Debug, Deserialize)]
struct ServerQuery {
    server: String,
}

async fn list_tools(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<ServerQuery>) -> ApiResult<Json<Value>> {
    api_context(&state, &headers).await?;
    let tools = state.store.list_tools_by_server(&q.server).await.map_err(GatewayError::from)?;
    let out: Vec<Value> = tools
        .into_iter()
        .map(|t| json!({ "name": gateway_names::join(&t.server, &t.name), "description": t.description, "enabled": t.enabled, "input_schema": t.input_schema }))
        .collect();
    Ok(Json(json!({ "tools": out })))
}

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: String,
}

async fn get_tool(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<NameQuery>) -> ApiResult<Json<Value>> {
    api_context(&state, &headers).await?;
    let (server, short) = gateway_names::split(&q.name).ok_or_else(|| GatewayError::InvalidName(q.name.clone()))?;
    let tool = state.store.get_tool(server, short).await.map_err(GatewayError::from)?;
    Ok(Json(json!({ "name": q.name, "description": tool.description, "enabled": tool.enabled, "input_schema": tool.input_schema })))
}

#[derive(Debug, Deserialize)]
struct InvokeToolRequest {
    name: String,
    #[serde(default)]
    arguments: Option<HashMap<String, Value>>,
}

async fn invoke_tool(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<InvokeToolRequest>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    let args = body.arguments.map(|m| m.into_iter().collect());
    let result = state.service.invoke_tool(&ctx, &body.name, args).await?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
struct EntityQuery {
    entity: String,
}

async fn enable_tools(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<EntityQuery>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let changed = state.service.enable_tools(&q.entity).await?;
    Ok(Json(json!({ "changed": changed })))
}

async fn disable_tools(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<EntityQuery>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let changed = state.service.disable_tools(&q.entity).await?;
    Ok(Json(json!({ "changed": changed })))
}

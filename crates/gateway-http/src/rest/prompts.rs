//! Prompt equivalents of the tool routes in `tools.rs` (spec §6: "prompt
//! equivalents"): `GET /prompts?server=…`, `GET /prompt?name=…`,
//! `POST /prompts/get`, `POST /prompts/enable?entity=…`,
//! `POST /prompts/disable?entity=…`.

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
        .route("/prompts", get(list_prompts))
        .route("/prompt", get(get_prompt))
        .route("/prompts/get", post(render_prompt))
        .route("/prompts/enable", post(enable_prompts))
        .route("/prompts/disable", post(disable_prompts))
}

#[derive(Debug, Deserialize)]
struct ServerQuery {
    server: String,
}

async fn list_prompts(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<ServerQuery>) -> ApiResult<Json<Value>> {
    api_context(&state, &headers).await?;
    let prompts = state.store.list_prompts_by_server(&q.server).await.map_err(GatewayError::from)?;
    let out: Vec<Value> = prompts
        .into_iter()
        .map(|p| json!({ "name": gateway_names::join(&p.server, &p.name), "description": p.description, "enabled": p.enabled, "argument_schema": p.argument_schema }))
        .collect();
    Ok(Json(json!({ "prompts": out })))
}

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: String,
}

async fn get_prompt(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<NameQuery>) -> ApiResult<Json<Value>> {
    api_context(&state, &headers).await?;
    let (server, short) = gateway_names::split(&q.name).ok_or_else(|| GatewayError::InvalidName(q.name.clone()))?;
    let prompt = state.store.get_prompt(server, short).await.map_err(GatewayError::from)?;
    Ok(Json(json!({ "name": q.name, "description": prompt.description, "enabled": prompt.enabled, "argument_schema": prompt.argument_schema })))
}

#[derive(Debug, Deserialize)]
struct RenderPromptRequest {
    name: String,
    #[serde(default)]
    arguments: Option<HashMap<String, Value>>,
}

async fn render_prompt(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<RenderPromptRequest>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    let args = body.arguments.map(|m| m.into_iter().collect());
    let result = state.service.get_prompt_with_args(&ctx, &body.name, args).await?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
struct EntityQuery {
    entity: String,
}

async fn enable_prompts(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<EntityQuery>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let changed = state.service.enable_prompts(&q.entity).await?;
    Ok(Json(json!({ "changed": changed })))
}

async fn disable_prompts(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<EntityQuery>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let changed = state.service.disable_prompts(&q.entity).await?;
    Ok(Json(json!({ "changed": changed })))
}

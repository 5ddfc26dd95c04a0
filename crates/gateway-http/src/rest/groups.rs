//! `GET/POST /tool-groups`, `GET/PATCH/DELETE /tool-groups/{name}` (spec §6).

use crate::auth_extract::api_context;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use gateway_core::GatewayError;
use gateway_store::GroupConfig;
use serde_json::{json, Value};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tool-groups", get(list_groups).post(create_group))
        .route("/tool-groups/:name", get(get_group).patch(update_group).delete(delete_group))
}

fn to_json(name: &str, config: &GroupConfig) -> Value {
    json!({
        "name": name,
        "description": config.description,
        "included_tools": config.included_tools,
        "included_servers": config.included_servers,
        "excluded_tools": config.excluded_tools,
    })
}

async fn list_groups(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    api_context(&state, &headers).await?;
    let groups = state.store.list_groups().await.map_err(GatewayError::from)?;
    let out: Vec<Value> = groups.iter().map(|g| to_json(&g.name, &g.config)).collect();
    Ok(Json(json!({ "tool_groups": out })))
}

async fn get_group(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    api_context(&state, &headers).await?;
    let group = state.store.get_group(&name).await.map_err(GatewayError::from)?;
    Ok(Json(to_json(&group.name, &group.config)))
}

async fn create_group(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<GroupRequest>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let config = body.config();
    state.groups.create_group(&body.name, config.clone()).await?;
    Ok(Json(to_json(&body.name, &config)))
}

async fn update_group(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>, Json(body): Json<GroupPatch>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let current = state.store.get_group(&name).await.map_err(GatewayError::from)?.config;
    let new_config = body.apply(current);
    let old_config = state.groups.update_group(&name, new_config.clone()).await?;
    Ok(Json(json!({ "previous": to_json(&name, &old_config), "current": to_json(&name, &new_config) })))
}

async fn delete_group(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    state.groups.delete_group(&name).await?;
    state.group_mcp.evict(&name).await;
    Ok(Json(json!({ "name": name, "status": "deleted" })))
}

#[derive(Debug, serde::Deserialize)]
struct GroupRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    included_tools: Vec<String>,
    #[serde(default)]
    included_servers: Vec<String>,
    #[serde(default)]
    excluded_tools: Vec<String>,
}

impl GroupRequest {
    fn config(&self) -> GroupConfig {
        GroupConfig {
            description: self.description.clone(),
            included_tools: self.included_tools.clone(),
            included_servers: self.included_servers.clone(),
            excluded_tools: self.excluded_tools.clone(),
        }
    }
}

/// All fields optional: a field absent from the patch body leaves the
/// current value untouched, matching a conventional `PATCH` semantics
/// rather than `PUT`'s full-replace.
#[derive(Debug, serde::Deserialize)]
struct GroupPatch {
    description: Option<String>,
    included_tools: Option<Vec<String>>,
    included_servers: Option<Vec<String>>,
    excluded_tools: Option<Vec<String>>,
}

impl GroupPatch {
    fn apply(self, mut current: GroupConfig) -> GroupConfig {
        if let Some(d) = self.description {
            current.description = d;
        }
        if let Some(t) = self.included_tools {
            current.included_tools = t;
        }
        if let Some(s) = self.included_servers {
            current.included_servers = s;
        }
        if let Some(e) = self.excluded_tools {
            current.excluded_tools = e;
        }
        current
    }
}

//! Enterprise-only surfaces (spec §6): `/users`, `/clients`,
//! `/users/whoami`, `POST /init`.

use crate::auth_extract::api_context;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use gateway_core::GatewayError;
use gateway_store::{Mode, NewMcpClient, NewUser, Role};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/whoami", get(whoami))
        .route("/users/:username", axum::routing::delete(delete_user))
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/:name", axum::routing::delete(delete_client))
        .route("/init", post(init_server))
}

async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let users = state.store.list_users().await.map_err(GatewayError::from)?;
    let out: Vec<Value> = users.into_iter().map(|u| json!({ "username": u.username, "role": u.role.as_str() })).collect();
    Ok(Json(json!({ "users": out })))
}

#[derive(Debug, Deserialize)]
struct NewUserRequest {
    username: String,
    role: String,
    access_token: String,
}

async fn create_user(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<NewUserRequest>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let role = Role::parse(&body.role).ok_or_else(|| GatewayError::invalid_input(format!("unknown role '{}'", body.role)))?;
    state.store.create_user(NewUser { username: body.username.clone(), role, access_token: body.access_token }).await.map_err(GatewayError::from)?;
    Ok(Json(json!({ "username": body.username, "role": role.as_str() })))
}

async fn delete_user(State(state): State<AppState>, headers: HeaderMap, Path(username): Path<String>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    state.store.delete_user(&username).await.map_err(GatewayError::from)?;
    Ok(Json(json!({ "username": username, "status": "deleted" })))
}

async fn whoami(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    let body = match &ctx.user {
        Some(user) => json!({ "mode": ctx.mode.map(|m| m.as_str()), "username": user.username, "role": user.role.as_str() }),
        None => json!({ "mode": ctx.mode.map(|m| m.as_str()), "username": Value::Null }),
    };
    Ok(Json(body))
}

async fn list_clients(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    let clients = state.store.list_clients().await.map_err(GatewayError::from)?;
    let out: Vec<Value> = clients.into_iter().map(|c| json!({ "name": c.name, "description": c.description, "allow_list": c.allow_list })).collect();
    Ok(Json(json!({ "clients": out })))
}

#[derive(Debug, Deserialize)]
struct NewClientRequest {
    name: String,
    #[serde(default)]
    description: String,
    access_token: String,
    #[serde(default)]
    allow_list: Vec<String>,
}

async fn create_client(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<NewClientRequest>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    state
        .store
        .create_client(NewMcpClient { name: body.name.clone(), description: body.description, access_token: body.access_token, allow_list: body.allow_list })
        .await
        .map_err(GatewayError::from)?;
    Ok(Json(json!({ "name": body.name, "status": "created" })))
}

async fn delete_client(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let ctx = api_context(&state, &headers).await?;
    gateway_core::auth::require_admin(&ctx)?;
    state.store.delete_client(&name).await.map_err(GatewayError::from)?;
    Ok(Json(json!({ "name": name, "status": "deleted" })))
}

#[derive(Debug, Deserialize)]
struct InitRequest {
    mode: String,
}

/// Idempotent: returns whether this call actually performed the
/// initialisation (`gateway_store::RegistryStore::init_server_config`).
async fn init_server(State(state): State<AppState>, Json(body): Json<InitRequest>) -> ApiResult<Json<Value>> {
    let mode = Mode::parse(&body.mode).ok_or_else(|| GatewayError::invalid_input(format!("unknown mode '{}'", body.mode)))?;
    let did_init = state.store.init_server_config(mode).await.map_err(GatewayError::from)?;
    Ok(Json(json!({ "mode": mode.as_str(), "initialized": did_init })))
}

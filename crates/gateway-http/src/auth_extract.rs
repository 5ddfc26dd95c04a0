//! Pulls the bearer token out of an inbound request and resolves it to an
//! [`InvocationContext`] via the Auth & Mode Gate (spec §4.6, §6 "Client
//! authentication").

use crate::error::ApiResult;
use crate::state::AppState;
use axum::http::HeaderMap;
use gateway_core::{GatewayError, InvocationContext};
use gateway_store::RegistryStore;
use std::sync::Arc;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

/// Context for the `/v0` REST surface: resolves to a `User` in enterprise mode.
pub async fn api_context(state: &AppState, headers: &HeaderMap) -> ApiResult<InvocationContext> {
    let mode = state.store.get_server_config().await.map_err(GatewayError::from)?.mode;
    Ok(gateway_core::auth::authenticate_api(&state.store, mode, bearer_token(headers)).await?)
}

/// Context for the MCP proxy endpoints: resolves to an `McpClient` in
/// enterprise mode. Takes just the store (not the full [`AppState`]) so the
/// MCP mount layer doesn't need to depend on state that isn't built yet when
/// a tool group's router is constructed lazily.
pub async fn proxy_context(store: &Arc<RegistryStore>, headers: &HeaderMap) -> ApiResult<InvocationContext> {
    let mode = store.get_server_config().await.map_err(GatewayError::from)?.mode;
    Ok(gateway_core::auth::authenticate_proxy(store, mode, bearer_token(headers)).await?)
}

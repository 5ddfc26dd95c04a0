//! The gateway's HTTP surface: the `/v0` REST admin API, the downstream MCP
//! endpoints (`/mcp`, `/sse` + `/message`) for the main proxies and for every
//! tool group, and the ambient `/healthz` + `/metrics` endpoints.
//!
//! [`build_router`] is the crate's single entry point, consumed by the
//! binary crate after it wires up the registry store, the core service, and
//! the group manager.

pub mod auth_extract;
pub mod error;
pub mod group_mcp;
pub mod mcp_mounts;
pub mod metrics;
pub mod middleware;
pub mod rest;
pub mod state;

pub use group_mcp::GroupMcpCache;
pub use state::AppState;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;

/// Builds the complete application router from an already-assembled
/// [`AppState`], ready for `axum::serve`.
pub fn build_router(state: AppState) -> Router {
    let main_http = mcp_mounts::streamable_http_router(state.service.http_proxy(), state.store.clone());
    let main_sse = mcp_mounts::sse_router(state.service.sse_proxy(), state.store.clone());

    let group_mounts =
        Router::new().route("/v0/groups/:name/*rest", any(dispatch_group)).with_state(state.group_mcp.clone());

    let app = Router::new()
        .nest("/v0", rest::router())
        .merge(metrics::router())
        .nest("/mcp", main_http)
        .merge(main_sse)
        .merge(group_mounts)
        .with_state(state);

    middleware::apply(app, &middleware::MiddlewareConfig::default())
}

/// Dynamic dispatch for `/v0/groups/{name}/mcp` and `/v0/groups/{name}/sse`
/// + `/message`. Tool groups are created and deleted at runtime, so unlike
/// the main proxies their routers can't be laid out statically; this
/// handler looks one up (building it on first use) via [`GroupMcpCache`] and
/// forwards the request into it with the group prefix stripped.
async fn dispatch_group(
    State(cache): State<Arc<GroupMcpCache>>,
    Path((name, rest)): Path<(String, String)>,
    mut request: Request,
) -> Response {
    let Some(router) = cache.router_for(&name).await else {
        return (StatusCode::NOT_FOUND, format!("no such tool group '{name}'")).into_response();
    };

    let query = request.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = Some(format!("/{rest}{query}").parse().expect("rewritten path is valid"));
    *request.uri_mut() = axum::http::Uri::from_parts(parts).expect("rewritten uri is valid");

    router.oneshot(request).await.expect("router service is infallible").into_response()
}

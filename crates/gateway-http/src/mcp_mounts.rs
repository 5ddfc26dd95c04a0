//! Mounts [`ProxyInstance`]s as MCP protocol endpoints under the axum app:
//! the streamable-HTTP `/mcp` style endpoints and the legacy SSE `/sse` +
//! `/message` pair, for both the main HTTP/SSE proxies and every tool
//! group's own pair (spec §6 "MCP endpoints exposed").
//!
//! Grounded on the `StreamableHttpService`/`nest_service` mounting pattern
//! used by the bouncer-style gateways in the retrieval pack, adapted so the
//! per-session factory clones a cheap `Arc` handle to one shared,
//! long-lived [`ProxyInstance`] rather than constructing a fresh instance
//! per connection (a group's tool table must stay shared across every
//! client that reaches it).

use crate::auth_extract::proxy_context;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use gateway_core::ProxyInstance;
use gateway_store::RegistryStore;
use rmcp::model as mcp;
use rmcp::service::{NotificationContext, RequestContext};
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{RoleServer, Service};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Thin `Clone` wrapper so the session factory required by
/// `StreamableHttpService`/`SseServer` can hand out cheap handles to the
/// one shared, mutable-table proxy instance instead of building a new one
/// per connection.
#[derive(Clone)]
struct SharedProxy(Arc<ProxyInstance>);

impl Service<RoleServer> for SharedProxy {
    async fn handle_request(
        &self,
        request: mcp::ClientRequest,
        context: RequestContext<RoleServer>,
    ) -> Result<mcp::ServerResult, mcp::ErrorData> {
        self.0.handle_request(request, context).await
    }

    async fn handle_notification(
        &self,
        notification: mcp::ClientNotification,
        context: NotificationContext<RoleServer>,
    ) -> Result<(), mcp::ErrorData> {
        self.0.handle_notification(notification, context).await
    }

    fn get_info(&self) -> mcp::ServerInfo {
        self.0.get_info()
    }
}

/// Resolves the caller's bearer token to an [`InvocationContext`] and
/// stashes it in the request's extensions, where `StreamableHttpService`
/// and our SSE handlers forward it down into `RequestContext::extensions`
/// for [`ProxyInstance::handle_request`] to read (spec §4.6).
async fn attach_proxy_context(State(store): State<Arc<RegistryStore>>, mut request: Request, next: Next) -> Response {
    match proxy_context(&store, request.headers()).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// `/mcp`-style streamable HTTP mount. One `StreamableHttpService` per
/// call; each holds its own `LocalSessionManager` so groups don't share
/// session state with the main proxies or with each other.
pub fn streamable_http_router(proxy: Arc<ProxyInstance>, store: Arc<RegistryStore>) -> Router {
    let service = StreamableHttpService::new(
        move || Ok(SharedProxy(proxy.clone())),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig { stateful_mode: true, sse_keep_alive: Some(std::time::Duration::from_secs(15)) },
    );
    Router::new().nest_service("/", service).layer(middleware::from_fn_with_state(store, attach_proxy_context))
}

/// `/sse` + `/message` legacy transport mount, merged into the caller's
/// router rather than bound to its own listener (the `bind` field is
/// required by `SseServerConfig` but unused in this embedded mode).
pub fn sse_router(proxy: Arc<ProxyInstance>, store: Arc<RegistryStore>) -> Router {
    let bind: SocketAddr = "0.0.0.0:0".parse().expect("static address");
    let config = SseServerConfig {
        bind,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: CancellationToken::new(),
        sse_keep_alive: Some(std::time::Duration::from_secs(15)),
    };
    let (sse_server, router) = SseServer::new(config);
    let _ct = sse_server.with_service(move || SharedProxy(proxy.clone()));
    router.layer(middleware::from_fn_with_state(store, attach_proxy_context))
}


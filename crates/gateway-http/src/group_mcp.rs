//! Lazily-built, cached MCP mounts for tool groups.
//!
//! Groups are created and deleted at runtime (`POST/DELETE /v0/tool-groups`),
//! so their `/v0/groups/{name}/mcp`+`/sse` endpoints can't be laid out as
//! static axum routes at startup the way the main `/mcp`+`/sse` mounts can.
//! This cache builds a group's router the first time it's requested and
//! reuses it afterwards — `StreamableHttpService` owns a `LocalSessionManager`
//! that must outlive a client's session, so rebuilding the router on every
//! request would silently drop every in-flight session.
//!
//! The `ProxyInstance` itself is mutated in place as tools are added or
//! removed (spec §4.5), so an already-cached router stays accurate across
//! those changes without needing to be rebuilt. Only group *deletion* needs
//! an explicit [`GroupMcpCache::evict`] call, made from the `DELETE
//! /v0/tool-groups/{name}` handler.

use crate::mcp_mounts;
use axum::Router;
use gateway_core::ToolGroupManager;
use gateway_store::RegistryStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct GroupMcpCache {
    groups: Arc<ToolGroupManager>,
    store: Arc<RegistryStore>,
    cache: RwLock<HashMap<String, Router>>,
}

impl GroupMcpCache {
    pub fn new(groups: Arc<ToolGroupManager>, store: Arc<RegistryStore>) -> Arc<Self> {
        Arc::new(Self { groups, store, cache: RwLock::new(HashMap::new()) })
    }

    pub async fn router_for(&self, name: &str) -> Option<Router> {
        if let Some(router) = self.cache.read().await.get(name).cloned() {
            return Some(router);
        }

        let http_proxy = self.groups.http_proxy_for(name).await?;
        let sse_proxy = self.groups.sse_proxy_for(name).await?;
        let router = Router::new()
            .nest("/mcp", mcp_mounts::streamable_http_router(http_proxy, self.store.clone()))
            .merge(mcp_mounts::sse_router(sse_proxy, self.store.clone()));

        self.cache.write().await.insert(name.to_string(), router.clone());
        Some(router)
    }

    pub async fn evict(&self, name: &str) {
        self.cache.write().await.remove(name);
    }
}

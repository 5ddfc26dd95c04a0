//! Tool Group Manager (spec §4.5).
//!
//! Owns two maps (group name → proxy instance), one for tools reached
//! through streamable-HTTP servers and one for tools reached through SSE
//! servers, each behind its own read/write lock. Subscribes to the MCP
//! Service's `ToolAdded`/`ToolsRemoved` callbacks so a group's proxies
//! stay in sync with the live tool index without the MCP Service knowing
//! groups exist.

use crate::error::{GatewayError, Result};
use crate::model::ProxyKind;
use crate::proxy::ProxyInstance;
use crate::service::{McpService, ToolAddedHook, ToolsRemovedHook};
use gateway_store::{GroupConfig, RegistryStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct ToolGroupManager {
    store: Arc<RegistryStore>,
    service: Arc<McpService>,
    http_groups: RwLock<HashMap<String, Arc<ProxyInstance>>>,
    sse_groups: RwLock<HashMap<String, Arc<ProxyInstance>>>,
}

impl ToolGroupManager {
    /// Subscribes to the service's callbacks, then replays every stored
    /// group (spec §4.5 "Construction"). The returned manager is already
    /// registered as a hook target by the time this resolves.
    pub async fn new(store: Arc<RegistryStore>, service: Arc<McpService>) -> Result<Arc<Self>> {
        let manager = Arc::new(Self {
            store,
            service,
            http_groups: RwLock::new(HashMap::new()),
            sse_groups: RwLock::new(HashMap::new()),
        });

        manager.service.register_tool_added_hook(manager.clone() as Arc<dyn ToolAddedHook>).await;
        manager.service.register_tools_removed_hook(manager.clone() as Arc<dyn ToolsRemovedHook>).await;

        for group in manager.store.list_groups().await? {
            manager.replay_group(&group.name, &group.config).await?;
        }

        Ok(manager)
    }

    async fn replay_group(&self, name: &str, config: &GroupConfig) -> Result<()> {
        let (http_proxy, sse_proxy, _) = self.build_proxies(name, config, false).await?;
        self.http_groups.write().await.insert(name.to_string(), http_proxy);
        self.sse_groups.write().await.insert(name.to_string(), sse_proxy);
        Ok(())
    }

    /// Builds a fresh HTTP/SSE proxy pair for `config`'s effective tool
    /// set. When `strict` is true (new-group creation) a missing
    /// descriptor aborts the whole build; during replay a missing
    /// descriptor is skipped silently since "groups may legitimately
    /// outlive their tools" (spec §4.5).
    async fn build_proxies(&self, name: &str, config: &GroupConfig, strict: bool) -> Result<(Arc<ProxyInstance>, Arc<ProxyInstance>, Vec<String>)> {
        let invoker = self.service.invoker();
        let http_proxy = Arc::new(ProxyInstance::new(format!("group-{name}-http"), invoker.clone()));
        let sse_proxy = Arc::new(ProxyInstance::new(format!("group-{name}-sse"), invoker));

        let effective = self.effective_tool_set(config).await?;
        if strict && effective.is_empty() {
            return Err(GatewayError::invalid_input(format!("group '{name}' has an empty effective tool set")));
        }

        let mut inserted = Vec::new();
        for canonical_name in &effective {
            match self.service.tool_descriptor(canonical_name).await {
                Some(descriptor) => {
                    match descriptor.proxy {
                        ProxyKind::Http => http_proxy.add_tool(descriptor.clone()).await,
                        ProxyKind::Sse => sse_proxy.add_tool(descriptor.clone()).await,
                    }
                    inserted.push(canonical_name.clone());
                }
                None if strict => {
                    return Err(GatewayError::invalid_input(format!("group '{name}' references unknown or disabled tool '{canonical_name}'")));
                }
                None => continue,
            }
        }

        Ok((http_proxy, sse_proxy, inserted))
    }

    /// `included_tools` ∪ (tools of `included_servers`) − `excluded_tools`.
    async fn effective_tool_set(&self, config: &GroupConfig) -> Result<Vec<String>> {
        let mut set: std::collections::BTreeSet<String> = config.included_tools.iter().cloned().collect();
        for server in &config.included_servers {
            for tool in self.store.list_tools_by_server(server).await? {
                if tool.enabled {
                    set.insert(gateway_names::join(server, &tool.name));
                }
            }
        }
        for excluded in &config.excluded_tools {
            set.remove(excluded);
        }
        Ok(set.into_iter().collect())
    }

    pub async fn create_group(&self, name: &str, config: GroupConfig) -> Result<()> {
        gateway_names::validate_group_name(name)?;
        let (http_proxy, sse_proxy, _) = self.build_proxies(name, &config, true).await?;

        self.store.create_group(name, config).await?;

        self.http_groups.write().await.insert(name.to_string(), http_proxy);
        self.sse_groups.write().await.insert(name.to_string(), sse_proxy);
        Ok(())
    }

    /// Returns the prior configuration (spec §4.5). A no-op update (same
    /// description, empty diff) skips both the in-memory rebuild and the
    /// store write... except the contract in spec §4.5 says persistence
    /// still happens for description-only changes, so only a truly
    /// identical config short-circuits.
    pub async fn update_group(&self, name: &str, new_config: GroupConfig) -> Result<GroupConfig> {
        let old_group = self.store.get_group(name).await?;
        let old_config = old_group.config;

        let old_set: std::collections::BTreeSet<String> = self.effective_tool_set(&old_config).await?.into_iter().collect();
        let new_set: std::collections::BTreeSet<String> = self.effective_tool_set(&new_config).await?.into_iter().collect();

        if old_config == new_config {
            return Ok(old_config);
        }

        let removed: Vec<String> = old_set.difference(&new_set).cloned().collect();
        let added: Vec<String> = new_set.difference(&old_set).cloned().collect();

        {
            let http_groups = self.http_groups.read().await;
            let sse_groups = self.sse_groups.read().await;
            let http_proxy = http_groups.get(name).ok_or_else(|| GatewayError::not_found(name))?;
            let sse_proxy = sse_groups.get(name).ok_or_else(|| GatewayError::not_found(name))?;

            for canonical_name in &removed {
                match self.service.tool_descriptor(canonical_name).await {
                    Some(d) if d.proxy == ProxyKind::Http => http_proxy.delete_tools([canonical_name.as_str()]).await,
                    Some(_) => sse_proxy.delete_tools([canonical_name.as_str()]).await,
                    None => {
                        http_proxy.delete_tools([canonical_name.as_str()]).await;
                        sse_proxy.delete_tools([canonical_name.as_str()]).await;
                    }
                }
            }
            for canonical_name in &added {
                if let Some(descriptor) = self.service.tool_descriptor(canonical_name).await {
                    match descriptor.proxy {
                        ProxyKind::Http => http_proxy.add_tool(descriptor).await,
                        ProxyKind::Sse => sse_proxy.add_tool(descriptor).await,
                    }
                }
            }
        }

        self.store.update_group(name, new_config).await?;
        Ok(old_config)
    }

    pub async fn delete_group(&self, name: &str) -> Result<()> {
        self.http_groups.write().await.remove(name);
        self.sse_groups.write().await.remove(name);
        self.store.delete_group(name).await?;
        Ok(())
    }

    pub async fn http_proxy_for(&self, name: &str) -> Option<Arc<ProxyInstance>> {
        self.http_groups.read().await.get(name).cloned()
    }

    pub async fn sse_proxy_for(&self, name: &str) -> Option<Arc<ProxyInstance>> {
        self.sse_groups.read().await.get(name).cloned()
    }

    /// Groups whose configuration names `canonical_name`, directly or via
    /// `included_servers` (minus `excluded_tools`).
    async fn groups_containing(&self, canonical_name: &str) -> Result<Vec<(String, GroupConfig)>> {
        let (server, _) = gateway_names::split(canonical_name).ok_or_else(|| GatewayError::InvalidName(canonical_name.to_string()))?;
        let mut out = Vec::new();
        for group in self.store.list_groups().await? {
            if group.config.excluded_tools.iter().any(|t| t == canonical_name) {
                continue;
            }
            let matches = group.config.included_tools.iter().any(|t| t == canonical_name)
                || group.config.included_servers.iter().any(|s| s == server);
            if matches {
                out.push((group.name, group.config));
            }
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ToolAddedHook for ToolGroupManager {
    async fn on_tool_added(&self, canonical_name: &str) -> Result<()> {
        let descriptor = match self.service.tool_descriptor(canonical_name).await {
            Some(d) => d,
            None => return Ok(()),
        };
        let groups = self.groups_containing(canonical_name).await?;
        for (name, _) in groups {
            let http_groups = self.http_groups.read().await;
            let sse_groups = self.sse_groups.read().await;
            match descriptor.proxy {
                ProxyKind::Http => {
                    if let Some(proxy) = http_groups.get(&name) {
                        proxy.add_tool(descriptor.clone()).await;
                    }
                }
                ProxyKind::Sse => {
                    if let Some(proxy) = sse_groups.get(&name) {
                        proxy.add_tool(descriptor.clone()).await;
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ToolsRemovedHook for ToolGroupManager {
    async fn on_tools_removed(&self, canonical_names: &[String]) {
        let http_groups = self.http_groups.read().await;
        for proxy in http_groups.values() {
            proxy.delete_tools(canonical_names.iter()).await;
        }
        let sse_groups = self.sse_groups.read().await;
        for proxy in sse_groups.values() {
            proxy.delete_tools(canonical_names.iter()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NoopSink;

    async fn harness() -> (Arc<RegistryStore>, Arc<McpService>, Arc<ToolGroupManager>) {
        let store = Arc::new(RegistryStore::in_memory().await.unwrap());
        let service = McpService::new(store.clone(), Arc::new(NoopSink));
        service.initialize().await.unwrap();
        let groups = ToolGroupManager::new(store.clone(), service.clone()).await.unwrap();
        (store, service, groups)
    }

    #[tokio::test]
    async fn create_group_rejects_empty_effective_tool_set() {
        let (_, _, groups) = harness().await;
        let err = groups.create_group("travel", GroupConfig { description: "empty".into(), ..Default::default() }).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_group_rejects_unknown_tool_reference() {
        let (_, _, groups) = harness().await;
        let config = GroupConfig { description: "travel".into(), included_tools: vec!["weather__now".into()], ..Default::default() };
        let err = groups.create_group("travel", config).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    /// Disabling and re-enabling a tool drives the same `ToolsRemoved` /
    /// `ToolAdded` callbacks that a fresh server registration would, so
    /// this exercises the Tool Group Manager's subscription without
    /// needing a live upstream connection.
    #[tokio::test]
    async fn disable_then_enable_propagates_through_callbacks() {
        let store = Arc::new(RegistryStore::in_memory().await.unwrap());
        store
            .create_server(gateway_store::NewServer {
                name: "weather".into(),
                description: "".into(),
                transport: gateway_store::TransportConfig::StreamableHttp { url: "http://upstream/mcp".into(), bearer_token: None },
            })
            .await
            .unwrap();
        store
            .create_tool(gateway_store::NewTool { server: "weather".into(), name: "now".into(), description: "current".into(), input_schema: serde_json::json!({}) })
            .await
            .unwrap();

        let service = McpService::new(store.clone(), Arc::new(NoopSink));
        service.initialize().await.unwrap();
        let groups = ToolGroupManager::new(store.clone(), service.clone()).await.unwrap();

        groups
            .create_group("travel", GroupConfig { description: "travel".into(), included_servers: vec!["weather".into()], ..Default::default() })
            .await
            .unwrap();
        assert!(groups.http_proxy_for("travel").await.unwrap().has_tool("weather__now").await);

        service.disable_tools("weather__now").await.unwrap();
        assert!(!groups.http_proxy_for("travel").await.unwrap().has_tool("weather__now").await);

        service.enable_tools("weather__now").await.unwrap();
        assert!(groups.http_proxy_for("travel").await.unwrap().has_tool("weather__now").await);
    }

    #[tokio::test]
    async fn delete_group_removes_both_proxies() {
        let store = Arc::new(RegistryStore::in_memory().await.unwrap());
        store
            .create_server(gateway_store::NewServer {
                name: "weather".into(),
                description: "".into(),
                transport: gateway_store::TransportConfig::StreamableHttp { url: "http://upstream/mcp".into(), bearer_token: None },
            })
            .await
            .unwrap();
        store
            .create_tool(gateway_store::NewTool { server: "weather".into(), name: "now".into(), description: "current".into(), input_schema: serde_json::json!({}) })
            .await
            .unwrap();

        let service = McpService::new(store.clone(), Arc::new(NoopSink));
        service.initialize().await.unwrap();
        let groups = ToolGroupManager::new(store.clone(), service.clone()).await.unwrap();
        groups
            .create_group("travel", GroupConfig { description: "travel".into(), included_servers: vec!["weather".into()], ..Default::default() })
            .await
            .unwrap();

        groups.delete_group("travel").await.unwrap();
        assert!(groups.http_proxy_for("travel").await.is_none());
    }
}

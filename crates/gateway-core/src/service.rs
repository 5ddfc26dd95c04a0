//! The MCP Service: core pivot (spec §4.4).
//!
//! Owns the registry store handle, the telemetry sink, the two proxy
//! instances (`http_proxy`/`sse_proxy`), and `tool_index`/`prompt_index` —
//! the authoritative in-memory view of enabled, registered entities. All
//! registration and enable/disable sequences run under the `state` write
//! lock so the triple (proxy mutation, index mutation, callback dispatch)
//! is linearised, per §5's ordering guarantee.

use crate::context::InvocationContext;
use crate::error::{GatewayError, Result};
use crate::model::{PromptDescriptor, ProxyKind, ToolDescriptor};
use crate::proxy::{ProxyInstance, ToolInvoker};
use crate::telemetry::{Outcome, TelemetrySink};
use gateway_store::{NewPrompt, NewServer, NewTool, Prompt, RegistryStore, Server, Tool, TransportConfig};
use gateway_upstream::UpstreamSession;
use rmcp::model as mcp;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Input to `register_server`, mirroring the REST register-server JSON
/// (spec §6) without the wire-specific `Option`-flattening.
#[derive(Debug, Clone)]
pub struct RegisterServerInput {
    pub name: String,
    pub description: String,
    pub transport: TransportConfig,
}

#[async_trait::async_trait]
pub trait ToolAddedHook: Send + Sync {
    async fn on_tool_added(&self, canonical_name: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ToolsRemovedHook: Send + Sync {
    async fn on_tools_removed(&self, canonical_names: &[String]);
}

/// Everything guarded by the single tool-index write lock (spec §5: the
/// MCP Service must finish mutating its own state before it may fire a
/// callback, and must not be holding a group-manager lock while it does).
struct State {
    tool_index: HashMap<String, ToolDescriptor>,
    prompt_index: HashMap<String, PromptDescriptor>,
    server_cache: HashMap<String, Server>,
}

pub struct McpService {
    store: Arc<RegistryStore>,
    telemetry: Arc<dyn TelemetrySink>,
    http_proxy: Arc<ProxyInstance>,
    sse_proxy: Arc<ProxyInstance>,
    invoker: Arc<dyn ToolInvoker>,
    state: RwLock<State>,
    tool_added_hooks: RwLock<Vec<Arc<dyn ToolAddedHook>>>,
    tools_removed_hooks: RwLock<Vec<Arc<dyn ToolsRemovedHook>>>,
}

/// Bridges `ProxyInstance`'s `Arc<dyn ToolInvoker>` requirement back to the
/// service that owns the proxy, without a reference cycle.
struct ServiceInvoker(Weak<McpService>);

#[async_trait::async_trait]
impl ToolInvoker for ServiceInvoker {
    async fn invoke_tool(
        &self,
        ctx: &InvocationContext,
        canonical_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<mcp::CallToolResult> {
        let service = self.0.upgrade().ok_or_else(|| GatewayError::internal("service dropped"))?;
        service.invoke_tool(ctx, canonical_name, arguments).await
    }

    async fn render_prompt(
        &self,
        ctx: &InvocationContext,
        canonical_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<mcp::GetPromptResult> {
        let service = self.0.upgrade().ok_or_else(|| GatewayError::internal("service dropped"))?;
        service.get_prompt_with_args(ctx, canonical_name, arguments).await
    }
}

impl McpService {
    pub fn new(store: Arc<RegistryStore>, telemetry: Arc<dyn TelemetrySink>) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let invoker: Arc<dyn ToolInvoker> = Arc::new(ServiceInvoker(weak.clone()));
            Self {
                store,
                telemetry,
                http_proxy: Arc::new(ProxyInstance::new("mcp-gateway-http", invoker.clone())),
                sse_proxy: Arc::new(ProxyInstance::new("mcp-gateway-sse", invoker.clone())),
                invoker,
                state: RwLock::new(State { tool_index: HashMap::new(), prompt_index: HashMap::new(), server_cache: HashMap::new() }),
                tool_added_hooks: RwLock::new(Vec::new()),
                tools_removed_hooks: RwLock::new(Vec::new()),
            }
        })
    }

    pub fn http_proxy(&self) -> Arc<ProxyInstance> {
        self.http_proxy.clone()
    }

    pub fn sse_proxy(&self) -> Arc<ProxyInstance> {
        self.sse_proxy.clone()
    }

    /// Handle used by the Tool Group Manager to build group proxy
    /// instances that dispatch through the same invocation path as the
    /// main HTTP/SSE proxies.
    pub fn invoker(&self) -> Arc<dyn ToolInvoker> {
        self.invoker.clone()
    }

    pub async fn register_tool_added_hook(&self, hook: Arc<dyn ToolAddedHook>) {
        self.tool_added_hooks.write().await.push(hook);
    }

    pub async fn register_tools_removed_hook(&self, hook: Arc<dyn ToolsRemovedHook>) {
        self.tools_removed_hooks.write().await.push(hook);
    }

    /// Replay the store into the proxies and indexes (spec §4.4
    /// "Initialisation"). Call once, after construction and after every
    /// hook has been registered, before serving any request.
    pub async fn initialize(&self) -> Result<()> {
        info!("replaying registry store into proxy instances");
        let servers = self.store.list_servers().await?;
        let mut state = self.state.write().await;

        for server in &servers {
            let proxy_kind = ProxyKind::for_transport(&server.transport);

            for tool in self.store.list_tools_by_server(&server.name).await? {
                if !tool.enabled {
                    continue;
                }
                let descriptor = tool_descriptor(server, &tool, proxy_kind);
                self.proxy_for(proxy_kind).add_tool(descriptor.clone()).await;
                state.tool_index.insert(descriptor.canonical_name.clone(), descriptor);
            }

            for prompt in self.store.list_prompts_by_server(&server.name).await? {
                if !prompt.enabled {
                    continue;
                }
                let descriptor = prompt_descriptor(server, &prompt, proxy_kind);
                self.proxy_for(proxy_kind).add_prompt(descriptor.clone()).await;
                state.prompt_index.insert(descriptor.canonical_name.clone(), descriptor);
            }

            state.server_cache.insert(server.name.clone(), server.clone());
        }

        info!(servers = servers.len(), tools = state.tool_index.len(), prompts = state.prompt_index.len(), "replay complete");
        Ok(())
    }

    fn proxy_for(&self, kind: ProxyKind) -> &Arc<ProxyInstance> {
        match kind {
            ProxyKind::Http => &self.http_proxy,
            ProxyKind::Sse => &self.sse_proxy,
        }
    }

    /// Fetch a server record, preferring the in-memory cache populated by
    /// initialisation/registration (spec §4.4: "a per-server model cache
    /// avoids repeated store lookups").
    async fn load_server(&self, name: &str) -> Result<Server> {
        if let Some(server) = self.state.read().await.server_cache.get(name) {
            return Ok(server.clone());
        }
        let server = self.store.get_server_by_name(name).await?;
        self.state.write().await.server_cache.insert(name.to_string(), server.clone());
        Ok(server)
    }

    pub async fn tool_descriptor(&self, canonical_name: &str) -> Option<ToolDescriptor> {
        self.state.read().await.tool_index.get(canonical_name).cloned()
    }

    pub async fn prompt_descriptor(&self, canonical_name: &str) -> Option<PromptDescriptor> {
        self.state.read().await.prompt_index.get(canonical_name).cloned()
    }

    pub async fn server_transport(&self, server_name: &str) -> Result<TransportConfig> {
        Ok(self.load_server(server_name).await?.transport)
    }

    /// RegisterServer (spec §4.4). Each numbered step is a compensation
    /// point: a failure at step N leaves no effects from step N committed.
    pub async fn register_server(&self, input: RegisterServerInput) -> Result<()> {
        gateway_names::validate_server_name(&input.name)?;

        let server = Server { name: input.name.clone(), description: input.description.clone(), transport: input.transport.clone() };
        let session = UpstreamSession::open(&server).await?;

        let create_result = self
            .store
            .create_server(NewServer { name: input.name.clone(), description: input.description.clone(), transport: input.transport.clone() })
            .await;
        if let Err(e) = create_result {
            session.close().await;
            return Err(e.into());
        }

        let proxy_kind = ProxyKind::for_transport(&input.transport);
        self.state.write().await.server_cache.insert(input.name.clone(), server.clone());

        let register_result = self.register_upstream_entities(&server, &session, proxy_kind).await;
        session.close().await;
        register_result
    }

    async fn register_upstream_entities(&self, server: &Server, session: &UpstreamSession, proxy_kind: ProxyKind) -> Result<()> {
        let tools = session.list_tools().await?;
        for tool in tools {
            let input_schema = serde_json::Value::Object((*tool.input_schema).clone());
            let new_tool = NewTool { server: server.name.clone(), name: tool.name.to_string(), description: tool.description.as_deref().unwrap_or_default().to_string(), input_schema };
            if let Err(e) = self.store.create_tool(new_tool.clone()).await {
                warn!(server = %server.name, tool = %new_tool.name, error = %e, "failed to persist discovered tool, continuing");
                continue;
            }
            let descriptor = ToolDescriptor {
                canonical_name: gateway_names::join(&server.name, &new_tool.name),
                server: server.name.clone(),
                short_name: new_tool.name.clone(),
                description: new_tool.description.clone(),
                input_schema: new_tool.input_schema.clone(),
                proxy: proxy_kind,
            };
            self.add_tool_to_state(descriptor).await;
        }

        // Prompt discovery failures never abort registration (spec §7(c)).
        match session.list_prompts().await {
            Ok(prompts) => {
                for prompt in prompts {
                    let new_prompt = NewPrompt {
                        server: server.name.clone(),
                        name: prompt.name.to_string(),
                        description: prompt.description.clone().map(|d| d.to_string()).unwrap_or_default(),
                        argument_schema: serde_json::json!({}),
                    };
                    if let Err(e) = self.store.create_prompt(new_prompt.clone()).await {
                        warn!(server = %server.name, prompt = %new_prompt.name, error = %e, "failed to persist discovered prompt, continuing");
                        continue;
                    }
                    let descriptor = PromptDescriptor {
                        canonical_name: gateway_names::join(&server.name, &new_prompt.name),
                        server: server.name.clone(),
                        short_name: new_prompt.name.clone(),
                        description: new_prompt.description.clone(),
                        argument_schema: new_prompt.argument_schema.clone(),
                        proxy: proxy_kind,
                    };
                    self.add_prompt_to_state(descriptor).await;
                }
            }
            Err(e) => warn!(server = %server.name, error = %e, "prompt discovery failed, continuing with tools only"),
        }

        Ok(())
    }

    async fn add_tool_to_state(&self, descriptor: ToolDescriptor) {
        self.proxy_for(descriptor.proxy).add_tool(descriptor.clone()).await;
        {
            let mut state = self.state.write().await;
            state.tool_index.insert(descriptor.canonical_name.clone(), descriptor.clone());
        }
        self.fire_tool_added(&descriptor.canonical_name).await;
    }

    async fn add_prompt_to_state(&self, descriptor: PromptDescriptor) {
        self.proxy_for(descriptor.proxy).add_prompt(descriptor.clone()).await;
        let mut state = self.state.write().await;
        state.prompt_index.insert(descriptor.canonical_name.clone(), descriptor);
    }

    async fn fire_tool_added(&self, canonical_name: &str) {
        let hooks = self.tool_added_hooks.read().await.clone();
        for hook in hooks {
            if let Err(e) = hook.on_tool_added(canonical_name).await {
                warn!(tool = %canonical_name, error = %e, "tool-added hook failed, ignoring");
            }
        }
    }

    async fn fire_tools_removed(&self, canonical_names: &[String]) {
        if canonical_names.is_empty() {
            return;
        }
        let hooks = self.tools_removed_hooks.read().await.clone();
        for hook in hooks {
            hook.on_tools_removed(canonical_names).await;
        }
    }

    pub async fn deregister_server(&self, name: &str) -> Result<()> {
        let server = self.load_server(name).await?;
        let tools = self.store.list_tools_by_server(name).await?;
        let prompts = self.store.list_prompts_by_server(name).await?;

        self.store.delete_tools_by_server(name).await?;
        self.store.delete_prompts_by_server(name).await?;
        self.store.delete_server(name).await?;

        let proxy_kind = ProxyKind::for_transport(&server.transport);
        let tool_names: Vec<String> = tools.iter().map(|t| gateway_names::join(name, &t.name)).collect();
        let prompt_names: Vec<String> = prompts.iter().map(|p| gateway_names::join(name, &p.name)).collect();

        self.proxy_for(proxy_kind).delete_tools(tool_names.iter()).await;
        self.proxy_for(proxy_kind).delete_prompts(prompt_names.iter()).await;
        {
            let mut state = self.state.write().await;
            for n in &tool_names {
                state.tool_index.remove(n);
            }
            for n in &prompt_names {
                state.prompt_index.remove(n);
            }
            state.server_cache.remove(name);
        }

        self.fire_tools_removed(&tool_names).await;
        Ok(())
    }

    /// EnableTools/DisableTools (spec §4.4). `entity` names a single tool
    /// when it contains `__`, otherwise a whole server.
    pub async fn enable_tools(&self, entity: &str) -> Result<Vec<String>> {
        self.set_tools_enabled(entity, true).await
    }

    pub async fn disable_tools(&self, entity: &str) -> Result<Vec<String>> {
        self.set_tools_enabled(entity, false).await
    }

    /// When `entity` names a single tool, the result always contains it
    /// (even if it was already in the requested state) so callers can
    /// confirm; when it names a server, only tools that actually changed
    /// are reported (spec §4.4).
    async fn set_tools_enabled(&self, entity: &str, enabled: bool) -> Result<Vec<String>> {
        if let Some((server_name, short_name)) = gateway_names::split(entity) {
            let server = self.load_server(server_name).await?;
            let tool = self.store.get_tool(server_name, short_name).await?;
            if tool.enabled != enabled {
                self.apply_tool_enabled(&server, short_name, enabled).await?;
            }
            Ok(vec![entity.to_string()])
        } else {
            let server = self.load_server(entity).await?;
            let tools = self.store.list_tools_by_server(entity).await?;
            let mut changed = Vec::new();
            for tool in tools {
                if tool.enabled == enabled {
                    continue;
                }
                self.apply_tool_enabled(&server, &tool.name, enabled).await?;
                changed.push(gateway_names::join(entity, &tool.name));
            }
            Ok(changed)
        }
    }

    async fn apply_tool_enabled(&self, server: &Server, short_name: &str, enabled: bool) -> Result<()> {
        self.store.set_tool_enabled(&server.name, short_name, enabled).await?;
        let canonical_name = gateway_names::join(&server.name, short_name);
        let proxy_kind = ProxyKind::for_transport(&server.transport);

        if enabled {
            let tool = self.store.get_tool(&server.name, short_name).await?;
            let descriptor = tool_descriptor(server, &tool, proxy_kind);
            self.add_tool_to_state(descriptor).await;
        } else {
            self.proxy_for(proxy_kind).delete_tools([canonical_name.as_str()]).await;
            self.state.write().await.tool_index.remove(&canonical_name);
            self.fire_tools_removed(&[canonical_name]).await;
        }
        Ok(())
    }

    pub async fn enable_prompts(&self, entity: &str) -> Result<Vec<String>> {
        self.set_prompts_enabled(entity, true).await
    }

    pub async fn disable_prompts(&self, entity: &str) -> Result<Vec<String>> {
        self.set_prompts_enabled(entity, false).await
    }

    async fn set_prompts_enabled(&self, entity: &str, enabled: bool) -> Result<Vec<String>> {
        if let Some((server_name, short)) = gateway_names::split(entity) {
            let server = self.load_server(server_name).await?;
            let prompt = self.store.get_prompt(server_name, short).await?;
            if prompt.enabled == enabled {
                return Ok(Vec::new());
            }
            self.apply_prompt_enabled(&server, short, enabled).await?;
            Ok(vec![entity.to_string()])
        } else {
            let server = self.load_server(entity).await?;
            let prompts = self.store.list_prompts_by_server(entity).await?;
            let mut changed = Vec::new();
            for prompt in prompts {
                if prompt.enabled == enabled {
                    continue;
                }
                self.apply_prompt_enabled(&server, &prompt.name, enabled).await?;
                changed.push(gateway_names::join(entity, &prompt.name));
            }
            Ok(changed)
        }
    }

    async fn apply_prompt_enabled(&self, server: &Server, short_name: &str, enabled: bool) -> Result<()> {
        self.store.set_prompt_enabled(&server.name, short_name, enabled).await?;
        let canonical_name = gateway_names::join(&server.name, short_name);
        let proxy_kind = ProxyKind::for_transport(&server.transport);

        if enabled {
            let prompt = self.store.get_prompt(&server.name, short_name).await?;
            let descriptor = prompt_descriptor(server, &prompt, proxy_kind);
            self.add_prompt_to_state(descriptor).await;
        } else {
            self.proxy_for(proxy_kind).delete_prompts([canonical_name.as_str()]).await;
            self.state.write().await.prompt_index.remove(&canonical_name);
        }
        Ok(())
    }

    /// InvokeTool (spec §4.4). Records telemetry and closes the upstream
    /// session on every exit path.
    pub async fn invoke_tool(
        &self,
        ctx: &InvocationContext,
        canonical_name: &str,
        args: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<mcp::CallToolResult> {
        let (server_name, short_name) = gateway_names::split(canonical_name).ok_or_else(|| GatewayError::InvalidName(canonical_name.to_string()))?;

        crate::auth::require_server_access(ctx, server_name)?;

        let server = self.load_server(server_name).await?;
        let started = Instant::now();

        let outcome = self.do_invoke_tool(&server, short_name, args).await;
        let elapsed = started.elapsed();
        self.telemetry.record_tool_call(server_name, short_name, if outcome.is_ok() { Outcome::Success } else { Outcome::Error }, elapsed);
        outcome
    }

    async fn do_invoke_tool(&self, server: &Server, short_name: &str, args: Option<serde_json::Map<String, serde_json::Value>>) -> Result<mcp::CallToolResult> {
        let session = UpstreamSession::open(server).await?;
        let result = session.call_tool(short_name, args).await;
        session.close().await;
        Ok(result?)
    }

    /// GetPromptWithArgs (spec §4.4): mirrors InvokeTool, coercing argument
    /// values to strings since MCP prompts only accept string arguments at
    /// the wire level.
    pub async fn get_prompt_with_args(
        &self,
        ctx: &InvocationContext,
        canonical_name: &str,
        args: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<mcp::GetPromptResult> {
        let (server_name, short_name) = gateway_names::split(canonical_name).ok_or_else(|| GatewayError::InvalidName(canonical_name.to_string()))?;

        crate::auth::require_server_access(ctx, server_name)?;

        let server = self.load_server(server_name).await?;
        let started = Instant::now();
        let string_args = args.map(coerce_args_to_strings);

        let outcome = self.do_get_prompt(&server, short_name, string_args).await;
        let elapsed = started.elapsed();
        self.telemetry.record_prompt_call(server_name, short_name, if outcome.is_ok() { Outcome::Success } else { Outcome::Error }, elapsed);
        outcome
    }

    async fn do_get_prompt(&self, server: &Server, short_name: &str, args: Option<HashMap<String, String>>) -> Result<mcp::GetPromptResult> {
        let session = UpstreamSession::open(server).await?;
        let result = session.get_prompt(short_name, args).await;
        session.close().await;
        Ok(result?)
    }
}

fn coerce_args_to_strings(args: serde_json::Map<String, serde_json::Value>) -> HashMap<String, String> {
    args.into_iter()
        .map(|(k, v)| {
            let s = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, s)
        })
        .collect()
}

fn tool_descriptor(server: &Server, tool: &Tool, proxy: ProxyKind) -> ToolDescriptor {
    ToolDescriptor {
        canonical_name: gateway_names::join(&server.name, &tool.name),
        server: server.name.clone(),
        short_name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.input_schema.clone(),
        proxy,
    }
}

fn prompt_descriptor(server: &Server, prompt: &Prompt, proxy: ProxyKind) -> PromptDescriptor {
    PromptDescriptor {
        canonical_name: gateway_names::join(&server.name, &prompt.name),
        server: server.name.clone(),
        short_name: prompt.name.clone(),
        description: prompt.description.clone(),
        argument_schema: prompt.argument_schema.clone(),
        proxy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NoopSink;
    use gateway_store::{Mode, NewUser, Role};

    async fn service() -> Arc<McpService> {
        let store = Arc::new(RegistryStore::in_memory().await.unwrap());
        let service = McpService::new(store, Arc::new(NoopSink));
        service.initialize().await.unwrap();
        service
    }

    #[tokio::test]
    async fn initialize_on_empty_store_is_a_no_op() {
        let service = service().await;
        assert!(service.tool_descriptor("weather__now").await.is_none());
    }

    #[tokio::test]
    async fn set_tools_enabled_rejects_unknown_server() {
        let service = service().await;
        let err = service.disable_tools("ghost").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn invoke_tool_rejects_malformed_name() {
        let ctx = InvocationContext::development();
        let service = service().await;
        let err = service.invoke_tool(&ctx, "not-canonical", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidName(_)));
    }

    #[tokio::test]
    async fn enterprise_invocation_outside_allow_list_is_unauthorized() {
        let store = Arc::new(RegistryStore::in_memory().await.unwrap());
        store.init_server_config(Mode::Enterprise).await.unwrap();
        store
            .create_user(NewUser { username: "alice".into(), role: Role::User, access_token: "tok".into() })
            .await
            .unwrap();
        let service = McpService::new(store, Arc::new(NoopSink));
        service.initialize().await.unwrap();

        let client = gateway_store::McpClient { name: "bot".into(), description: "".into(), access_token: "tok-bot".into(), allow_list: vec!["other".into()] };
        let ctx = InvocationContext::enterprise_client(client);

        let err = service.invoke_tool(&ctx, "weather__now", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized));
    }
}

//! A mutable-table MCP protocol server instance.
//!
//! Each [`ProxyInstance`] is a full `rmcp::Service<RoleServer>` whose tool
//! and prompt tables can be mutated at runtime (`add_tool`, `delete_tools`,
//! `add_prompt`, `delete_prompts`) independently of the protocol session
//! lifecycle. The MCP Service owns two of these (HTTP, SSE); the Tool Group
//! Manager owns one pair per group. All of them dispatch `CallToolRequest`/
//! `GetPromptRequest` to the same [`ToolInvoker`] — the MCP Service itself —
//! so a tool looks and behaves identically no matter which proxy a client
//! reached it through.

use crate::context::InvocationContext;
use crate::error::Result;
use crate::model::{PromptDescriptor, ToolDescriptor};
use rmcp::model as mcp;
use rmcp::service::{NotificationContext, RequestContext};
use rmcp::{RoleServer, Service};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Invokes a tool or renders a prompt by canonical name. Implemented by the
/// MCP Service; proxy instances hold a handle to it as a trait object so
/// this module doesn't depend on `service.rs` (which depends on this one).
#[async_trait::async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke_tool(
        &self,
        ctx: &InvocationContext,
        canonical_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<mcp::CallToolResult>;

    async fn render_prompt(
        &self,
        ctx: &InvocationContext,
        canonical_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<mcp::GetPromptResult>;
}

pub struct ProxyInstance {
    name: String,
    tools: RwLock<HashMap<String, ToolDescriptor>>,
    prompts: RwLock<HashMap<String, PromptDescriptor>>,
    invoker: Arc<dyn ToolInvoker>,
}

impl ProxyInstance {
    pub fn new(name: impl Into<String>, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { name: name.into(), tools: RwLock::new(HashMap::new()), prompts: RwLock::new(HashMap::new()), invoker }
    }

    pub async fn add_tool(&self, tool: ToolDescriptor) {
        self.tools.write().await.insert(tool.canonical_name.clone(), tool);
    }

    pub async fn delete_tools(&self, names: impl IntoIterator<Item = impl AsRef<str>>) {
        let mut tools = self.tools.write().await;
        for name in names {
            tools.remove(name.as_ref());
        }
    }

    pub async fn add_prompt(&self, prompt: PromptDescriptor) {
        self.prompts.write().await.insert(prompt.canonical_name.clone(), prompt);
    }

    pub async fn delete_prompts(&self, names: impl IntoIterator<Item = impl AsRef<str>>) {
        let mut prompts = self.prompts.write().await;
        for name in names {
            prompts.remove(name.as_ref());
        }
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    fn default_context(context: &RequestContext<RoleServer>) -> InvocationContext {
        context.extensions.get::<InvocationContext>().cloned().unwrap_or_default()
    }
}

impl Service<RoleServer> for ProxyInstance {
    async fn handle_request(
        &self,
        request: mcp::ClientRequest,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<mcp::ServerResult, mcp::ErrorData> {
        match request {
            mcp::ClientRequest::InitializeRequest(_) => Ok(mcp::ServerResult::InitializeResult(self.initialize_result())),

            mcp::ClientRequest::ListToolsRequest(_) => {
                let tools = self.tools.read().await;
                let list = tools
                    .values()
                    .map(|t| mcp::Tool::new(t.canonical_name.clone(), t.description.clone(), to_schema_object(&t.input_schema)))
                    .collect();
                Ok(mcp::ServerResult::ListToolsResult(mcp::ListToolsResult { tools: list, next_cursor: None }))
            }

            mcp::ClientRequest::ListPromptsRequest(_) => {
                let prompts = self.prompts.read().await;
                let list = prompts
                    .values()
                    .map(|p| mcp::Prompt { name: p.canonical_name.clone().into(), description: Some(p.description.clone().into()), arguments: None })
                    .collect();
                Ok(mcp::ServerResult::ListPromptsResult(mcp::ListPromptsResult { prompts: list, next_cursor: None }))
            }

            mcp::ClientRequest::CallToolRequest(req) => {
                let ctx = Self::default_context(&context);
                let name = req.params.name.to_string();
                if !self.tools.read().await.contains_key(&name) {
                    return Err(mcp::ErrorData::invalid_params(format!("unknown tool '{name}'"), None));
                }
                match self.invoker.invoke_tool(&ctx, &name, req.params.arguments.clone()).await {
                    Ok(result) => Ok(mcp::ServerResult::CallToolResult(result)),
                    Err(e) => Err(to_error_data(e)),
                }
            }

            mcp::ClientRequest::GetPromptRequest(req) => {
                let ctx = Self::default_context(&context);
                let name = req.params.name.clone();
                if !self.prompts.read().await.contains_key(&name) {
                    return Err(mcp::ErrorData::invalid_params(format!("unknown prompt '{name}'"), None));
                }
                let args = req
                    .params
                    .arguments
                    .clone()
                    .map(|m| m.into_iter().map(|(k, v)| (k, serde_json::Value::String(v))).collect::<serde_json::Map<_, _>>());
                match self.invoker.render_prompt(&ctx, &name, args).await {
                    Ok(result) => Ok(mcp::ServerResult::GetPromptResult(result)),
                    Err(e) => Err(to_error_data(e)),
                }
            }

            _ => Ok(mcp::ServerResult::empty(())),
        }
    }

    async fn handle_notification(
        &self,
        _notification: mcp::ClientNotification,
        _context: NotificationContext<RoleServer>,
    ) -> std::result::Result<(), mcp::ErrorData> {
        Ok(())
    }

    fn get_info(&self) -> mcp::ServerInfo {
        self.initialize_result()
    }
}

impl ProxyInstance {
    fn initialize_result(&self) -> mcp::ServerInfo {
        mcp::ServerInfo {
            protocol_version: mcp::ProtocolVersion::V_2025_03_26,
            capabilities: mcp::ServerCapabilities::builder().enable_tools().enable_tool_list_changed().enable_prompts().build(),
            server_info: mcp::Implementation { name: self.name.clone(), title: None, version: env!("CARGO_PKG_VERSION").into(), icons: None, website_url: None },
            instructions: None,
        }
    }
}

fn to_schema_object(value: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn to_error_data(err: crate::error::GatewayError) -> mcp::ErrorData {
    use crate::error::GatewayError::*;
    match err {
        InvalidName(m) | InvalidInput(m) => mcp::ErrorData::invalid_params(m, None),
        NotFound(m) => mcp::ErrorData::invalid_params(format!("not found: {m}"), None),
        Conflict(m) => mcp::ErrorData::internal_error(format!("conflict: {m}"), None),
        Unauthorized => mcp::ErrorData::invalid_request("unauthorized".to_string(), None),
        Forbidden(m) => mcp::ErrorData::invalid_request(format!("forbidden: {m}"), None),
        UpstreamUnreachable(m) => mcp::ErrorData::internal_error(m, None),
        Internal(m) => mcp::ErrorData::internal_error(m, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProxyKind;

    struct NullInvoker;

    #[async_trait::async_trait]
    impl ToolInvoker for NullInvoker {
        async fn invoke_tool(&self, _ctx: &InvocationContext, _name: &str, _args: Option<serde_json::Map<String, serde_json::Value>>) -> Result<mcp::CallToolResult> {
            unreachable!("not exercised in this test")
        }
        async fn render_prompt(&self, _ctx: &InvocationContext, _name: &str, _args: Option<serde_json::Map<String, serde_json::Value>>) -> Result<mcp::GetPromptResult> {
            unreachable!("not exercised in this test")
        }
    }

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            canonical_name: name.to_string(),
            server: "weather".to_string(),
            short_name: "now".to_string(),
            description: "desc".to_string(),
            input_schema: serde_json::json!({}),
            proxy: ProxyKind::Http,
        }
    }

    #[tokio::test]
    async fn add_and_delete_tools() {
        let proxy = ProxyInstance::new("test", Arc::new(NullInvoker));
        proxy.add_tool(tool("weather__now")).await;
        assert!(proxy.has_tool("weather__now").await);

        proxy.delete_tools(["weather__now"]).await;
        assert!(!proxy.has_tool("weather__now").await);
    }

    #[tokio::test]
    async fn deleting_absent_tool_is_a_no_op() {
        let proxy = ProxyInstance::new("test", Arc::new(NullInvoker));
        proxy.delete_tools(["ghost__tool"]).await;
        assert!(proxy.tool_names().await.is_empty());
    }
}

//! End-to-end coverage for the register → discover → invoke → deregister
//! path, against a fake upstream rather than mocking any of this crate's
//! own code. The fake is a minimal `rmcp::Service<RoleServer>` served over
//! `StreamableHttpService` on a loopback socket bound to an OS-assigned
//! port — the same mounting code `gateway-http` uses for the real proxies
//! — so `register_server`/`invoke_tool` run their real upstream-session
//! code path, not a stand-in for it.

use crate::context::InvocationContext;
use crate::error::GatewayError;
use crate::groups::ToolGroupManager;
use crate::service::{McpService, RegisterServerInput, ToolAddedHook};
use crate::telemetry::{NoopSink, Outcome, TelemetrySink};
use gateway_store::{GroupConfig, NewMcpClient, NewServer, NewTool, NewUser, RegistryStore, Role, TransportConfig};
use rmcp::model as mcp;
use rmcp::service::{NotificationContext, RequestContext};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{RoleServer, Service};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One `CallToolRequest` as the fake upstream actually received it — the
/// short name, not the canonical `server__name` form, since that's the
/// claim under test (spec S3).
#[derive(Debug, Clone, PartialEq)]
struct RecordedCall {
    name: String,
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Stands in for a real upstream MCP server: a fixed tool list and a canned
/// call result, recording every call it receives.
#[derive(Clone)]
struct FakeUpstream {
    tools: Vec<mcp::Tool>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeUpstream {
    fn new(tools: Vec<mcp::Tool>) -> Self {
        Self { tools, calls: Arc::new(Mutex::new(Vec::new())) }
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn info(&self) -> mcp::ServerInfo {
        mcp::ServerInfo {
            protocol_version: mcp::ProtocolVersion::V_2025_03_26,
            capabilities: mcp::ServerCapabilities::builder().enable_tools().enable_prompts().build(),
            server_info: mcp::Implementation { name: "fake-upstream".into(), title: None, version: "0.0.0".into(), icons: None, website_url: None },
            instructions: None,
        }
    }
}

impl Service<RoleServer> for FakeUpstream {
    async fn handle_request(
        &self,
        request: mcp::ClientRequest,
        _context: RequestContext<RoleServer>,
    ) -> Result<mcp::ServerResult, mcp::ErrorData> {
        match request {
            mcp::ClientRequest::InitializeRequest(_) => Ok(mcp::ServerResult::InitializeResult(self.info())),
            mcp::ClientRequest::ListToolsRequest(_) => {
                Ok(mcp::ServerResult::ListToolsResult(mcp::ListToolsResult { tools: self.tools.clone(), next_cursor: None }))
            }
            mcp::ClientRequest::ListPromptsRequest(_) => {
                Ok(mcp::ServerResult::ListPromptsResult(mcp::ListPromptsResult { prompts: vec![], next_cursor: None }))
            }
            mcp::ClientRequest::CallToolRequest(req) => {
                self.calls.lock().unwrap().push(RecordedCall { name: req.params.name.to_string(), arguments: req.params.arguments.clone() });
                Ok(mcp::ServerResult::CallToolResult(mcp::CallToolResult::success(vec![mcp::Content::text("ok")])))
            }
            _ => Ok(mcp::ServerResult::empty(())),
        }
    }

    async fn handle_notification(&self, _notification: mcp::ClientNotification, _context: NotificationContext<RoleServer>) -> Result<(), mcp::ErrorData> {
        Ok(())
    }

    fn get_info(&self) -> mcp::ServerInfo {
        self.info()
    }
}

/// Counts `ToolAdded` callback firings, for S1's "callback invoked twice".
struct CountingHook(Arc<AtomicUsize>);

#[async_trait::async_trait]
impl ToolAddedHook for CountingHook {
    async fn on_tool_added(&self, _canonical_name: &str) -> crate::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts telemetry records, for S6's "assert no session attempted via
/// telemetry absence".
struct CountingSink(Arc<AtomicUsize>);

impl TelemetrySink for CountingSink {
    fn record_tool_call(&self, _server: &str, _tool: &str, _outcome: Outcome, _elapsed: Duration) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
    fn record_prompt_call(&self, _server: &str, _prompt: &str, _outcome: Outcome, _elapsed: Duration) {}
}

/// Binds `fake` to a loopback socket and serves it over `/mcp`, returning
/// the URL to register as a `TransportConfig::StreamableHttp` upstream.
async fn spawn_fake_upstream(fake: FakeUpstream) -> String {
    let service = {
        let fake = fake.clone();
        StreamableHttpService::new(
            move || Ok(fake.clone()),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig { stateful_mode: true, sse_keep_alive: None },
        )
    };
    let app = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral loopback port");
    let addr = listener.local_addr().expect("bound listener has a local address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/mcp")
}

/// Registers `weather` (tools `now`, `forecast`) against a fresh fake
/// upstream. Returns the fake so tests can inspect what it actually
/// received.
async fn register_weather(service: &Arc<McpService>) -> FakeUpstream {
    let fake = FakeUpstream::new(vec![
        mcp::Tool::new("now", "current weather", serde_json::Map::new()),
        mcp::Tool::new("forecast", "forecasted weather", serde_json::Map::new()),
    ]);
    let url = spawn_fake_upstream(fake.clone()).await;
    service
        .register_server(RegisterServerInput {
            name: "weather".to_string(),
            description: "weather service".to_string(),
            transport: TransportConfig::StreamableHttp { url, bearer_token: None },
        })
        .await
        .unwrap();
    fake
}

#[tokio::test]
async fn s1_register_exposes_both_tools_persists_rows_and_fires_callback_twice() {
    let store = Arc::new(RegistryStore::in_memory().await.unwrap());
    let service = McpService::new(store.clone(), Arc::new(NoopSink));
    let added = Arc::new(AtomicUsize::new(0));
    service.register_tool_added_hook(Arc::new(CountingHook(added.clone()))).await;

    register_weather(&service).await;

    assert!(service.http_proxy().has_tool("weather__now").await);
    assert!(service.http_proxy().has_tool("weather__forecast").await);
    assert!(store.get_tool("weather", "now").await.is_ok());
    assert!(store.get_tool("weather", "forecast").await.is_ok());
    assert_eq!(added.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn s2_disable_removes_only_that_tool_from_the_proxy() {
    let store = Arc::new(RegistryStore::in_memory().await.unwrap());
    let service = McpService::new(store.clone(), Arc::new(NoopSink));
    register_weather(&service).await;

    service.disable_tools("weather__forecast").await.unwrap();

    assert!(!service.http_proxy().has_tool("weather__forecast").await);
    assert!(service.http_proxy().has_tool("weather__now").await);
    assert!(!store.get_tool("weather", "forecast").await.unwrap().enabled);
    assert!(store.get_tool("weather", "now").await.unwrap().enabled);
}

#[tokio::test]
async fn s3_group_serves_only_the_included_tool_and_forwards_the_short_name() {
    let store = Arc::new(RegistryStore::in_memory().await.unwrap());
    let service = McpService::new(store.clone(), Arc::new(NoopSink));
    let fake = register_weather(&service).await;
    let groups = ToolGroupManager::new(store.clone(), service.clone()).await.unwrap();

    groups
        .create_group("travel", GroupConfig { description: "travel".into(), included_tools: vec!["weather__now".into()], ..Default::default() })
        .await
        .unwrap();

    let travel_proxy = groups.http_proxy_for("travel").await.unwrap();
    assert!(travel_proxy.has_tool("weather__now").await);
    assert!(!travel_proxy.has_tool("weather__forecast").await);

    let mut args = serde_json::Map::new();
    args.insert("city".to_string(), serde_json::json!("paris"));
    let ctx = InvocationContext::development();
    let result = service.invoke_tool(&ctx, "weather__now", Some(args.clone())).await.unwrap();
    assert!(!result.content.is_empty(), "the fake's canned result must be forwarded unchanged");

    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "now", "upstream must receive the short name, not the canonical one");
    assert_eq!(calls[0].arguments, Some(args));
}

#[tokio::test]
async fn s4_excluded_tool_stays_excluded_after_enable() {
    let store = Arc::new(RegistryStore::in_memory().await.unwrap());
    let service = McpService::new(store.clone(), Arc::new(NoopSink));
    register_weather(&service).await;
    let groups = ToolGroupManager::new(store.clone(), service.clone()).await.unwrap();

    groups
        .create_group(
            "all-weather",
            GroupConfig {
                description: "all weather".into(),
                included_servers: vec!["weather".into()],
                excluded_tools: vec!["weather__forecast".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    service.enable_tools("weather__forecast").await.unwrap();

    let proxy = groups.http_proxy_for("all-weather").await.unwrap();
    assert!(proxy.has_tool("weather__now").await);
    assert!(!proxy.has_tool("weather__forecast").await, "excluded tool must stay excluded even after being re-enabled");
}

#[tokio::test]
async fn s5_deregister_removes_tools_from_every_proxy() {
    let store = Arc::new(RegistryStore::in_memory().await.unwrap());
    let service = McpService::new(store.clone(), Arc::new(NoopSink));
    register_weather(&service).await;
    let groups = ToolGroupManager::new(store.clone(), service.clone()).await.unwrap();
    groups
        .create_group("travel", GroupConfig { description: "travel".into(), included_tools: vec!["weather__now".into()], ..Default::default() })
        .await
        .unwrap();
    groups
        .create_group(
            "all-weather",
            GroupConfig { description: "all weather".into(), included_servers: vec!["weather".into()], ..Default::default() },
        )
        .await
        .unwrap();

    service.deregister_server("weather").await.unwrap();

    assert!(!service.http_proxy().has_tool("weather__now").await);
    assert!(!groups.http_proxy_for("travel").await.unwrap().has_tool("weather__now").await);
    assert!(!groups.http_proxy_for("all-weather").await.unwrap().has_tool("weather__now").await);
    assert!(store.get_tool("weather", "now").await.is_err());
    assert!(groups.http_proxy_for("travel").await.is_some(), "groups survive server deregistration with an empty effective set");
}

#[tokio::test]
async fn s6_enterprise_client_is_blocked_before_any_upstream_session_is_opened() {
    let store = Arc::new(RegistryStore::in_memory().await.unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let service = McpService::new(store.clone(), Arc::new(CountingSink(calls.clone())));
    register_weather(&service).await;

    store
        .create_server(NewServer {
            name: "secrets".to_string(),
            description: "".to_string(),
            transport: TransportConfig::StreamableHttp { url: "http://127.0.0.1:1/mcp".to_string(), bearer_token: None },
        })
        .await
        .unwrap();
    store
        .create_tool(NewTool { server: "secrets".to_string(), name: "read".to_string(), description: "".to_string(), input_schema: serde_json::json!({}) })
        .await
        .unwrap();
    service.initialize().await.unwrap();

    store.create_user(NewUser { username: "alice".to_string(), role: Role::User, access_token: "alice-tok".to_string() }).await.unwrap();
    store
        .create_client(NewMcpClient { name: "bot".to_string(), description: "".to_string(), access_token: "bot-tok".to_string(), allow_list: vec!["weather".to_string()] })
        .await
        .unwrap();
    let bot = store.get_client_by_token("bot-tok").await.unwrap();
    let ctx = InvocationContext::enterprise_client(bot);

    service.invoke_tool(&ctx, "weather__now", None).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let err = service.invoke_tool(&ctx, "secrets__read", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Unauthorized));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "the unauthorized attempt must never reach telemetry recording — no session was opened for it");
}

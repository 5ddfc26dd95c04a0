//! Opens an initialised MCP session to an upstream server.

use crate::error::{Result, UpstreamError};
use gateway_store::{Server, TransportConfig};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, GetPromptRequestParam, GetPromptResult, Prompt, Tool,
};
use rmcp::service::RunningService;
use rmcp::transport::sse_client::SseClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single-use, already-initialised session to one upstream server.
///
/// Not `Clone`: callers open one of these per invocation and must call
/// [`close`](UpstreamSession::close) on every exit path (spec §4.3's
/// "single-use per invocation" rule — stdio sessions own a subprocess that
/// cannot be safely shared).
pub struct UpstreamSession {
    server_name: String,
    inner: RunningService<RoleClient, ()>,
}

impl UpstreamSession {
    /// Open and handshake a session to `server`. Returns `UpstreamUnreachable`
    /// (as [`UpstreamError::Unreachable`]) for any connection or
    /// initialisation failure; nothing is persisted by this call.
    pub async fn open(server: &Server) -> Result<Self> {
        let inner = match &server.transport {
            TransportConfig::StreamableHttp { url, bearer_token } => {
                open_streamable_http(&server.name, url, bearer_token.as_deref()).await?
            }
            TransportConfig::Sse { url, bearer_token } => {
                open_sse(&server.name, url, bearer_token.as_deref()).await?
            }
            TransportConfig::Stdio { command, args, env } => {
                open_stdio(&server.name, command, args, env).await?
            }
        };
        debug!(server = %server.name, "upstream session initialised");
        Ok(Self { server_name: server.name.clone(), inner })
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.inner
            .list_all_tools()
            .await
            .map_err(|e| self.protocol_error(e))
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        self.inner
            .list_all_prompts()
            .await
            .map_err(|e| self.protocol_error(e))
    }

    /// Invoke `tool_name` (the *short* name, with any server prefix already
    /// stripped by the caller) with the given arguments.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult> {
        self.inner
            .call_tool(CallToolRequestParam { name: tool_name.to_string().into(), arguments })
            .await
            .map_err(|e| self.protocol_error(e))
    }

    pub async fn get_prompt(
        &self,
        prompt_name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult> {
        self.inner
            .get_prompt(GetPromptRequestParam { name: prompt_name.to_string(), arguments })
            .await
            .map_err(|e| self.protocol_error(e))
    }

    /// Tear the session down. Always called, even on error paths, by the
    /// caller's cleanup code (spec §4.3, §4.4).
    pub async fn close(self) {
        if let Err(e) = self.inner.cancel().await {
            warn!(server = %self.server_name, error = %e, "error closing upstream session");
        }
    }

    fn protocol_error(&self, source: impl std::error::Error + Send + Sync + 'static) -> UpstreamError {
        UpstreamError::Protocol { server: self.server_name.clone(), source: anyhow::Error::new(source) }
    }
}

async fn open_streamable_http(
    server_name: &str,
    url: &str,
    bearer_token: Option<&str>,
) -> Result<RunningService<RoleClient, ()>> {
    let http_client = build_http_client(bearer_token, server_name)?;
    let transport = StreamableHttpClientTransport::with_client(
        http_client,
        rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig {
            uri: url.to_string().into(),
            ..Default::default()
        },
    );
    tokio::time::timeout(CONNECT_TIMEOUT, ().serve(transport))
        .await
        .map_err(|_| timeout_error(server_name, url))?
        .map_err(|e| connect_error(server_name, url, e))
}

async fn open_sse(
    server_name: &str,
    url: &str,
    bearer_token: Option<&str>,
) -> Result<RunningService<RoleClient, ()>> {
    let http_client = build_http_client(bearer_token, server_name)?;
    let transport = SseClientTransport::start_with_client(
        http_client,
        rmcp::transport::sse_client::SseClientConfig { sse_endpoint: url.to_string().into(), ..Default::default() },
    )
    .await
    .map_err(|e| connect_error(server_name, url, e))?;
    tokio::time::timeout(CONNECT_TIMEOUT, ().serve(transport))
        .await
        .map_err(|_| timeout_error(server_name, url))?
        .map_err(|e| connect_error(server_name, url, e))
}

async fn open_stdio(
    server_name: &str,
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<RunningService<RoleClient, ()>> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    for (k, v) in env {
        cmd.env(k, v);
    }

    let transport = TokioChildProcess::new(cmd).map_err(|e| UpstreamError::Unreachable {
        server: server_name.to_string(),
        hint: Some(format!("failed to spawn '{command}'")),
        source: anyhow::Error::new(e),
    })?;

    tokio::time::timeout(CONNECT_TIMEOUT, ().serve(transport))
        .await
        .map_err(|_| UpstreamError::Unreachable {
            server: server_name.to_string(),
            hint: None,
            source: anyhow::anyhow!("initialise handshake with '{command}' timed out"),
        })?
        .map_err(|e| UpstreamError::Unreachable {
            server: server_name.to_string(),
            hint: None,
            source: anyhow::Error::new(e),
        })
}

fn build_http_client(bearer_token: Option<&str>, server_name: &str) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(token) = bearer_token {
        let mut headers = reqwest::header::HeaderMap::new();
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            UpstreamError::Unreachable {
                server: server_name.to_string(),
                hint: Some("bearer token is not a valid header value".to_string()),
                source: anyhow::Error::new(e),
            }
        })?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }
    builder.build().map_err(|e| UpstreamError::Unreachable {
        server: server_name.to_string(),
        hint: None,
        source: anyhow::Error::new(e),
    })
}

fn timeout_error(server_name: &str, url: &str) -> UpstreamError {
    UpstreamError::Unreachable {
        server: server_name.to_string(),
        hint: loopback_hint(url),
        source: anyhow::anyhow!("connection to '{url}' timed out"),
    }
}

fn connect_error(server_name: &str, url: &str, source: impl std::error::Error + Send + Sync + 'static) -> UpstreamError {
    UpstreamError::Unreachable { server: server_name.to_string(), hint: loopback_hint(url), source: anyhow::Error::new(source) }
}

/// If `url` points at a loopback host, a connection failure is very likely
/// the gateway running in a container that can't reach the operator's
/// localhost — surface a hint instead of a bare connection-refused message
/// (spec §4.3).
fn loopback_hint(url: &str) -> Option<String> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_string();
    if host == "localhost" || host == "127.0.0.1" || host == "::1" {
        Some(format!(
            "'{host}' resolves inside this process's network namespace; if the gateway runs in a \
             container, use the container's host-gateway DNS name instead of localhost"
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_hint_fires_for_localhost_variants() {
        assert!(loopback_hint("http://localhost:8080/mcp").is_some());
        assert!(loopback_hint("http://127.0.0.1:8080/mcp").is_some());
        assert!(loopback_hint("http://weather.example.com/mcp").is_none());
    }
}

//! In-memory descriptors mirrored from the registry store into the proxy
//! instances. These are intentionally smaller than the store's own `Tool`/
//! `Prompt` rows — only what a proxy instance needs to answer `ListTools`/
//! `ListPrompts` and to be handed back to the dispatcher.

use serde_json::Value;

/// Which proxy instance (HTTP or SSE) a tool or prompt belongs in, derived
/// once from the owning server's transport and cached (spec §9: "look up
/// the parent server once when enabling a tool and cache the transport
/// decision").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Http,
    Sse,
}

impl ProxyKind {
    /// Upstream servers that speak the legacy SSE dialect get their own
    /// downstream proxy; every other transport (streamable-HTTP, stdio)
    /// is multiplexed behind the HTTP proxy.
    pub fn for_transport(transport: &gateway_store::TransportConfig) -> Self {
        match transport {
            gateway_store::TransportConfig::Sse { .. } => ProxyKind::Sse,
            gateway_store::TransportConfig::StreamableHttp { .. } | gateway_store::TransportConfig::Stdio { .. } => {
                ProxyKind::Http
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub canonical_name: String,
    pub server: String,
    pub short_name: String,
    pub description: String,
    pub input_schema: Value,
    pub proxy: ProxyKind,
}

#[derive(Debug, Clone)]
pub struct PromptDescriptor {
    pub canonical_name: String,
    pub server: String,
    pub short_name: String,
    pub description: String,
    pub argument_schema: Value,
    pub proxy: ProxyKind,
}

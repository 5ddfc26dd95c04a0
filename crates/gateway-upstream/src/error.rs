use thiserror::Error;

/// Failures opening or driving an upstream MCP session.
///
/// Every variant collapses to the single `UpstreamUnreachable` semantic
/// kind at the `gateway-core` boundary — this type only keeps enough detail
/// to render a useful hint and log line.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream server '{server}' unreachable: {source}")]
    Unreachable {
        server: String,
        hint: Option<String>,
        #[source]
        source: anyhow::Error,
    },
    #[error("upstream server '{server}' returned a protocol error: {source}")]
    Protocol {
        server: String,
        #[source]
        source: anyhow::Error,
    },
}

impl UpstreamError {
    pub fn server_name(&self) -> &str {
        match self {
            UpstreamError::Unreachable { server, .. } => server,
            UpstreamError::Protocol { server, .. } => server,
        }
    }

    /// A human hint to append to the error (e.g. the container-to-host DNS
    /// note for loopback-host connection refusals). `None` for everything
    /// else.
    pub fn hint(&self) -> Option<&str> {
        match self {
            UpstreamError::Unreachable { hint, .. } => hint.as_deref(),
            UpstreamError::Protocol { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpstreamError>;

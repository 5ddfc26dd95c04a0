//! Persisted entity shapes for the registry store.

use serde::{Deserialize, Serialize};

/// Transport-specific configuration for an upstream server, stored as a
/// single JSON blob keyed by transport tag (spec §6: "Transport
/// configuration is stored as a JSON blob keyed by transport tag").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportConfig {
    StreamableHttp {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bearer_token: Option<String>,
    },
    Sse {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bearer_token: Option<String>,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: std::collections::HashMap<String, String>,
    },
}

impl TransportConfig {
    pub fn tag(&self) -> &'static str {
        match self {
            TransportConfig::StreamableHttp { .. } => "streamable_http",
            TransportConfig::Sse { .. } => "sse",
            TransportConfig::Stdio { .. } => "stdio",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub name: String,
    pub description: String,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone)]
pub struct NewServer {
    pub name: String,
    pub description: String,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    pub server: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewTool {
    pub server: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub server: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub argument_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewPrompt {
    pub server: String,
    pub name: String,
    pub description: String,
    pub argument_schema: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub description: String,
    #[serde(default)]
    pub included_tools: Vec<String>,
    #[serde(default)]
    pub included_servers: Vec<String>,
    #[serde(default)]
    pub excluded_tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolGroup {
    pub name: String,
    pub config: GroupConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub role: Role,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub role: Role,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct McpClient {
    pub name: String,
    pub description: String,
    pub access_token: String,
    pub allow_list: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewMcpClient {
    pub name: String,
    pub description: String,
    pub access_token: String,
    pub allow_list: Vec<String>,
}

/// Server mode. The legacy value `production` is accepted on read and
/// normalised to `Enterprise`; it is never written back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Enterprise,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Enterprise => "enterprise",
        }
    }

    /// Parse a stored mode string, normalising the legacy `production`
    /// value (spec §9) to `Enterprise`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "development" => Some(Mode::Development),
            "enterprise" | "production" => Some(Mode::Enterprise),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub initialized: bool,
    pub mode: Mode,
}

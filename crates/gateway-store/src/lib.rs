//! Durable registry store for the MCP gateway: servers, tools, prompts,
//! tool groups, users, MCP clients, and the server-config singleton.

mod error;
mod models;
mod store;

pub use error::{Result, StoreError};
pub use models::{
    GroupConfig, McpClient, Mode, NewMcpClient, NewPrompt, NewServer, NewTool, NewUser, Prompt,
    Role, Server, ServerConfig, Tool, ToolGroup, TransportConfig,
};
pub use store::RegistryStore;

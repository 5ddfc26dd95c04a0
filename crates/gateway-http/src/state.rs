use crate::group_mcp::GroupMcpCache;
use gateway_core::{McpService, ToolGroupManager};
use gateway_store::RegistryStore;
use std::sync::Arc;

/// Shared handles wired up by the binary crate and threaded through every
/// router via `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RegistryStore>,
    pub service: Arc<McpService>,
    pub groups: Arc<ToolGroupManager>,
    pub metrics: Arc<prometheus::Registry>,
    pub group_mcp: Arc<GroupMcpCache>,
}

//! MCP multiplexing core: registry sync between the Registry Store and
//! in-memory proxy instances, per-client authorization and telemetry for
//! tool/prompt invocations, and per-group MCP instances kept in sync via
//! callback-driven propagation.

pub mod auth;
pub mod context;
pub mod error;
pub mod groups;
pub mod model;
pub mod proxy;
pub mod service;
pub mod telemetry;

#[cfg(test)]
mod scenario_tests;

pub use context::InvocationContext;
pub use error::{GatewayError, Result};
pub use groups::ToolGroupManager;
pub use model::{PromptDescriptor, ProxyKind, ToolDescriptor};
pub use proxy::{ProxyInstance, ToolInvoker};
pub use service::{McpService, RegisterServerInput, ToolAddedHook, ToolsRemovedHook};
pub use telemetry::{NoopSink, Outcome, PrometheusSink, TelemetrySink};

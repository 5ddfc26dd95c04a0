//! Upstream Session Factory: opens short-lived, handshake-initialised MCP
//! sessions to registered upstream servers over stdio, streamable-HTTP, or
//! legacy SSE.

mod error;
mod factory;

pub use error::{Result, UpstreamError};
pub use factory::UpstreamSession;

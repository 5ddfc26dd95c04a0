//! Gateway error kinds (spec §7).
//!
//! Every lower-level error (store, upstream, name validation) is mapped
//! onto one of these variants exactly once, at the boundary where it's
//! first observed — never re-interpreted further up the call stack.

use gateway_names::NameError;
use gateway_store::StoreError;
use gateway_upstream::UpstreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        GatewayError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GatewayError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }
}

impl From<NameError> for GatewayError {
    fn from(err: NameError) -> Self {
        GatewayError::InvalidName(err.to_string())
    }
}

/// Store errors map 1:1 onto the semantic kinds spec §7(a) names: missing
/// row ⇒ `NotFound`, unique violation ⇒ `Conflict`, everything else ⇒
/// `Internal`.
impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => GatewayError::NotFound(what),
            StoreError::Conflict(what) => GatewayError::Conflict(what),
            StoreError::Database(e) => GatewayError::Internal(e.to_string()),
            StoreError::Serialization(e) => GatewayError::Internal(e.to_string()),
        }
    }
}

/// Upstream-session failures always surface as `UpstreamUnreachable` (spec
/// §7(b)) and never mutate in-memory state.
impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match &err {
            UpstreamError::Unreachable { hint: Some(hint), .. } => {
                GatewayError::UpstreamUnreachable(format!("{err} ({hint})"))
            }
            _ => GatewayError::UpstreamUnreachable(err.to_string()),
        }
    }
}

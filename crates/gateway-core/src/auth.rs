//! Auth & Mode Gate (spec §4.6).
//!
//! Mode is read once per request from the Server Config singleton and
//! threaded into the [`InvocationContext`]. Development mode bypasses
//! authentication entirely; enterprise mode requires a bearer token on
//! every request, resolved here to a `User` (API paths) or `McpClient`
//! (proxy paths).

use crate::context::InvocationContext;
use crate::error::{GatewayError, Result};
use gateway_store::{McpClient, Mode, RegistryStore, Role, User};

/// Resolve the context for an API request. In development mode, the token
/// is ignored and the context carries no principal. In enterprise mode, a
/// token is required and must resolve to a known user.
pub async fn authenticate_api(store: &RegistryStore, mode: Mode, token: Option<&str>) -> Result<InvocationContext> {
    match mode {
        Mode::Development => Ok(InvocationContext::development()),
        Mode::Enterprise => {
            let token = token.ok_or(GatewayError::Unauthorized)?;
            let user = store.get_user_by_token(token).await.map_err(|_| GatewayError::Unauthorized)?;
            Ok(InvocationContext::enterprise_user(user))
        }
    }
}

/// Resolve the context for a proxy request (the MCP protocol endpoints).
/// In enterprise mode the client record is carried forward so MCP Service
/// can enforce the per-client server allow-list.
pub async fn authenticate_proxy(store: &RegistryStore, mode: Mode, token: Option<&str>) -> Result<InvocationContext> {
    match mode {
        Mode::Development => Ok(InvocationContext::development()),
        Mode::Enterprise => {
            let token = token.ok_or(GatewayError::Unauthorized)?;
            let client = store.get_client_by_token(token).await.map_err(|_| GatewayError::Unauthorized)?;
            Ok(InvocationContext::enterprise_client(client))
        }
    }
}

/// Admin-only API operations additionally check `role == admin` (spec
/// §4.6). A no-op in development mode, where there is no principal to check.
pub fn require_admin(ctx: &InvocationContext) -> Result<()> {
    if !ctx.is_enterprise() {
        return Ok(());
    }
    match &ctx.user {
        Some(User { role: Role::Admin, .. }) => Ok(()),
        Some(_) => Err(GatewayError::Forbidden("admin role required".to_string())),
        None => Err(GatewayError::Unauthorized),
    }
}

/// Enforced by MCP Service on every tool/prompt invocation (spec §4.4): in
/// enterprise mode, the authenticated client's allow-list must contain the
/// target server.
pub fn require_server_access(ctx: &InvocationContext, server: &str) -> Result<()> {
    if !ctx.is_enterprise() {
        return Ok(());
    }
    let allowed = ctx.client.as_ref().map(|c: &McpClient| c.allow_list.iter().any(|s| s == server)).unwrap_or(false);
    if allowed {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_store::NewUser;

    #[tokio::test]
    async fn development_mode_never_requires_a_token() {
        let store = RegistryStore::in_memory().await.unwrap();
        let ctx = authenticate_api(&store, Mode::Development, None).await.unwrap();
        assert!(!ctx.is_enterprise());
    }

    #[tokio::test]
    async fn enterprise_mode_rejects_missing_token() {
        let store = RegistryStore::in_memory().await.unwrap();
        let err = authenticate_api(&store, Mode::Enterprise, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized));
    }

    #[tokio::test]
    async fn enterprise_mode_resolves_known_token() {
        let store = RegistryStore::in_memory().await.unwrap();
        store.create_user(NewUser { username: "alice".into(), role: Role::Admin, access_token: "tok".into() }).await.unwrap();
        let ctx = authenticate_api(&store, Mode::Enterprise, Some("tok")).await.unwrap();
        assert_eq!(ctx.user.unwrap().username, "alice");
    }

    #[test]
    fn require_admin_rejects_non_admin_user() {
        let ctx = InvocationContext::enterprise_user(User { username: "bob".into(), role: Role::User, access_token: "tok".into() });
        assert!(matches!(require_admin(&ctx), Err(GatewayError::Forbidden(_))));
    }

    #[test]
    fn require_server_access_denies_server_outside_allow_list() {
        let client = McpClient { name: "bot".into(), description: "".into(), access_token: "tok".into(), allow_list: vec!["weather".into()] };
        let ctx = InvocationContext::enterprise_client(client);
        assert!(require_server_access(&ctx, "billing").is_err());
        assert!(require_server_access(&ctx, "weather").is_ok());
    }
}

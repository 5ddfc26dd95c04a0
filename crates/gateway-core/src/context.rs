//! Request context threaded from the HTTP Surface down into invocations
//! (spec §4.6).

use gateway_store::{McpClient, Mode, User};

/// Per-request context: the server mode (read once from the Server Config
/// singleton) plus whichever principal authenticated the request, if any.
///
/// In development mode `user`/`client` are always `None` and every check
/// in [`crate::auth`] short-circuits to "allowed".
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub mode: Option<Mode>,
    pub user: Option<User>,
    pub client: Option<McpClient>,
}

impl InvocationContext {
    pub fn development() -> Self {
        Self { mode: Some(Mode::Development), user: None, client: None }
    }

    pub fn enterprise_client(client: McpClient) -> Self {
        Self { mode: Some(Mode::Enterprise), user: None, client: Some(client) }
    }

    pub fn enterprise_user(user: User) -> Self {
        Self { mode: Some(Mode::Enterprise), user: Some(user), client: None }
    }

    pub fn is_enterprise(&self) -> bool {
        matches!(self.mode, Some(Mode::Enterprise))
    }
}

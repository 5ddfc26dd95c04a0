//! SQLite-backed registry store.
//!
//! Transactional system of record for servers, tools, prompts, groups,
//! users, MCP clients, and the server-config singleton. All queries go
//! through the runtime `sqlx::query`/`query_as` API rather than the
//! compile-time `query!` macros, since there is no live database available
//! at build time for this workspace.

use crate::error::{map_write_error, Result, StoreError};
use crate::models::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

pub struct RegistryStore {
    pool: SqlitePool,
}

impl RegistryStore {
    /// Connect to `url` (e.g. `sqlite:///var/lib/mcp-gateway/registry.db` or
    /// `sqlite::memory:`) and ensure the schema exists.
    pub async fn new(url: &str) -> Result<Self> {
        info!(url, "opening registry store");
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("initializing registry schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS servers (
                name TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                config_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tools (
                server TEXT NOT NULL REFERENCES servers(name),
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                input_schema TEXT NOT NULL,
                PRIMARY KEY (server, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompts (
                server TEXT NOT NULL REFERENCES servers(name),
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                argument_schema TEXT NOT NULL,
                PRIMARY KEY (server, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                name TEXT PRIMARY KEY,
                config_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                access_token TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mcp_clients (
                name TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                access_token TEXT NOT NULL UNIQUE,
                allow_list_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS server_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                initialized INTEGER NOT NULL,
                mode TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tools_server ON tools(server)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_prompts_server ON prompts(server)")
            .execute(&self.pool)
            .await?;

        debug!("registry schema ready");
        Ok(())
    }

    // ---- Servers ----

    pub async fn create_server(&self, new: NewServer) -> Result<()> {
        let config_json = serde_json::to_string(&new.transport)?;
        sqlx::query("INSERT INTO servers (name, description, config_json) VALUES (?, ?, ?)")
            .bind(&new.name)
            .bind(&new.description)
            .bind(&config_json)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(&new.name, e))?;
        Ok(())
    }

    pub async fn get_server_by_name(&self, name: &str) -> Result<Server> {
        let row = sqlx::query("SELECT name, description, config_json FROM servers WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        row_to_server(&row)
    }

    pub async fn list_servers(&self) -> Result<Vec<Server>> {
        let rows = sqlx::query("SELECT name, description, config_json FROM servers ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_server).collect()
    }

    /// Deletes tool rows, prompt rows, then the server row in one
    /// transaction (spec §4.2: "cascades tools and prompts in one
    /// transaction").
    pub async fn delete_server(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM servers WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound(name.to_string()));
        }

        sqlx::query("DELETE FROM tools WHERE server = ?").bind(name).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM prompts WHERE server = ?").bind(name).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM servers WHERE name = ?").bind(name).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    // ---- Tools ----

    pub async fn create_tool(&self, new: NewTool) -> Result<()> {
        let schema_json = serde_json::to_string(&new.input_schema)?;
        sqlx::query(
            "INSERT INTO tools (server, name, description, enabled, input_schema) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(&new.server)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&schema_json)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(&format!("{}__{}", new.server, new.name), e))?;
        Ok(())
    }

    pub async fn list_tools_by_server(&self, server: &str) -> Result<Vec<Tool>> {
        let rows = sqlx::query(
            "SELECT server, name, description, enabled, input_schema FROM tools WHERE server = ? ORDER BY name",
        )
        .bind(server)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_tool).collect()
    }

    pub async fn get_tool(&self, server: &str, name: &str) -> Result<Tool> {
        let row = sqlx::query(
            "SELECT server, name, description, enabled, input_schema FROM tools WHERE server = ? AND name = ?",
        )
        .bind(server)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("{server}__{name}")))?;
        row_to_tool(&row)
    }

    pub async fn set_tool_enabled(&self, server: &str, name: &str, enabled: bool) -> Result<()> {
        let result = sqlx::query("UPDATE tools SET enabled = ? WHERE server = ? AND name = ?")
            .bind(enabled)
            .bind(server)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{server}__{name}")));
        }
        Ok(())
    }

    pub async fn delete_tools_by_server(&self, server: &str) -> Result<()> {
        sqlx::query("DELETE FROM tools WHERE server = ?").bind(server).execute(&self.pool).await?;
        Ok(())
    }

    // ---- Prompts ----

    pub async fn create_prompt(&self, new: NewPrompt) -> Result<()> {
        let schema_json = serde_json::to_string(&new.argument_schema)?;
        sqlx::query(
            "INSERT INTO prompts (server, name, description, enabled, argument_schema) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(&new.server)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&schema_json)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(&format!("{}__{}", new.server, new.name), e))?;
        Ok(())
    }

    pub async fn list_prompts_by_server(&self, server: &str) -> Result<Vec<Prompt>> {
        let rows = sqlx::query(
            "SELECT server, name, description, enabled, argument_schema FROM prompts WHERE server = ? ORDER BY name",
        )
        .bind(server)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_prompt).collect()
    }

    pub async fn get_prompt(&self, server: &str, name: &str) -> Result<Prompt> {
        let row = sqlx::query(
            "SELECT server, name, description, enabled, argument_schema FROM prompts WHERE server = ? AND name = ?",
        )
        .bind(server)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("{server}__{name}")))?;
        row_to_prompt(&row)
    }

    pub async fn set_prompt_enabled(&self, server: &str, name: &str, enabled: bool) -> Result<()> {
        let result = sqlx::query("UPDATE prompts SET enabled = ? WHERE server = ? AND name = ?")
            .bind(enabled)
            .bind(server)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("{server}__{name}")));
        }
        Ok(())
    }

    pub async fn delete_prompts_by_server(&self, server: &str) -> Result<()> {
        sqlx::query("DELETE FROM prompts WHERE server = ?").bind(server).execute(&self.pool).await?;
        Ok(())
    }

    // ---- Tool groups ----

    pub async fn create_group(&self, name: &str, config: GroupConfig) -> Result<()> {
        let config_json = serde_json::to_string(&config)?;
        sqlx::query("INSERT INTO groups (name, config_json) VALUES (?, ?)")
            .bind(name)
            .bind(&config_json)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(name, e))?;
        Ok(())
    }

    pub async fn get_group(&self, name: &str) -> Result<ToolGroup> {
        let row = sqlx::query("SELECT name, config_json FROM groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        row_to_group(&row)
    }

    pub async fn list_groups(&self) -> Result<Vec<ToolGroup>> {
        let rows = sqlx::query("SELECT name, config_json FROM groups ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_group).collect()
    }

    /// Replaces a group's stored configuration and returns the prior one,
    /// so the caller (Tool Group Manager) can render the diff (spec §4.5).
    pub async fn update_group(&self, name: &str, new_config: GroupConfig) -> Result<GroupConfig> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT config_json FROM groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let prior: GroupConfig = serde_json::from_str(&row.get::<String, _>("config_json"))?;

        let new_json = serde_json::to_string(&new_config)?;
        sqlx::query("UPDATE groups SET config_json = ? WHERE name = ?")
            .bind(&new_json)
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(prior)
    }

    pub async fn delete_group(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM groups WHERE name = ?").bind(name).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    // ---- Server config singleton ----

    pub async fn get_server_config(&self) -> Result<ServerConfig> {
        let row = sqlx::query("SELECT initialized, mode FROM server_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound("server_config".to_string()))?;
        let mode_str: String = row.get("mode");
        let mode = Mode::parse(&mode_str)
            .ok_or_else(|| StoreError::Database(sqlx::Error::Decode(format!("unknown mode {mode_str}").into())))?;
        Ok(ServerConfig { initialized: row.get::<bool, _>("initialized"), mode })
    }

    /// Idempotent: returns `true` if this call created the row, `false` if
    /// a config row already existed (spec §4.2).
    pub async fn init_server_config(&self, mode: Mode) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO server_config (id, initialized, mode) VALUES (1, 1, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(mode.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- Users ----

    pub async fn create_user(&self, new: NewUser) -> Result<()> {
        sqlx::query("INSERT INTO users (username, role, access_token) VALUES (?, ?, ?)")
            .bind(&new.username)
            .bind(new.role.as_str())
            .bind(&new.access_token)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(&new.username, e))?;
        Ok(())
    }

    pub async fn get_user_by_token(&self, token: &str) -> Result<User> {
        let row = sqlx::query("SELECT username, role, access_token FROM users WHERE access_token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound("user token".to_string()))?;
        row_to_user(&row)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<User> {
        let row = sqlx::query("SELECT username, role, access_token FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        row_to_user(&row)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT username, role, access_token FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_user).collect()
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?").bind(username).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(username.to_string()));
        }
        Ok(())
    }

    // ---- MCP clients ----

    pub async fn create_client(&self, new: NewMcpClient) -> Result<()> {
        let allow_list_json = serde_json::to_string(&new.allow_list)?;
        sqlx::query(
            "INSERT INTO mcp_clients (name, description, access_token, allow_list_json) VALUES (?, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.access_token)
        .bind(&allow_list_json)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(&new.name, e))?;
        Ok(())
    }

    pub async fn get_client_by_token(&self, token: &str) -> Result<McpClient> {
        let row = sqlx::query(
            "SELECT name, description, access_token, allow_list_json FROM mcp_clients WHERE access_token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("client token".to_string()))?;
        row_to_client(&row)
    }

    pub async fn get_client_by_name(&self, name: &str) -> Result<McpClient> {
        let row = sqlx::query(
            "SELECT name, description, access_token, allow_list_json FROM mcp_clients WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        row_to_client(&row)
    }

    pub async fn list_clients(&self) -> Result<Vec<McpClient>> {
        let rows = sqlx::query("SELECT name, description, access_token, allow_list_json FROM mcp_clients ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_client).collect()
    }

    pub async fn delete_client(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM mcp_clients WHERE name = ?").bind(name).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }
}

fn row_to_server(row: &sqlx::sqlite::SqliteRow) -> Result<Server> {
    let config_json: String = row.get("config_json");
    Ok(Server {
        name: row.get("name"),
        description: row.get("description"),
        transport: serde_json::from_str(&config_json)?,
    })
}

fn row_to_tool(row: &sqlx::sqlite::SqliteRow) -> Result<Tool> {
    let schema_json: String = row.get("input_schema");
    Ok(Tool {
        server: row.get("server"),
        name: row.get("name"),
        description: row.get("description"),
        enabled: row.get::<bool, _>("enabled"),
        input_schema: serde_json::from_str(&schema_json)?,
    })
}

fn row_to_prompt(row: &sqlx::sqlite::SqliteRow) -> Result<Prompt> {
    let schema_json: String = row.get("argument_schema");
    Ok(Prompt {
        server: row.get("server"),
        name: row.get("name"),
        description: row.get("description"),
        enabled: row.get::<bool, _>("enabled"),
        argument_schema: serde_json::from_str(&schema_json)?,
    })
}

fn row_to_group(row: &sqlx::sqlite::SqliteRow) -> Result<ToolGroup> {
    let config_json: String = row.get("config_json");
    Ok(ToolGroup { name: row.get("name"), config: serde_json::from_str(&config_json)? })
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = Role::parse(&role_str)
        .ok_or_else(|| StoreError::Database(sqlx::Error::Decode(format!("unknown role {role_str}").into())))?;
    Ok(User { username: row.get("username"), role, access_token: row.get("access_token") })
}

fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Result<McpClient> {
    let allow_list_json: String = row.get("allow_list_json");
    Ok(McpClient {
        name: row.get("name"),
        description: row.get("description"),
        access_token: row.get("access_token"),
        allow_list: serde_json::from_str(&allow_list_json)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_server(name: &str) -> NewServer {
        NewServer {
            name: name.to_string(),
            description: "test server".to_string(),
            transport: TransportConfig::StreamableHttp { url: "http://up/mcp".to_string(), bearer_token: None },
        }
    }

    #[tokio::test]
    async fn server_create_get_list() {
        let store = RegistryStore::in_memory().await.unwrap();
        store.create_server(http_server("weather")).await.unwrap();

        let fetched = store.get_server_by_name("weather").await.unwrap();
        assert_eq!(fetched.name, "weather");
        assert_eq!(fetched.transport.tag(), "streamable_http");

        let all = store.list_servers().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_server_name_is_conflict() {
        let store = RegistryStore::in_memory().await.unwrap();
        store.create_server(http_server("weather")).await.unwrap();
        let err = store.create_server(http_server("weather")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_server_is_not_found() {
        let store = RegistryStore::in_memory().await.unwrap();
        let err = store.get_server_by_name("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_server_cascades_tools_and_prompts() {
        let store = RegistryStore::in_memory().await.unwrap();
        store.create_server(http_server("weather")).await.unwrap();
        store
            .create_tool(NewTool {
                server: "weather".to_string(),
                name: "now".to_string(),
                description: "current".to_string(),
                input_schema: serde_json::json!({}),
            })
            .await
            .unwrap();
        store
            .create_prompt(NewPrompt {
                server: "weather".to_string(),
                name: "summary".to_string(),
                description: "summarize".to_string(),
                argument_schema: serde_json::json!({}),
            })
            .await
            .unwrap();

        store.delete_server("weather").await.unwrap();

        assert!(store.list_tools_by_server("weather").await.unwrap().is_empty());
        assert!(store.list_prompts_by_server("weather").await.unwrap().is_empty());
        assert!(matches!(store.get_server_by_name("weather").await.unwrap_err(), StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_missing_server_is_not_found() {
        let store = RegistryStore::in_memory().await.unwrap();
        assert!(matches!(store.delete_server("ghost").await.unwrap_err(), StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn set_tool_enabled_round_trips() {
        let store = RegistryStore::in_memory().await.unwrap();
        store.create_server(http_server("weather")).await.unwrap();
        store
            .create_tool(NewTool {
                server: "weather".to_string(),
                name: "now".to_string(),
                description: "current".to_string(),
                input_schema: serde_json::json!({}),
            })
            .await
            .unwrap();

        store.set_tool_enabled("weather", "now", false).await.unwrap();
        let tool = store.get_tool("weather", "now").await.unwrap();
        assert!(!tool.enabled);
    }

    #[tokio::test]
    async fn group_update_returns_prior_config() {
        let store = RegistryStore::in_memory().await.unwrap();
        let cfg = GroupConfig { description: "travel".to_string(), included_tools: vec!["weather__now".to_string()], ..Default::default() };
        store.create_group("travel", cfg.clone()).await.unwrap();

        let new_cfg = GroupConfig { description: "travel v2".to_string(), ..cfg.clone() };
        let prior = store.update_group("travel", new_cfg.clone()).await.unwrap();
        assert_eq!(prior, cfg);

        let fetched = store.get_group("travel").await.unwrap();
        assert_eq!(fetched.config, new_cfg);
    }

    #[tokio::test]
    async fn server_config_init_is_idempotent() {
        let store = RegistryStore::in_memory().await.unwrap();
        assert!(store.init_server_config(Mode::Enterprise).await.unwrap());
        assert!(!store.init_server_config(Mode::Development).await.unwrap());

        let cfg = store.get_server_config().await.unwrap();
        assert!(cfg.initialized);
        assert_eq!(cfg.mode, Mode::Enterprise);
    }

    #[tokio::test]
    async fn user_and_client_token_lookup() {
        let store = RegistryStore::in_memory().await.unwrap();
        store
            .create_user(NewUser { username: "alice".to_string(), role: Role::User, access_token: "tok-alice".to_string() })
            .await
            .unwrap();
        store
            .create_client(NewMcpClient {
                name: "bot".to_string(),
                description: "ci bot".to_string(),
                access_token: "tok-bot".to_string(),
                allow_list: vec!["weather".to_string()],
            })
            .await
            .unwrap();

        let user = store.get_user_by_token("tok-alice").await.unwrap();
        assert_eq!(user.username, "alice");

        let client = store.get_client_by_token("tok-bot").await.unwrap();
        assert_eq!(client.allow_list, vec!["weather".to_string()]);
    }
}

//! Gateway configuration, loaded the way the teacher's
//! `AggregatorConfig::load` loads its own config: a single YAML file, env
//! var overrides, and `${VAR}` interpolation for secrets
//! (`ServerAuth::resolve`'s pattern, generalised to the whole file).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// `sqlite:///path/to/registry.db` or `sqlite::memory:`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_database_url() -> String {
    "sqlite://mcp-gateway.db".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8787".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { database_url: default_database_url(), bind: default_bind() }
    }
}

impl GatewayConfig {
    /// Loads `path`, expanding `${VAR}` references against the process
    /// environment in every string value before parsing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading config from {}", path.display()))?;
        let expanded = resolve_env_vars(&raw);
        let config: Self = serde_yaml::from_str(&expanded).with_context(|| format!("parsing YAML config at {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded gateway config");
        Ok(config)
    }

    /// `--config` / `MCP_GATEWAY_CONFIG` / `./mcp-gateway.yaml`, falling
    /// back to defaults if none of those exist.
    pub fn load_default(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::load(path);
        }
        if let Ok(env_path) = std::env::var("MCP_GATEWAY_CONFIG") {
            return Self::load(env_path);
        }
        if Path::new("mcp-gateway.yaml").exists() {
            return Self::load("mcp-gateway.yaml");
        }
        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }
}

/// Replaces every `${VAR_NAME}` occurrence with the named environment
/// variable's value, leaving the reference untouched if the variable isn't
/// set (mirrors `op-mcp-aggregator::config::resolve_env_var`, applied to the
/// whole document rather than one field at a time).
fn resolve_env_vars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            break;
        };
        let var_name = &rest[start + 2..start + end];
        match std::env::var(var_name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(&rest[start..start + end + 1]),
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_env_var() {
        std::env::set_var("GATEWAY_TEST_VAR", "resolved");
        assert_eq!(resolve_env_vars("url: ${GATEWAY_TEST_VAR}/db"), "url: resolved/db");
        std::env::remove_var("GATEWAY_TEST_VAR");
    }

    #[test]
    fn leaves_unknown_var_untouched() {
        assert_eq!(resolve_env_vars("token: ${GATEWAY_TEST_VAR_MISSING}"), "token: ${GATEWAY_TEST_VAR_MISSING}");
    }

    #[test]
    fn default_config_is_sensible() {
        let config = GatewayConfig::default();
        assert!(config.database_url.starts_with("sqlite://"));
        assert!(config.bind.contains(':'));
    }
}

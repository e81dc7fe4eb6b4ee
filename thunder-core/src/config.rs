//! Typed configuration loaded from `thunder.yaml`, `.env`, and environment
//! variables.
//!
//! Resolution order (lowest to highest priority): the YAML file, `.env`
//! (never overwriting already-set variables), then `THUNDER_*` environment
//! variables.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::flow::FlowType;

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O or YAML parsing error occurred while loading the config file.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Which flow definition backing is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Mutable,
    Declarative,
    Composite,
}

impl StoreMode {
    /// Parse an explicit `flow.store` value. Trimmed, case-insensitive;
    /// unrecognised values return `None` so the caller can fall back.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mutable" => Some(StoreMode::Mutable),
            "declarative" => Some(StoreMode::Declarative),
            "composite" => Some(StoreMode::Composite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Deployment identifier, the tenant analog for assertion defaults.
    pub identifier: String,
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            identifier: "thunder".into(),
            listen: "0.0.0.0:8090".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlowStoreConfig {
    /// Explicit store mode: `mutable`, `declarative`, or `composite`.
    pub store: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeclarativeResourcesConfig {
    pub enabled: bool,
    /// Directory scanned for `*.yaml` flow resources at startup.
    pub dir: String,
}

impl Default for DeclarativeResourcesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "resources/flows".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Tenant-level default issuer, used when the application's assertion
    /// config does not name one.
    pub issuer: String,
    pub validity_period_secs: u64,
    pub secret: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "thunder".into(),
            validity_period_secs: 3600,
            secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowExecutionConfig {
    pub instance_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Per-turn iteration cap preventing runaway graphs.
    pub max_iterations: u32,
    pub advance_timeout_secs: u64,
    pub executor_timeout_secs: u64,
}

impl Default for FlowExecutionConfig {
    fn default() -> Self {
        Self {
            instance_ttl_secs: 900,
            sweep_interval_secs: 60,
            max_iterations: 32,
            advance_timeout_secs: 30,
            executor_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphCacheConfig {
    pub capacity: usize,
}

impl Default for GraphCacheConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Default flow handles per flow type, used when a request names a flow type
/// rather than a flow id.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultFlowConfig {
    pub authentication: String,
    pub registration: String,
    pub user_onboarding: String,
}

impl Default for DefaultFlowConfig {
    fn default() -> Self {
        Self {
            authentication: "auth_flow_config_basic".into(),
            registration: "registration_flow_config_basic".into(),
            user_onboarding: "user_onboarding_flow".into(),
        }
    }
}

impl DefaultFlowConfig {
    pub fn handle_for(&self, flow_type: FlowType) -> &str {
        match flow_type {
            FlowType::Authentication => &self.authentication,
            FlowType::Registration => &self.registration,
            FlowType::UserOnboarding => &self.user_onboarding,
        }
    }
}

/// Root configuration for the Thunder server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThunderConfig {
    pub server: ServerConfig,
    pub flow: FlowStoreConfig,
    pub declarative_resources: DeclarativeResourcesConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub flow_execution: FlowExecutionConfig,
    pub graph_cache: GraphCacheConfig,
    pub default_flows: DefaultFlowConfig,
    pub max_page_size: u64,
}

impl Default for ThunderConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            flow: FlowStoreConfig::default(),
            declarative_resources: DeclarativeResourcesConfig::default(),
            database: DatabaseConfig::default(),
            jwt: JwtConfig::default(),
            flow_execution: FlowExecutionConfig::default(),
            graph_cache: GraphCacheConfig::default(),
            default_flows: DefaultFlowConfig::default(),
            max_page_size: 100,
        }
    }
}

impl ThunderConfig {
    /// Load configuration from the given YAML file, overlaying `.env` and
    /// `THUNDER_*` environment variables. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Load(e.to_string()))?;
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Load(e.to_string()))?
        } else {
            ThunderConfig::default()
        };

        // .env never overwrites already-set environment variables
        let _ = dotenvy::dotenv();

        config.apply_env(&std::env::vars().collect());
        Ok(config)
    }

    /// Overlay `THUNDER_*` environment variables onto the loaded values.
    fn apply_env(&mut self, vars: &HashMap<String, String>) {
        let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        if let Some(v) = get("THUNDER_SERVER_LISTEN") {
            self.server.listen = v;
        }
        if let Some(v) = get("THUNDER_SERVER_IDENTIFIER") {
            self.server.identifier = v;
        }
        if let Some(v) = get("THUNDER_FLOW_STORE") {
            self.flow.store = Some(v);
        }
        if let Some(v) = get("THUNDER_DECLARATIVE_RESOURCES_ENABLED") {
            self.declarative_resources.enabled = matches!(v.as_str(), "true" | "1");
        }
        if let Some(v) = get("THUNDER_DECLARATIVE_RESOURCES_DIR") {
            self.declarative_resources.dir = v;
        }
        if let Some(v) = get("THUNDER_DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = get("THUNDER_JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Some(v) = get("THUNDER_JWT_ISSUER") {
            self.jwt.issuer = v;
        }
    }

    /// Resolve the effective store mode.
    ///
    /// An explicit `flow.store` wins. Otherwise the declarative-resources
    /// flag picks between `declarative` and `mutable`. Unrecognised explicit
    /// values fall back to `mutable` with a warning.
    pub fn store_mode(&self) -> StoreMode {
        if let Some(raw) = self.flow.store.as_deref() {
            match StoreMode::parse(raw) {
                Some(mode) => return mode,
                None => {
                    tracing::warn!(value = %raw, "Unrecognised flow.store value, falling back to mutable");
                    return StoreMode::Mutable;
                }
            }
        }
        if self.declarative_resources.enabled {
            StoreMode::Declarative
        } else {
            StoreMode::Mutable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_store_mode_wins_over_declarative_flag() {
        let mut config = ThunderConfig::default();
        config.declarative_resources.enabled = true;
        config.flow.store = Some("  Composite ".into());
        assert_eq!(config.store_mode(), StoreMode::Composite);
    }

    #[test]
    fn declarative_flag_selects_file_store_when_mode_unset() {
        let mut config = ThunderConfig::default();
        config.declarative_resources.enabled = true;
        assert_eq!(config.store_mode(), StoreMode::Declarative);
        config.declarative_resources.enabled = false;
        assert_eq!(config.store_mode(), StoreMode::Mutable);
    }

    #[test]
    fn invalid_store_mode_falls_back_to_mutable() {
        let mut config = ThunderConfig::default();
        config.declarative_resources.enabled = true;
        config.flow.store = Some("filesystem".into());
        assert_eq!(config.store_mode(), StoreMode::Mutable);
    }

    #[test]
    fn yaml_sections_parse_with_defaults() {
        let yaml = r#"
server:
  listen: "127.0.0.1:9000"
flow:
  store: composite
jwt:
  issuer: "thunder-test"
"#;
        let config: ThunderConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.identifier, "thunder");
        assert_eq!(config.store_mode(), StoreMode::Composite);
        assert_eq!(config.jwt.issuer, "thunder-test");
        assert_eq!(config.flow_execution.max_iterations, 32);
        assert_eq!(config.graph_cache.capacity, 256);
    }

    #[test]
    fn env_overlay_applies_thunder_keys() {
        let mut config = ThunderConfig::default();
        let vars = HashMap::from([
            ("THUNDER_DATABASE_URL".to_string(), "sqlite://x.db".to_string()),
            ("THUNDER_FLOW_STORE".to_string(), "declarative".to_string()),
        ]);
        config.apply_env(&vars);
        assert_eq!(config.database.url, "sqlite://x.db");
        assert_eq!(config.store_mode(), StoreMode::Declarative);
    }
}

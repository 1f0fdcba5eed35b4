use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BondConfig {
    pub store: StoreConfig,
    pub progression: ProgressionConfig,
    pub gateway: GatewayConfig,
}

impl BondConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: BondConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, use defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BOND_DB_PATH") {
            self.store.db_path = v;
        }
        if let Ok(v) = std::env::var("BOND_GATEWAY_HOST") {
            self.gateway.host = v;
        }
        if let Ok(v) = std::env::var("BOND_GATEWAY_PORT") {
            if let Ok(n) = v.parse() {
                self.gateway.port = n;
            }
        }
        if let Ok(v) = std::env::var("BOND_ADMIN_ENABLED") {
            if let Ok(b) = v.parse() {
                self.gateway.admin_enabled = b;
            }
        }
        if let Ok(v) = std::env::var("BOND_RECORD_MESSAGE_CONTENT") {
            if let Ok(b) = v.parse() {
                self.progression.record_message_content = b;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: String,
    pub max_connections: u32,
    /// How long a writer waits for SQLite's write lock before giving up.
    pub busy_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "bond.db".to_string(),
            max_connections: 8,
            busy_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Append an audit record for every sentiment-driven update.
    pub record_history: bool,
    /// Keep the raw message text in audit records.
    pub record_message_content: bool,
    /// Fixed RNG seed for reproducible deltas. `None` uses the thread RNG.
    pub seed: Option<u64>,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            record_history: true,
            record_message_content: true,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Exposes `/dev/relationship`. Off unless explicitly enabled.
    pub admin_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            admin_enabled: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

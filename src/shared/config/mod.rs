//! Sync Engine Configuration
//!
//! Provides the process-wide configuration for the sync engine. Configuration
//! is read once at startup and shared read-only afterwards.
//!
//! # Loading Order
//!
//! 1. TOML file (`DOCSYNC_CONFIG`, default `docsync.toml`; skipped when absent)
//! 2. Environment overrides (`DOCSYNC_*`, `DATABASE_URL`)
//! 3. Validation
//!
//! # Example
//!
//! ```rust,no_run
//! use docsync::shared::config::SyncConfig;
//!
//! let config = SyncConfig::load().expect("valid configuration");
//! println!("listening on {}", config.server.bind_addr);
//! ```

/// Collection, role and projection descriptions
pub mod collections;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::shared::error::{SharedError, SharedResult};
use crate::shared::rights::{split_right, ProjectRights};

pub use collections::{CollectionConfig, DomainConfig, ProjectRoleConfig, ProjectionConfig, RuleKind};

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "docsync.toml";

/// Server listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for HTTP and WebSocket
    pub bind_addr: String,
    /// Treat loopback peers as trusted server connections
    pub trust_loopback: bool,
    /// Per-connection outbound message buffer
    pub outbound_buffer: usize,
    /// Seconds between resource monitor reports
    pub monitor_interval_secs: u64,
    /// Seconds between pub/sub channel cleanups
    pub channel_cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5003".to_string(),
            trust_loopback: true,
            outbound_buffer: 256,
            monitor_interval_secs: 60,
            channel_cleanup_interval_secs: 300,
        }
    }
}

/// Token verification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwks_url: Option<String>,
    pub audience: String,
    /// Scope that must appear in the token's scope claim
    pub scope: String,
    pub algorithms: Vec<String>,
    pub user_id_claim: String,
    pub role_claim: String,
    pub scope_claim: String,
    /// Minimum seconds between JWKS refetches triggered by unknown key ids
    pub jwks_refresh_min_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            audience: "docsync".to_string(),
            scope: "docsync:data".to_string(),
            algorithms: vec!["RS256".to_string()],
            user_id_claim: "sub".to_string(),
            role_claim: "role".to_string(),
            scope_claim: "scope".to_string(),
            jwks_refresh_min_secs: 30,
        }
    }
}

/// Durable store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Postgres URL; the in-memory store is used when absent
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
        }
    }
}

/// Submit pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Transform-and-retry attempts before a submit fails with a conflict
    pub max_submit_retries: u32,
    /// Versions between stored milestone snapshots, per collection
    pub milestone_intervals: HashMap<String, u64>,
    pub migrations_enabled: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_submit_retries: 5,
            milestone_intervals: HashMap::from([("texts".to_string(), 1000)]),
            migrations_enabled: true,
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub log_level: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub sync: SyncSettings,
    pub collections: Vec<CollectionConfig>,
    pub roles: Vec<ProjectRoleConfig>,
    pub projections: Vec<ProjectionConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            store: StoreConfig::default(),
            sync: SyncSettings::default(),
            collections: Vec::new(),
            roles: Vec::new(),
            projections: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Load configuration from the config file and environment
    pub fn load() -> SharedResult<Self> {
        let path = std::env::var("DOCSYNC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> SharedResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SharedError::config(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&contents).map_err(|e| SharedError::config(format!("Failed to parse config file: {}", e)))
    }

    fn apply_env_overrides(&mut self) -> SharedResult<()> {
        use std::env;

        if let Ok(addr) = env::var("DOCSYNC_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Ok(flag) = env::var("DOCSYNC_TRUST_LOOPBACK") {
            self.server.trust_loopback = flag
                .parse()
                .map_err(|e| SharedError::config(format!("Invalid DOCSYNC_TRUST_LOOPBACK: {}", e)))?;
        }

        if let Ok(url) = env::var("DOCSYNC_JWKS_URL") {
            self.auth.jwks_url = Some(url);
        }

        if let Ok(audience) = env::var("DOCSYNC_AUDIENCE") {
            self.auth.audience = audience;
        }

        if let Ok(scope) = env::var("DOCSYNC_SCOPE") {
            self.auth.scope = scope;
        }

        if let Ok(url) = env::var("DATABASE_URL") {
            self.store.database_url = Some(url);
        }

        if let Ok(retries) = env::var("DOCSYNC_MAX_SUBMIT_RETRIES") {
            self.sync.max_submit_retries = retries
                .parse()
                .map_err(|e| SharedError::config(format!("Invalid DOCSYNC_MAX_SUBMIT_RETRIES: {}", e)))?;
        }

        if let Ok(level) = env::var("DOCSYNC_LOG_LEVEL") {
            self.log_level = level;
        }

        Ok(())
    }

    /// Check the configuration for internal consistency
    pub fn validate(&self) -> SharedResult<()> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(SharedError::config(format!("Invalid log level '{}'", other))),
        }

        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(SharedError::config(format!("Invalid bind address '{}'", self.server.bind_addr)));
        }

        if self.auth.algorithms.is_empty() {
            return Err(SharedError::config("At least one token algorithm is required"));
        }

        let mut names = HashSet::new();
        let mut domains = HashSet::new();
        for collection in &self.collections {
            if !names.insert(collection.name.as_str()) {
                return Err(SharedError::config(format!("Duplicate collection '{}'", collection.name)));
            }
            for domain in &collection.domains {
                if domain.domain == 0 || domain.domain % 10 != 0 {
                    return Err(SharedError::config(format!(
                        "Collection '{}': domain {} must be a positive multiple of 10",
                        collection.name, domain.domain
                    )));
                }
                domains.insert(domain.domain);
            }
            if collection.rules == Some(RuleKind::ProjectData) && collection.domains.is_empty() {
                return Err(SharedError::config(format!(
                    "Collection '{}' uses project data rules but declares no domains",
                    collection.name
                )));
            }
        }

        for role in &self.roles {
            for code in &role.rights {
                if split_right(*code).is_none() {
                    return Err(SharedError::config(format!(
                        "Role '{}' has malformed right {}",
                        role.name, code
                    )));
                }
            }
        }
        self.project_rights().validate(&domains)?;

        for projection in &self.projections {
            if !names.contains(projection.collection.as_str()) {
                return Err(SharedError::config(format!(
                    "Projection '{}' references unknown collection '{}'",
                    projection.name, projection.collection
                )));
            }
        }

        Ok(())
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn projection(&self, name: &str) -> Option<&ProjectionConfig> {
        self.projections.iter().find(|p| p.name == name)
    }

    /// Rights table built from the configured roles
    pub fn project_rights(&self) -> ProjectRights {
        ProjectRights::from_roles(&self.roles)
    }

    /// Milestone interval for a collection, if milestones are kept
    pub fn milestone_interval(&self, collection: &str) -> Option<u64> {
        self.sync
            .milestone_intervals
            .get(collection)
            .copied()
            .filter(|interval| *interval > 0)
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.bind_addr = addr.into();
        self
    }

    pub fn trust_loopback(mut self, trust: bool) -> Self {
        self.config.server.trust_loopback = trust;
        self
    }

    pub fn jwks_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.jwks_url = Some(url.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.auth.audience = audience.into();
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.auth.scope = scope.into();
        self
    }

    pub fn algorithms(mut self, algorithms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.auth.algorithms = algorithms.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_submit_retries(mut self, retries: u32) -> Self {
        self.config.sync.max_submit_retries = retries;
        self
    }

    pub fn milestone_interval(mut self, collection: impl Into<String>, interval: u64) -> Self {
        self.config.sync.milestone_intervals.insert(collection.into(), interval);
        self
    }

    pub fn collection(mut self, collection: CollectionConfig) -> Self {
        self.config.collections.push(collection);
        self
    }

    pub fn role(mut self, role: ProjectRoleConfig) -> Self {
        self.config.roles.push(role);
        self
    }

    pub fn projection(mut self, projection: ProjectionConfig) -> Self {
        self.config.projections.push(projection);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> SharedResult<SyncConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Herald configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HeraldError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// SQLite file shared by the scheduling and dispatching processes.
    #[serde(default = "default_store_path")]
    pub store_path: String,
    /// Dispatcher poll cadence in seconds. Coarse by design.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Max notifications claimed per poll cycle.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Minutes before a claimed-but-unfinalized row is considered stale.
    /// Must exceed expected delivery latency by a safe margin.
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_min: i64,
    /// Minutes of past-due tolerance when scheduling; anything older is
    /// dropped instead of scheduled (no backfill spam).
    #[serde(default = "default_grace_window")]
    pub grace_window_min: i64,
    /// Days to keep sent rows before `purge-sent` removes them.
    #[serde(default = "default_sent_retention")]
    pub sent_retention_days: i64,
    /// Timing-policy additions/overrides layered over the built-in table.
    #[serde(default)]
    pub policy: Vec<PolicyEntry>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_store_path() -> String {
    HeraldConfig::home_dir()
        .join("notifications.db")
        .to_string_lossy()
        .into_owned()
}
fn default_poll_interval() -> u64 {
    45
}
fn default_batch_limit() -> usize {
    25
}
fn default_claim_timeout() -> i64 {
    10
}
fn default_grace_window() -> i64 {
    5
}
fn default_sent_retention() -> i64 {
    7
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            poll_interval_secs: default_poll_interval(),
            batch_limit: default_batch_limit(),
            claim_timeout_min: default_claim_timeout(),
            grace_window_min: default_grace_window(),
            sent_retention_days: default_sent_retention(),
            policy: Vec::new(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl HeraldConfig {
    /// Load config from the default path (~/.herald/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HeraldError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| HeraldError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| HeraldError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Herald home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".herald")
    }
}

/// One timing-policy entry: offsets in minutes before the anchor instant.
/// `profile = None` targets the profile-agnostic generic table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub profile: Option<String>,
    pub category: String,
    #[serde(default)]
    pub start: Vec<i64>,
    #[serde(default)]
    pub end: Vec<i64>,
}

/// Delivery transport configuration. Transport selection happens here, not
/// by code branching inside the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// "api" (direct chat API from a long-lived process) or "webhook"
    /// (outbound webhook call from a standalone job).
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Bot token for the "api" transport.
    #[serde(default)]
    pub api_token: String,
    /// Base URL for the "api" transport.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Per-profile destinations.
    #[serde(default)]
    pub destinations: Vec<DestinationEntry>,
}

fn default_transport() -> String {
    "webhook".into()
}
fn default_api_base() -> String {
    "https://discord.com/api/v10".into()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            api_token: String::new(),
            api_base: default_api_base(),
            destinations: Vec::new(),
        }
    }
}

impl DeliveryConfig {
    /// Look up the destination entry for a profile.
    pub fn destination(&self, profile: &str) -> Option<&DestinationEntry> {
        self.destinations
            .iter()
            .find(|d| d.profile.eq_ignore_ascii_case(profile))
    }

    /// Role-mention token for a profile, if one is configured.
    pub fn mention(&self, profile: &str) -> Option<&str> {
        self.destination(profile)
            .and_then(|d| d.mention.as_deref())
            .filter(|m| !m.is_empty())
    }
}

/// Where notifications for one profile go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationEntry {
    pub profile: String,
    /// Channel id for the "api" transport.
    #[serde(default)]
    pub channel_id: String,
    /// Full webhook URL for the "webhook" transport.
    #[serde(default)]
    pub webhook_url: String,
    /// Role-mention token rendered into messages, e.g. "<@&123456>".
    #[serde(default)]
    pub mention: Option<String>,
}

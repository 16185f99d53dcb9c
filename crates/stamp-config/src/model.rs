// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Stamp assistant.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Stamp configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StampConfig {
    /// Assistant identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// External HR backend settings.
    #[serde(default)]
    pub hr: HrConfig,

    /// Retry queue and background processor settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Deletion lifecycle settings.
    #[serde(default)]
    pub deletion: DeletionConfig,

    /// Concurrent-session detection settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Assistant identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "stamp".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
///
/// Two interchangeable backends satisfy the same contracts: `sqlite`
/// (durable, production default) and `memory` (local development and
/// tests). Every other component depends only on the store traits, so a
/// backend swap is behavior-transparent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend selector: "sqlite" or "memory".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Path to the SQLite database file (sqlite backend only).
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("stamp").join("stamp.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("stamp.db"))
        .to_string_lossy()
        .into_owned()
}

/// External HR backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HrConfig {
    /// Base URL of the HR time-tracking API.
    #[serde(default = "default_hr_base_url")]
    pub base_url: String,

    /// API key for the HR backend. `None` falls back to `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable to read the API key from when `api_key` is unset.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// How long a fetched API key stays valid before a pull-based refresh.
    #[serde(default = "default_api_key_ttl_secs")]
    pub api_key_ttl_secs: u64,

    /// Per-request timeout for HR calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HrConfig {
    fn default() -> Self {
        Self {
            base_url: default_hr_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            api_key_ttl_secs: default_api_key_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_hr_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_api_key_env() -> String {
    "STAMP_HR_API_KEY".to_string()
}

fn default_api_key_ttl_secs() -> u64 {
    900 // 15 minutes
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Retry queue and background processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Maximum automatic retries per queued submission.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Poll interval of the background processor, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum items claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-attempt timeout; doubles as the processing lock lease.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Days before terminal queue items are garbage collected.
    #[serde(default = "default_item_ttl_days")]
    pub item_ttl_days: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            item_ttl_days: default_item_ttl_days(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_batch_size() -> usize {
    16
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

fn default_item_ttl_days() -> i64 {
    7
}

/// Deletion lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeletionConfig {
    /// Grace period between a request and its scheduled execution, in days.
    #[serde(default = "default_grace_days")]
    pub grace_days: i64,

    /// Interval of the sweeper that processes due requests, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            grace_days: default_grace_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_grace_days() -> i64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    3600 // 1 hour
}

/// Concurrent-session detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Trailing activity window for collision detection, in minutes.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
        }
    }
}

fn default_window_minutes() -> i64 {
    30
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    7420
}

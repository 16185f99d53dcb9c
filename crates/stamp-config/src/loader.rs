// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./stamp.toml` > `~/.config/stamp/stamp.toml` > `/etc/stamp/stamp.toml`
//! with environment variable overrides via `STAMP_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::StampConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/stamp/stamp.toml` (system-wide)
/// 3. `~/.config/stamp/stamp.toml` (user XDG config)
/// 4. `./stamp.toml` (local directory)
/// 5. `STAMP_*` environment variables
pub fn load_config() -> Result<StampConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StampConfig::default()))
        .merge(Toml::file("/etc/stamp/stamp.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("stamp/stamp.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("stamp.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<StampConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StampConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<StampConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StampConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `STAMP_STORAGE_DATABASE_PATH` must map
/// to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("STAMP_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: STAMP_STORAGE_DATABASE_PATH -> "storage_database_path"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("hr_", "hr.", 1)
            .replacen("delivery_", "delivery.", 1)
            .replacen("deletion_", "deletion.", 1)
            .replacen("session_", "session.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_file() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.agent.name, "stamp");
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.delivery.max_retries, 3);
        assert_eq!(config.deletion.grace_days, 30);
        assert_eq!(config.session.window_minutes, 30);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [storage]
            backend = "memory"

            [delivery]
            max_retries = 5
            poll_interval_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.delivery.max_retries, 5);
        assert_eq!(config.delivery.poll_interval_secs, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.gateway.port, 7420);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
            [delivery]
            max_retrys = 5
            "#,
        );
        assert!(result.is_err());
    }
}

// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as a recognized storage backend name, sane retry
//! bounds, and a plausible HR base URL.

use crate::diagnostic::ConfigError;
use crate::model::StampConfig;

/// Backends the storage crate can construct.
pub const KNOWN_BACKENDS: &[&str] = &["sqlite", "memory"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &StampConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !KNOWN_BACKENDS.contains(&config.storage.backend.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "storage.backend `{}` is not recognized (expected one of: {})",
                config.storage.backend,
                KNOWN_BACKENDS.join(", ")
            ),
        });
    }

    if config.storage.backend == "sqlite" && config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty for the sqlite backend".to_string(),
        });
    }

    if config.hr.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "hr.base_url must not be empty".to_string(),
        });
    } else if !config.hr.base_url.starts_with("http://")
        && !config.hr.base_url.starts_with("https://")
    {
        errors.push(ConfigError::Validation {
            message: format!("hr.base_url `{}` must start with http:// or https://", config.hr.base_url),
        });
    }

    if config.delivery.max_retries > 10 {
        errors.push(ConfigError::Validation {
            message: format!(
                "delivery.max_retries must be at most 10, got {} (exponential backoff grows past any sane deadline)",
                config.delivery.max_retries
            ),
        });
    }

    if config.delivery.attempt_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "delivery.attempt_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.delivery.poll_interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "delivery.poll_interval_secs must be at least 1".to_string(),
        });
    }

    if config.delivery.batch_size == 0 {
        errors.push(ConfigError::Validation {
            message: "delivery.batch_size must be at least 1".to_string(),
        });
    }

    if config.deletion.grace_days < 1 {
        errors.push(ConfigError::Validation {
            message: format!("deletion.grace_days must be at least 1, got {}", config.deletion.grace_days),
        });
    }

    if config.session.window_minutes < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "session.window_minutes must be at least 1, got {}",
                config.session.window_minutes
            ),
        });
    }

    if config.gateway.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&StampConfig::default()).is_ok());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut config = StampConfig::default();
        config.storage.backend = "cosmos".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("cosmos")));
    }

    #[test]
    fn all_errors_are_collected_not_just_the_first() {
        let mut config = StampConfig::default();
        config.storage.backend = "nope".to_string();
        config.delivery.max_retries = 99;
        config.deletion.grace_days = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn base_url_scheme_is_required() {
        let mut config = StampConfig::default();
        config.hr.base_url = "hr.example.com".to_string();
        assert!(validate_config(&config).is_err());
        config.hr.base_url = "https://hr.example.com".to_string();
        assert!(validate_config(&config).is_ok());
    }
}

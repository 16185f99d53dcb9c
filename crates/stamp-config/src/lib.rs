// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Stamp assistant.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, environment variable
//! overrides, and diagnostic error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use stamp_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("backend: {}", config.storage.backend);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::StampConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// This is the high-level entry point that:
/// 1. Loads config from TOML files + env vars via Figment
/// 2. On success: runs post-deserialization validation
/// 3. On Figment error: converts to miette diagnostics with typo suggestions
///
/// Returns either a valid `StampConfig` or a list of diagnostic errors.
pub fn load_and_validate() -> Result<StampConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err)),
    }
}

/// Load configuration from an inline TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<StampConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_validate_str_accepts_valid_config() {
        let config = load_and_validate_str(
            r#"
            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, "memory");
    }

    #[test]
    fn load_and_validate_str_reports_unknown_key_with_suggestion() {
        let errors = load_and_validate_str(
            r#"
            [delivery]
            max_retrys = 5
            "#,
        )
        .unwrap_err();
        assert!(!errors.is_empty());
        let rendered = errors[0].to_string();
        assert!(rendered.contains("max_retrys"), "got: {rendered}");
    }

    #[test]
    fn load_and_validate_str_reports_semantic_errors() {
        let errors = load_and_validate_str(
            r#"
            [storage]
            backend = "dynamo"
            "#,
        )
        .unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("dynamo")));
    }
}

//! Failure modes of the layered configuration loader.

use std::path::PathBuf;
use thiserror::Error;
use validator::ValidationErrors;

/// Everything that can go wrong between reading sources and a validated
/// [`crate::LanevaktConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// One or more fields failed validation after extraction.
    #[error("invalid configuration:\n{}", render_field_errors(.0))]
    Validation(#[source] ValidationErrors),

    /// Figment could not parse or merge a source layer.
    #[error("configuration parsing error: {0}")]
    Parsing(#[from] figment::Error),
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}

fn render_field_errors(errors: &ValidationErrors) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for (field, field_errors) in errors.field_errors() {
        let _ = writeln!(out, "field '{field}':");
        for error in field_errors {
            let detail = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| error.code.to_string());
            let _ = writeln!(out, "  - {detail}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainConfig;
    use validator::Validate;

    #[test]
    fn validation_variant_lists_each_offending_field() {
        let config = ChainConfig {
            rpc_url: "not a url".into(),
            pool_address: "0xnope".into(),
            polling_interval_ms: 10,
        };

        let rendered = ConfigError::from(config.validate().unwrap_err()).to_string();
        assert!(rendered.contains("field 'rpc_url'"));
        assert!(rendered.contains("field 'pool_address'"));
        assert!(rendered.contains("field 'polling_interval_ms'"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ConfigError::FileNotFound(PathBuf::from("config/absent.yaml"));
        assert!(err.to_string().contains("config/absent.yaml"));
    }
}

//! Custom validation functions for configuration.

use validator::ValidationError;

/// Validate a 20-byte hex contract address with `0x` prefix.
pub fn validate_address(addr: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^0x[0-9a-fA-F]{40}$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(addr) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_address"))
    }
}

/// Validate a tracing log level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (fee rates, timeouts, intervals)
//! - Check the endpoint and address prefix are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SporeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::SporeConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &SporeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = url::Url::parse(&config.network.rpc_url) {
        errors.push(ValidationError::new("network.rpc_url", format!("invalid URL: {}", e)));
    }

    if !matches!(config.network.address_prefix.as_str(), "ckb" | "ckt") {
        errors.push(ValidationError::new(
            "network.address_prefix",
            format!("expected 'ckb' or 'ckt', got '{}'", config.network.address_prefix),
        ));
    }

    if config.fees.fee_rate == 0 {
        errors.push(ValidationError::new("fees.fee_rate", "must be greater than zero"));
    }
    if config.fees.fee_rate < config.fees.min_fee_rate {
        errors.push(ValidationError::new(
            "fees.fee_rate",
            format!("below minimum fee rate {}", config.fees.min_fee_rate),
        ));
    }

    let scripts = &config.scripts;
    if scripts.spore.code_hash == scripts.cluster.code_hash {
        errors.push(ValidationError::new("scripts.cluster", "shares its code hash with scripts.spore"));
    }

    if config.confirmation.timeout_secs == 0 {
        errors.push(ValidationError::new("confirmation.timeout_secs", "must be greater than zero"));
    }
    if config.confirmation.poll_interval_ms == 0 {
        errors.push(ValidationError::new("confirmation.poll_interval_ms", "must be greater than zero"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if config.devnet.genesis_cells == 0 {
        errors.push(ValidationError::new("devnet.genesis_cells", "must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(validate_config(&SporeConfig::testnet()).is_ok());
        assert!(validate_config(&SporeConfig::devnet()).is_ok());
    }

    #[test]
    fn test_bad_url_and_prefix() {
        let mut config = SporeConfig::default();
        config.network.rpc_url = "not a url".to_string();
        config.network.address_prefix = "eth".to_string();
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"network.rpc_url"));
        assert!(fields.contains(&"network.address_prefix"));
    }

    #[test]
    fn test_fee_rate_below_minimum() {
        let mut config = SporeConfig::default();
        config.fees.fee_rate = 500;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "fees.fee_rate");
        assert!(errors[0].to_string().contains("below minimum"));
    }

    #[test]
    fn test_unknown_log_level() {
        let mut config = SporeConfig::default();
        config.observability.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }
}

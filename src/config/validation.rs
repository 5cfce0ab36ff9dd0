//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds and durations > 0)
//! - Validate addresses parse as socket addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GuardConfig;

/// A single semantic rule violated by a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("abuse.fallback_key must not be empty")]
    EmptyFallbackKey,

    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyAdminKey,
}

/// Check every semantic rule, collecting all violations.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "upstream.address", &config.upstream.address);

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    let abuse = &config.abuse;
    if abuse.max_failed_attempts == 0 {
        errors.push(ValidationError::Zero("abuse.max_failed_attempts"));
    }
    if abuse.attempt_window_secs == 0 {
        errors.push(ValidationError::Zero("abuse.attempt_window_secs"));
    }
    if abuse.block_duration_secs == 0 {
        errors.push(ValidationError::Zero("abuse.block_duration_secs"));
    }
    if abuse.max_tracked_keys == 0 {
        errors.push(ValidationError::Zero("abuse.max_tracked_keys"));
    }
    if abuse.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero("abuse.sweep_interval_secs"));
    }
    if abuse.fallback_key.trim().is_empty() {
        errors.push(ValidationError::EmptyFallbackKey);
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::EmptyAdminKey);
        }
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

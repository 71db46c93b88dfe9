//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Check cache limits are consistent with each other
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("forwarding.max_request_bytes ({max_request_bytes}) is smaller than forwarding.io_buffer_size ({io_buffer_size})")]
    RequestLimitBelowBuffer {
        max_request_bytes: usize,
        io_buffer_size: usize,
    },

    #[error("cache.max_element_bytes ({max_element_bytes}) exceeds cache.max_total_bytes ({max_total_bytes})")]
    ElementLargerThanCache {
        max_element_bytes: usize,
        max_total_bytes: usize,
    },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::Zero("listener.backlog"));
    }

    let forwarding = &config.forwarding;
    if forwarding.io_buffer_size == 0 {
        errors.push(ValidationError::Zero("forwarding.io_buffer_size"));
    } else if forwarding.max_request_bytes < forwarding.io_buffer_size {
        errors.push(ValidationError::RequestLimitBelowBuffer {
            max_request_bytes: forwarding.max_request_bytes,
            io_buffer_size: forwarding.io_buffer_size,
        });
    }
    if forwarding.default_port == 0 {
        errors.push(ValidationError::Zero("forwarding.default_port"));
    }

    let cache = &config.cache;
    if cache.max_element_bytes == 0 {
        errors.push(ValidationError::Zero("cache.max_element_bytes"));
    }
    if cache.max_element_bytes > cache.max_total_bytes {
        errors.push(ValidationError::ElementLargerThanCache {
            max_element_bytes: cache.max_element_bytes,
            max_total_bytes: cache.max_total_bytes,
        });
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

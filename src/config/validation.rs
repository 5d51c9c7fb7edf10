//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges, backend addresses
//! and bind addresses. All errors are collected, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no backends configured")]
    NoBackends,

    #[error("invalid backend address '{address}': {reason}")]
    InvalidBackendAddress { address: String, reason: String },

    #[error("duplicate backend address '{0}'")]
    DuplicateBackend(String),

    #[error("invalid weight {weight} for backend '{address}'")]
    InvalidWeight { address: String, weight: f64 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid {field} '{value}'")]
    InvalidBindAddress { field: &'static str, value: String },

    #[error("health check path '{0}' must start with '/'")]
    InvalidHealthPath(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut seen = HashSet::new();
    for backend in &config.backends {
        if let Err(reason) = check_backend_address(&backend.address) {
            errors.push(ValidationError::InvalidBackendAddress {
                address: backend.address.clone(),
                reason,
            });
        }
        if !seen.insert(backend.address.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicateBackend(backend.address.clone()));
        }
        if !backend.weight.is_finite() || backend.weight < 0.0 {
            errors.push(ValidationError::InvalidWeight {
                address: backend.address.clone(),
                weight: backend.weight,
            });
        }
    }

    let positive = [
        ("health_check.interval_secs", config.health_check.interval_secs),
        ("health_check.timeout_secs", config.health_check.timeout_secs),
        ("weights.interval_secs", config.weights.interval_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        (
            "circuit_breaker.failure_threshold",
            u64::from(config.circuit_breaker.failure_threshold),
        ),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if !config.health_check.path.starts_with('/') {
        errors.push(ValidationError::InvalidHealthPath(
            config.health_check.path.clone(),
        ));
    }

    check_bind(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_bind(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_bind(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_backend_address(address: &str) -> Result<(), String> {
    let url = Url::parse(address).map_err(|e| e.to_string())?;
    // Plain HTTP only; the outbound client carries no TLS stack
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    // The request path and query are appended to the address verbatim
    if url.query().is_some() || url.fragment().is_some() {
        return Err("must not carry a query or fragment".to_string());
    }
    Ok(())
}

fn check_bind(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    fn config_with(addresses: &[&str]) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.backends = addresses.iter().map(|a| BackendConfig::new(*a)).collect();
        config
    }

    #[test]
    fn test_valid_config() {
        let config = config_with(&["http://127.0.0.1:8081", "http://127.0.0.1:8082"]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = config_with(&["127.0.0.1:8081", "ftp://host", "http://a:1", "http://a:1/"]);
        config.backends[2].weight = -1.0;
        config.health_check.interval_secs = 0;
        config.listener.bind_address = "nope".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 5, "got {:?}", errors);
        assert!(errors.contains(&ValidationError::DuplicateBackend("http://a:1/".into())));
        assert!(errors.contains(&ValidationError::Zero {
            field: "health_check.interval_secs"
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidWeight { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidBindAddress { .. })));
    }

    #[test]
    fn test_query_and_fragment_rejected() {
        let config = config_with(&["http://h:1/?a=b", "http://h:2/#top", "http://h:3/"]);
        let errors = validate_config(&config).unwrap_err();
        let rejected: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::InvalidBackendAddress { address, .. } => Some(address.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(rejected, vec!["http://h:1/?a=b", "http://h:2/#top"]);
    }

    #[test]
    fn test_empty_backends_rejected() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoBackends]);
    }
}

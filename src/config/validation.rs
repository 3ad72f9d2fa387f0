//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing static roots)
//! - Validate value ranges (timeouts > 0, connection limit > 0)
//! - Validate origins and path patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::{GatewayConfig, RouteAction};
use crate::routing::matcher::PathPattern;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("static root name `{0}` is defined more than once")]
    DuplicateRoot(String),
    #[error("static root `{name}` has mount prefix `{prefix}` that does not start with '/'")]
    InvalidMount { name: String, prefix: String },
    #[error("route `{name}`: {reason}")]
    InvalidPattern { name: String, reason: String },
    #[error("route `{route}` references unknown static root `{root}`")]
    UnknownRoot { route: String, root: String },
    #[error("route `{route}` uses index action on root `{root}` which has no index file")]
    MissingIndex { route: String, root: String },
    #[error("route `{0}` redirect target must start with '/'")]
    InvalidRedirect(String),
    #[error("allowed origin `{0}` is not of the form scheme://host[:port]")]
    InvalidOrigin(String),
}

/// Check the configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.timeouts.header_read_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("header_read_secs"));
    }

    let mut names = HashSet::new();
    for root in &config.static_roots {
        if !names.insert(root.name.as_str()) {
            errors.push(ValidationError::DuplicateRoot(root.name.clone()));
        }
        if !root.mount_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidMount {
                name: root.name.clone(),
                prefix: root.mount_prefix.clone(),
            });
        }
    }

    for route in &config.routes {
        if let Err(e) = PathPattern::parse(&route.pattern) {
            errors.push(ValidationError::InvalidPattern {
                name: route.name.clone(),
                reason: e.to_string(),
            });
        }

        match &route.action {
            RouteAction::Redirect { to } => {
                if !to.starts_with('/') {
                    errors.push(ValidationError::InvalidRedirect(route.name.clone()));
                }
            }
            RouteAction::Index { root } => {
                match config.static_roots.iter().find(|r| &r.name == root) {
                    None => errors.push(ValidationError::UnknownRoot {
                        route: route.name.clone(),
                        root: root.clone(),
                    }),
                    Some(r) if r.index_file.is_none() => {
                        errors.push(ValidationError::MissingIndex {
                            route: route.name.clone(),
                            root: root.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
            RouteAction::Static { root } => {
                if !names.contains(root.as_str()) {
                    errors.push(ValidationError::UnknownRoot {
                        route: route.name.clone(),
                        root: root.clone(),
                    });
                }
            }
        }
    }

    for origin in &config.cors.allowed_origins {
        if !is_bare_origin(origin) {
            errors.push(ValidationError::InvalidOrigin(origin.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// An origin is scheme + host + optional port, serialized exactly as a
/// browser sends it in the `Origin` header.
fn is_bare_origin(origin: &str) -> bool {
    match url::Url::parse(origin) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some()
                && url.origin().ascii_serialization() == origin
        }
        Err(_) => false,
    }
}

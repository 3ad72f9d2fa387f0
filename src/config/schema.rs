//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (host, port, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Static bundles served from disk, in fall-through order.
    pub static_roots: Vec<StaticRootConfig>,

    /// Route table, evaluated in registration order.
    pub routes: Vec<RouteConfig>,

    /// Cross-origin allow-list.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            static_roots: vec![
                StaticRootConfig::new("app", "/app", "client/build", Some("index.html")),
                StaticRootConfig::new(
                    "presentation",
                    "/presentation",
                    "presentation",
                    Some("index.html"),
                ),
                StaticRootConfig::new("app-assets", "/", "client/build", None),
                StaticRootConfig::new("presentation-assets", "/", "presentation", None),
            ],
            routes: vec![
                RouteConfig {
                    name: "root".into(),
                    pattern: "/".into(),
                    action: RouteAction::Redirect { to: "/app".into() },
                },
                RouteConfig {
                    name: "presentation".into(),
                    pattern: "/presentation".into(),
                    action: RouteAction::Index {
                        root: "presentation".into(),
                    },
                },
                RouteConfig {
                    name: "app".into(),
                    pattern: "/app*".into(),
                    action: RouteAction::Static { root: "app".into() },
                },
            ],
            cors: CorsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (all interfaces by default).
    pub host: String,

    /// TCP port. `0` asks the OS for an ephemeral port.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// The `host:port` string handed to the socket layer.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time to produce a response) in seconds.
    pub request_secs: u64,

    /// Time allowed for a client to send its request headers, in seconds.
    pub header_read_secs: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            header_read_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// A static bundle directory mounted under a URL prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticRootConfig {
    /// Identifier referenced by routes.
    pub name: String,

    /// URL prefix the bundle is mounted under (e.g. "/app").
    pub mount_prefix: String,

    /// Bundle directory. Relative paths resolve against the working directory.
    pub directory: PathBuf,

    /// Index file served for unresolved paths (SPA fallback).
    #[serde(default)]
    pub index_file: Option<String>,
}

impl StaticRootConfig {
    pub fn new(
        name: impl Into<String>,
        mount_prefix: impl Into<String>,
        directory: impl Into<PathBuf>,
        index_file: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            mount_prefix: mount_prefix.into(),
            directory: directory.into(),
            index_file: index_file.map(str::to_string),
        }
    }
}

/// Route configuration mapping a path pattern to an action.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Exact path (`/presentation`) or trailing-wildcard prefix (`/app*`).
    pub pattern: String,

    /// What to do with a matching request.
    pub action: RouteAction,
}

/// Response directive produced by a matched route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteAction {
    /// 302 redirect to another path.
    Redirect { to: String },
    /// Serve the index file of a static root.
    Index { root: String },
    /// Resolve the request path under a static root, with SPA fallback.
    Static { root: String },
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins that receive CORS-permissive response headers.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

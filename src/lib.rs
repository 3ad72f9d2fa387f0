//! Unified connection gateway.
//!
//! One listening port serves two single-page-application bundles and hands
//! persistent connections to a pluggable realtime engine.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;
pub mod static_files;

pub use config::GatewayConfig;
pub use http::{BroadcastEngine, ConnectionGateway, GatewayError, PeerInfo, RealtimeEngine};
pub use lifecycle::Shutdown;

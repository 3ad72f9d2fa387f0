//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Install the metrics exporter when enabled
//! - Wire OS signals to graceful shutdown
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, after the tables are compiled

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::http::{ConnectionGateway, GatewayError, RealtimeEngine};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;

/// Run the gateway until an OS signal asks it to stop.
pub async fn run(
    config: GatewayConfig,
    engine: Arc<dyn RealtimeEngine>,
) -> Result<(), GatewayError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    ConnectionGateway::start(config, engine, shutdown).await
}

//! evsr-gateway
//!
//! Serves the application and presentation bundles and accepts realtime
//! connections on a single port.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │               CONNECTION GATEWAY             │
//!                       │                                              │
//!     Client            │  ┌──────────┐    ┌──────────┐                │
//!     ──────────────────┼─▶│   net    │───▶│  http    │                │
//!                       │  │ listener │    │ server   │                │
//!                       │  └──────────┘    └────┬─────┘                │
//!                       │                       │                      │
//!                       │          ┌────────────┴────────────┐         │
//!                       │          ▼                         ▼         │
//!                       │   ┌─────────────┐          ┌─────────────┐   │
//!                       │   │  websocket  │          │  security   │   │
//!                       │   │  handshake  │          │ origin guard│   │
//!                       │   └──────┬──────┘          └──────┬──────┘   │
//!                       │          ▼                        ▼          │
//!                       │   ┌─────────────┐          ┌─────────────┐   │
//!                       │   │  realtime   │          │   routing   │   │
//!                       │   │   engine    │          │ + static    │   │
//!                       │   └─────────────┘          └─────────────┘   │
//!                       │                                              │
//!                       │   config · lifecycle · observability         │
//!                       └──────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use evsr_gateway::config::load_from_env;
use evsr_gateway::lifecycle::startup;
use evsr_gateway::observability::logging;
use evsr_gateway::BroadcastEngine;

#[tokio::main]
async fn main() {
    let loaded = tracing::subscriber::with_default(logging::bootstrap(), load_from_env);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::subscriber::with_default(logging::bootstrap(), || {
                tracing::error!(error = %e, "Failed to load configuration");
            });
            std::process::exit(1);
        }
    };

    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address(),
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "evsr-gateway starting"
    );

    if let Err(e) = startup::run(config, Arc::new(BroadcastEngine::new())).await {
        tracing::error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
}

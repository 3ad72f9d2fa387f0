//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, middleware stack, dispatch)
//!     → request.rs (request ID assignment and propagation)
//!     → websocket.rs (upgrade handshake, engine handoff)
//!     → response.rs (redirects, files, error statuses)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{ConnectionGateway, GatewayError};
pub use websocket::{BroadcastEngine, PeerInfo, RealtimeEngine};

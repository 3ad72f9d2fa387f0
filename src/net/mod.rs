//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (id, classification state machine, tracking)
//!     → Hand off to HTTP layer
//!
//! Connection States:
//!     Accepted → RequestResponse → Closed
//!     Accepted → Upgrading → Persistent (engine-owned) | Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - A connection is classified once and never reclassified

pub mod connection;
pub mod listener;

pub use connection::{
    ConnectionGuard, ConnectionHandle, ConnectionId, ConnectionState, ConnectionTracker,
    InvalidTransition,
};
pub use listener::{ConnectionPermit, Listener, ListenerError};

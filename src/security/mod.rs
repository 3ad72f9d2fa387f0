//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request/response traffic (never upgraded connections):
//!     → origin.rs (allow-list check, CORS header emission, preflight)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Origin checks annotate, they do not authorize
//! - Path traversal protection lives with the static resolver

pub mod origin;

pub use origin::{origin_guard_middleware, OriginDecision, OriginGuard};

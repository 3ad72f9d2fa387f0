//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (ordered route lookup)
//!     → matcher.rs (exact / trailing-wildcard evaluation)
//!     → Return: matched Route or None (fall through to static mounts)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse patterns
//!     → Freeze as immutable RouteTable (registration order preserved)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by registration)

pub mod matcher;
pub mod router;

pub use matcher::{Matcher, PathPattern, PatternError};
pub use router::{Route, RouteTable};

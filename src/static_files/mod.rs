//! Static bundle subsystem.
//!
//! # Data Flow
//! ```text
//! Matched route (Index / Static) or unrouted request
//!     → resolver.rs (mount strip, traversal guard, SPA fallback)
//!     → Resolution (File | Fallback index) or StaticError
//!     → http::response (streamed file body, content type)
//! ```
//!
//! # Design Decisions
//! - Roots are built once at startup and shared read-only
//! - A root with an index file never yields NotFound for a missing path
//! - Paths escaping a bundle are Forbidden, never served

pub mod resolver;

pub use resolver::{Resolution, StaticError, StaticResolver, StaticRoot};

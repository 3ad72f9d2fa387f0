//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Look up the first route matching a request path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in registration order (route tables are tiny)
//! - Explicit `None` rather than silent default

use crate::config::{RouteAction, RouteConfig};
use crate::routing::matcher::{Matcher, PathPattern, PatternError};

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub pattern: PathPattern,
    pub action: RouteAction,
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        action: RouteAction,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            name: name.into(),
            pattern: PathPattern::parse(pattern)?,
            action,
        })
    }
}

/// Ordered route table. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Compile the configured routes, keeping their order.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, PatternError> {
        let routes = configs
            .iter()
            .map(|c| Route::new(c.name.clone(), &c.pattern, c.action.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { routes })
    }

    /// Find the first route whose pattern matches `path`.
    pub fn dispatch(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.pattern.matches(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

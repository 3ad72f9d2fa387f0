//! Cross-origin header emission.
//!
//! # Responsibilities
//! - Decide whether a request's `Origin` is on the allow-list
//! - Add `Access-Control-Allow-Origin` for allowed origins only
//! - Answer preflight requests from allowed origins
//!
//! # Design Decisions
//! - The guard never rejects a request. CORS is enforced by browsers; a
//!   disallowed origin still gets the normal response, minus the headers
//! - No credentials header is ever sent
//! - `Vary: Origin` is added to every response so caches keep variants apart

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::CorsConfig;

/// Methods advertised to allowed preflights.
pub const PREFLIGHT_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// Outcome of an origin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginDecision {
    Allow,
    Deny,
}

impl OriginDecision {
    pub fn is_allowed(self) -> bool {
        self == OriginDecision::Allow
    }
}

/// Allow-list of origins that receive CORS-permissive headers.
#[derive(Debug, Clone, Default)]
pub struct OriginGuard {
    allowed: HashSet<String>,
}

impl OriginGuard {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: origins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &CorsConfig) -> Self {
        Self::new(config.allowed_origins.iter().cloned())
    }

    /// Check the raw `Origin` header value. A missing header is denied.
    pub fn check(&self, origin: Option<&str>) -> OriginDecision {
        match origin {
            Some(origin) if self.allowed.contains(origin) => OriginDecision::Allow,
            _ => OriginDecision::Deny,
        }
    }

    /// Add the headers a response to `origin` should carry.
    pub fn annotate(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        headers.append(header::VARY, HeaderValue::from_static("origin"));

        let Some(origin) = origin else {
            return;
        };
        if self.check(origin.to_str().ok()).is_allowed() {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        }
    }

    /// 204 answer to a preflight from an allowed origin.
    fn preflight(&self, origin: HeaderValue, request_headers: &HeaderMap) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(PREFLIGHT_METHODS),
        );
        if let Some(requested) = request_headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
        headers.insert(header::VARY, HeaderValue::from_static("origin"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        response
    }
}

fn is_preflight(req: &Request<Body>) -> bool {
    req.method() == Method::OPTIONS
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Middleware applying the guard to the request/response pipeline.
pub async fn origin_guard_middleware(
    State(guard): State<Arc<OriginGuard>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = req.headers().get(header::ORIGIN).cloned();

    if let Some(origin) = &origin {
        let decision = guard.check(origin.to_str().ok());
        tracing::trace!(origin = ?origin, ?decision, "Origin checked");

        if decision.is_allowed() && is_preflight(&req) {
            return guard.preflight(origin.clone(), req.headers());
        }
    }

    let mut response = next.run(req).await;
    guard.annotate(origin.as_ref(), response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    fn guard() -> OriginGuard {
        OriginGuard::new(["http://localhost:3000"])
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "hello" }))
            .layer(middleware::from_fn_with_state(
                Arc::new(guard()),
                origin_guard_middleware,
            ))
    }

    #[test]
    fn check_matches_exact_origin() {
        let guard = guard();
        assert_eq!(guard.check(Some("http://localhost:3000")), OriginDecision::Allow);
        assert_eq!(guard.check(Some("http://localhost:3001")), OriginDecision::Deny);
        assert_eq!(guard.check(Some("http://evil.example")), OriginDecision::Deny);
        assert_eq!(guard.check(None), OriginDecision::Deny);
    }

    #[tokio::test]
    async fn allowed_origin_gets_cors_headers() {
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert!(!res
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_CREDENTIALS));
    }

    #[tokio::test]
    async fn denied_origin_is_served_without_cors_headers() {
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("Origin", "http://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res
            .headers()
            .keys()
            .all(|k| !k.as_str().starts_with("access-control-")));
        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn allowed_preflight_is_answered() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header("Origin", "http://localhost:3000")
                    .header("Access-Control-Request-Method", "GET")
                    .header("Access-Control-Request-Headers", "x-custom")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            PREFLIGHT_METHODS
        );
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS], "x-custom");
    }

    #[tokio::test]
    async fn denied_preflight_passes_through() {
        let res = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header("Origin", "http://evil.example")
                    .header("Access-Control-Request-Method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(!res
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}

//! Gateway server.
//!
//! # Responsibilities
//! - Build the Axum router and its middleware stack
//! - Classify each connection as request/response or persistent
//! - Dispatch request/response traffic through the route table
//! - Serve static bundles with fall-through between roots
//! - Run the accept loop with per-connection HTTP/1.1 and HTTP/2
//! - Drain in-flight connections on shutdown
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → hyper-util auto connection (upgrades enabled)
//!     → TraceLayer → request ID → timeout
//!     → classify_connection
//!         ├─ upgrade intent → websocket::upgrade → RealtimeEngine
//!         └─ otherwise → origin guard → dispatch
//!                             ├─ Redirect → 302
//!                             ├─ Index    → bundle index
//!                             ├─ Static   → bundle file or SPA fallback
//!                             └─ no route → fall-through static roots
//! ```

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, Uri},
    middleware::{self, Next},
    response::Response,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto,
};
use tokio::sync::broadcast;
use tower::Service;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{
    validation::validate_config, ConfigError, GatewayConfig, RouteAction, TimeoutConfig,
};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response;
use crate::http::websocket::{self, is_upgrade_request, RealtimeEngine};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionHandle, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::routing::{PatternError, Route, RouteTable};
use crate::security::{origin_guard_middleware, OriginGuard};
use crate::static_files::{Resolution, StaticError, StaticResolver};

/// Pause after a failed accept, matching `axum::serve`.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Fatal gateway errors. Anything here stops the process.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid route pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("failed to mount static roots: {0}")]
    StaticRoots(#[source] io::Error),
    #[error(transparent)]
    Bind(#[from] ListenerError),
    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

/// Shared state injected into handlers.
#[derive(Clone)]
struct GatewayState {
    routes: Arc<RouteTable>,
    statics: Arc<StaticResolver>,
    engine: Arc<dyn RealtimeEngine>,
}

/// One listening port serving static bundles and persistent connections.
pub struct ConnectionGateway {
    router: Router,
    config: GatewayConfig,
    tracker: ConnectionTracker,
}

impl ConnectionGateway {
    /// Compile the configuration into a ready-to-serve gateway.
    ///
    /// The engine is registered here, before any connection is accepted, so
    /// no upgrade can arrive without a receiver.
    pub fn new(
        config: GatewayConfig,
        engine: Arc<dyn RealtimeEngine>,
    ) -> Result<Self, GatewayError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let routes = RouteTable::from_config(&config.routes)?;
        let statics =
            StaticResolver::from_config(&config.static_roots).map_err(GatewayError::StaticRoots)?;
        let guard = OriginGuard::from_config(&config.cors);

        tracing::info!(
            routes = routes.len(),
            static_roots = statics.roots().len(),
            allowed_origins = config.cors.allowed_origins.len(),
            "Gateway tables compiled"
        );

        let state = GatewayState {
            routes: Arc::new(routes),
            statics: Arc::new(statics),
            engine,
        };
        let router = Self::build_router(&config, state, guard);

        Ok(Self {
            router,
            config,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: GatewayState, guard: OriginGuard) -> Router {
        let gateway = Router::new()
            .fallback(dispatch)
            .layer(middleware::from_fn_with_state(
                Arc::new(guard),
                origin_guard_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                classify_connection,
            ))
            .with_state(state);

        with_common_layers(gateway, &config.timeouts)
    }

    /// The router, for driving the gateway without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Connection tracker shared with every connection task.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept and serve connections until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway accepting connections");

        let header_timeout = Duration::from_secs(self.config.timeouts.header_read_secs);
        let mut stop = shutdown.subscribe();

        loop {
            let (stream, remote_addr, permit) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed, backing off");
                        if accept_backoff(&mut stop).await {
                            break;
                        }
                        continue;
                    }
                },
                _ = stop.recv() => break,
            };

            let guard = self.tracker.track();
            let handle = guard.handle();
            let router = self.router.clone();
            let mut conn_stop = shutdown.subscribe();

            tokio::spawn(async move {
                let _permit = permit;
                let connection_id = guard.id();

                let service = hyper::service::service_fn(move |mut req: Request<Incoming>| {
                    req.extensions_mut().insert(ConnectInfo(remote_addr));
                    req.extensions_mut().insert(handle.clone());
                    router.clone().call(req)
                });

                let mut builder = auto::Builder::new(TokioExecutor::new());
                builder
                    .http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(header_timeout);

                let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    res = conn.as_mut() => res,
                    _ = conn_stop.recv() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };

                if let Err(e) = result {
                    tracing::debug!(
                        connection_id = %connection_id,
                        remote_addr = %remote_addr,
                        error = %e,
                        "Connection ended with error"
                    );
                }
                drop(guard);
            });
        }

        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Stopped accepting, draining connections"
        );
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        if !self.tracker.wait_for_drain(grace).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed with connections still open"
            );
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Bind the configured port and serve until shutdown.
    pub async fn start(
        config: GatewayConfig,
        engine: Arc<dyn RealtimeEngine>,
        shutdown: Shutdown,
    ) -> Result<(), GatewayError> {
        let listener = Listener::bind(&config.listener).await?;
        let gateway = Self::new(config, engine)?;
        gateway.run(listener, shutdown).await?;
        Ok(())
    }
}

/// Tracing, request IDs and the per-request timeout (408 on expiry).
#[allow(deprecated)]
fn with_common_layers(router: Router, timeouts: &TimeoutConfig) -> Router {
    router
        .layer(TimeoutLayer::new(Duration::from_secs(timeouts.request_secs)))
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
        .layer(TraceLayer::new_for_http())
}

/// Pause after a failed accept so a full descriptor table (EMFILE) does not
/// spin the loop. Returns `true` when shutdown fired during the pause.
async fn accept_backoff(stop: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => false,
        _ = stop.recv() => true,
    }
}

/// Route a request into the persistent or request/response pipeline.
///
/// A connection is classified by its first request and never reclassified:
/// an upgrade attempt on a connection that already served plain HTTP fails
/// the handshake.
async fn classify_connection(
    State(state): State<GatewayState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if is_upgrade_request(req.headers()) {
        tracing::debug!(request_id = %req.request_id(), path = %req.uri().path(), "Upgrade requested");
        return websocket::upgrade(Arc::clone(&state.engine), req).await;
    }

    if let Some(handle) = req.extensions().get::<ConnectionHandle>() {
        if let Err(e) = handle.mark_request() {
            tracing::debug!(connection_id = %handle.id(), error = %e, "Unexpected connection state");
        }
    }

    next.run(req).await
}

/// Request/response handler for every path.
async fn dispatch(State(state): State<GatewayState>, method: Method, uri: Uri) -> Response {
    let start = Instant::now();
    let path = uri.path();

    if method != Method::GET && method != Method::HEAD {
        metrics::record_request(method.as_str(), 405, "none", start);
        return response::method_not_allowed();
    }

    let route = state.routes.dispatch(path);
    let route_name = route.map_or("fallthrough", |r| r.name.as_str());
    tracing::info!(method = %method, path = %path, route = %route_name, "Requesting route");

    let response = match route {
        Some(Route {
            action: RouteAction::Redirect { to },
            ..
        }) => response::redirect(to),
        _ => match resolve(&state, route, path).await {
            Ok(resolution) => serve(&resolution, method == Method::HEAD).await,
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Static resolution failed");
                response::static_error(&e)
            }
        },
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), route_name, start);
    response
}

async fn resolve(
    state: &GatewayState,
    route: Option<&Route>,
    path: &str,
) -> Result<Resolution, StaticError> {
    let Some(route) = route else {
        return state.statics.resolve(path).await;
    };

    match &route.action {
        RouteAction::Index { root } => {
            let root = state.statics.root(root).ok_or(StaticError::NotFound)?;
            root.resolve_index().await
        }
        RouteAction::Static { root } => {
            let root = state.statics.root(root).ok_or(StaticError::NotFound)?;
            root.resolve(root.relative_path(path)).await
        }
        RouteAction::Redirect { .. } => Err(StaticError::NotFound),
    }
}

async fn serve(resolution: &Resolution, head_only: bool) -> Response {
    if let Resolution::Fallback(path) = resolution {
        tracing::trace!(index = %path.display(), "Serving index fallback");
    }
    match response::file(resolution.path(), head_only).await {
        Ok(response) => response,
        Err(e) => response::static_error(&StaticError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, StaticRootConfig};
    use crate::http::websocket::PeerInfo;
    use axum::extract::ws::WebSocket;
    use axum::http::{header, StatusCode};
    use futures_util::future::BoxFuture;
    use tower::ServiceExt;

    struct NullEngine;

    impl RealtimeEngine for NullEngine {
        fn attach(&self, _: WebSocket, _: PeerInfo) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    fn gateway(dir: &std::path::Path) -> ConnectionGateway {
        std::fs::create_dir_all(dir.join("app/static")).unwrap();
        std::fs::write(dir.join("app/index.html"), "app index").unwrap();
        std::fs::write(dir.join("app/static/site.css"), "body{}").unwrap();

        let config = GatewayConfig {
            static_roots: vec![
                StaticRootConfig::new("app", "/app", dir.join("app"), Some("index.html")),
                StaticRootConfig::new("app-assets", "/", dir.join("app"), None),
            ],
            routes: vec![
                RouteConfig {
                    name: "root".into(),
                    pattern: "/".into(),
                    action: RouteAction::Redirect { to: "/app".into() },
                },
                RouteConfig {
                    name: "app".into(),
                    pattern: "/app*".into(),
                    action: RouteAction::Static { root: "app".into() },
                },
            ],
            ..GatewayConfig::default()
        };
        ConnectionGateway::new(config, Arc::new(NullEngine)).unwrap()
    }

    async fn send(router: Router, method: Method, uri: &str) -> Response {
        router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn redirect_route() {
        let dir = tempfile::tempdir().unwrap();
        let res = send(gateway(dir.path()).router(), Method::GET, "/").await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "/app");
    }

    #[tokio::test]
    async fn spa_fallback_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        let res = send(gateway(dir.path()).router(), Method::GET, "/app/settings/profile").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "app index");
    }

    #[tokio::test]
    async fn unrouted_asset_falls_through_to_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let res = send(gateway(dir.path()).router(), Method::GET, "/static/site.css").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(body_text(res).await, "body{}");
    }

    #[tokio::test]
    async fn unrouted_missing_asset_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let res = send(gateway(dir.path()).router(), Method::GET, "/missing.js").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let res = send(gateway(dir.path()).router(), Method::POST, "/app").await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[header::ALLOW], "GET, HEAD");
    }

    #[tokio::test]
    async fn head_has_headers_only() {
        let dir = tempfile::tempdir().unwrap();
        let res = send(gateway(dir.path()).router(), Method::HEAD, "/app").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "9");
        assert!(body_text(res).await.is_empty());
    }

    #[tokio::test]
    async fn traversal_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let res = send(gateway(dir.path()).router(), Method::GET, "/app/../../etc/passwd").await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn upgrade_on_request_connection_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let router = gateway(dir.path()).router();
        let tracker = ConnectionTracker::new();
        let conn = tracker.track();
        let handle = conn.handle();
        handle.mark_request().unwrap();

        let mut req = Request::builder()
            .uri("/socket")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(handle.clone());

        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[header::CONNECTION], "close");
    }

    #[tokio::test]
    async fn slow_requests_time_out() {
        let slow = Router::new().route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let timeouts = TimeoutConfig {
            request_secs: 1,
            ..TimeoutConfig::default()
        };

        let res = send(with_common_layers(slow, &timeouts), Method::GET, "/slow").await;
        assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(res.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn accept_backoff_waits_unless_shutting_down() {
        let shutdown = Shutdown::new();
        let mut stop = shutdown.subscribe();

        let waited =
            tokio::time::timeout(Duration::from_millis(200), accept_backoff(&mut stop)).await;
        assert!(waited.is_err(), "backoff returned before its pause");

        shutdown.trigger();
        let stopped = tokio::time::timeout(Duration::from_millis(200), accept_backoff(&mut stop))
            .await
            .unwrap();
        assert!(stopped);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = GatewayConfig {
            routes: vec![RouteConfig {
                name: "broken".into(),
                pattern: "/a*b".into(),
                action: RouteAction::Redirect { to: "/".into() },
            }],
            ..GatewayConfig::default()
        };
        let err = ConnectionGateway::new(config, Arc::new(NullEngine))
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Config(ConfigError::Validation(_))));
    }
}

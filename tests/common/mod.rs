//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use evsr_gateway::net::Listener;
use evsr_gateway::{ConnectionGateway, GatewayConfig, PeerInfo, RealtimeEngine, Shutdown};
use futures_util::future::BoxFuture;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const APP_INDEX: &str = "<html><body>app</body></html>";
pub const PRESENTATION_INDEX: &str = "<html><body>presentation</body></html>";
pub const MAIN_JS: &str = "console.log('app');";
pub const SLIDES_CSS: &str = ".slide { margin: 0; }";

/// Lay out both bundles the way a production build would.
pub fn bundles() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("client/build");
    let presentation = dir.path().join("presentation");

    std::fs::create_dir_all(app.join("build")).unwrap();
    std::fs::create_dir_all(presentation.join("css")).unwrap();

    std::fs::write(app.join("index.html"), APP_INDEX).unwrap();
    std::fs::write(app.join("build/main.js"), MAIN_JS).unwrap();
    std::fs::write(presentation.join("index.html"), PRESENTATION_INDEX).unwrap();
    std::fs::write(presentation.join("css/slides.css"), SLIDES_CSS).unwrap();
    dir
}

/// Default configuration rooted at `base`, bound to an ephemeral local port.
pub fn config(base: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    for root in &mut config.static_roots {
        root.directory = base.join(&root.directory);
    }
    config
}

/// A gateway serving on a real socket.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<io::Result<()>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

pub async fn start(config: GatewayConfig, engine: Arc<dyn RealtimeEngine>) -> TestGateway {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = ConnectionGateway::new(config, engine).unwrap();

    let shutdown = Shutdown::new();
    let task = tokio::spawn(gateway.run(listener, shutdown.clone()));

    TestGateway {
        addr,
        shutdown,
        task,
    }
}

/// HTTP client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Engine that counts attachments and echoes data frames back.
#[derive(Debug, Default, Clone)]
pub struct EchoEngine {
    attached: Arc<AtomicUsize>,
}

impl EchoEngine {
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }
}

impl RealtimeEngine for EchoEngine {
    fn attach(&self, mut socket: WebSocket, _peer: PeerInfo) -> BoxFuture<'static, ()> {
        self.attached.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            while let Some(Ok(msg)) = socket.recv().await {
                match msg {
                    Message::Text(_) | Message::Binary(_) => {
                        if socket.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        })
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Write `request` verbatim and read until the server closes the socket.
pub async fn raw_exchange(addr: SocketAddr, request: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server kept the connection open")
        .unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

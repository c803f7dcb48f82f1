//! Test server lifecycle management.
//!
//! Spawns an isolated server per test with in-memory backends; dropping
//! the handle shuts the server down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use encore_server::cache::MemoryCache;
use encore_server::config::AppConfig;
use encore_server::push::PushEngine;
use encore_server::recs::RecommendationPipeline;
use encore_server::server::websocket::SessionRegistry;
use encore_server::server::{make_app, ServerState};
use encore_server::store::MemoryStore;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub struct TestServer {
    /// Base URL for requests, e.g. `http://127.0.0.1:49152`.
    pub base_url: String,
    pub port: u16,

    /// Direct handles for seeding and inspection.
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,

    _shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawn a server on a random port and wait until it answers.
    pub async fn spawn() -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let config = AppConfig::default();

        let pipeline = Arc::new(RecommendationPipeline::new(
            store.clone(),
            cache.clone(),
            config.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new());
        let push = Arc::new(PushEngine::new(
            registry.clone(),
            pipeline.clone(),
            config.clone(),
        ));

        let state = ServerState {
            config,
            start_time: Instant::now(),
            store: store.clone(),
            pipeline,
            push,
            registry,
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{port}");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = make_app(state);
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Test server crashed");
        });

        let server = Self {
            base_url,
            port,
            store,
            cache,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_until_ready().await;
        server
    }

    async fn wait_until_ready(&self) {
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", self.base_url);
        for _ in 0..50 {
            if let Ok(response) = client.get(&health_url).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Test server did not become ready");
    }
}

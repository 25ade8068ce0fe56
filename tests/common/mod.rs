// This module is included in multiple integration test crates, so some
// helpers may be unused in some of them.
#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tokio::task::JoinHandle;

use course_aggregator::app::App;
use course_aggregator::config::Config;
use course_aggregator::server;
use course_aggregator::shutdown::Shutdown;

/// Defaults with every side channel (durable caches, webhook, scrapers)
/// disabled; tests opt back in per case.
pub fn test_config() -> Config {
    let mut config: Config = toml::from_str("").expect("default config must parse");
    config.cache = false;
    config.verbose = false;
    config
}

pub struct TestApp {
    pub app: Arc<App>,
    pub url: String,
    pub shutdown: Shutdown,
    pub server_handle: JoinHandle<anyhow::Result<()>>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path_and_query}", self.url))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn get_json(&self, path_and_query: &str) -> Value {
        self.get(path_and_query)
            .await
            .json()
            .await
            .expect("response was not JSON")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.url))
            .json(body)
            .send()
            .await
            .expect("request failed")
    }
}

/// Bind the real server on an ephemeral loopback port.
pub async fn spawn_app(config: Config) -> TestApp {
    let app = App::new(config).expect("failed to construct app");
    let shutdown = Shutdown::new();
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .expect("failed to bind test listener");
    let addr = listener.local_addr().unwrap();

    let server_handle = tokio::spawn(server::bind_from_listener(
        app.clone(),
        listener,
        shutdown.clone(),
    ));

    TestApp {
        app,
        url: format!("http://{addr}"),
        shutdown,
        server_handle,
        client: reqwest::Client::new(),
    }
}

pub struct CountingWebhook {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl CountingWebhook {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Stub webhook endpoint that counts the GETs it receives.
pub async fn spawn_counting_webhook() -> CountingWebhook {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new().route(
        "/",
        get({
            let hits = hits.clone();
            move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "ok"
                }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    CountingWebhook {
        url: format!("http://{addr}/"),
        hits,
    }
}

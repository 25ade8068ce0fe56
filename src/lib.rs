#![doc = include_str!("../Readme.md")]

pub mod app;
pub mod cache;
pub mod config;
pub mod database;
pub mod diff;
pub mod notify;
pub mod scraper;
pub mod server;
pub mod shutdown;
pub mod task_monitor;
pub mod utils;

use std::sync::Arc;

use crate::app::App;
use crate::config::Config;
use crate::shutdown::Shutdown;
use crate::task_monitor::TaskMonitor;

/// Construct the application, seed it from the durable caches, start the
/// background refresh tasks and serve the API until shutdown.
pub async fn run(config: Config, shutdown: Shutdown) -> anyhow::Result<()> {
    let app: Arc<App> = App::new(config)?;

    app.seed_from_cache().await;

    TaskMonitor::init(app.clone(), shutdown.clone()).await;

    server::run(app, shutdown).await
}

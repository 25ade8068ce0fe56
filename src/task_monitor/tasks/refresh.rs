use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::app::App;
use crate::config::ScraperSource;
use crate::scraper::{self, ScrapeError};

/// Periodically run one scraper source and feed the result into the
/// database. A failed cycle is logged and retried at the next interval; the
/// previous snapshot stays valid throughout.
pub async fn refresh(app: Arc<App>, source: ScraperSource) -> anyhow::Result<()> {
    info!(scraper = %source.id, "starting refresh worker");

    loop {
        match run_cycle(&app, &source).await {
            Ok(age) => info!(scraper = %source.id, age, "scrape succeeded"),
            Err(error) => warn!(scraper = %source.id, "scrape cycle failed: {error}"),
        }

        tokio::time::sleep(app.config.scrape_interval).await;
    }
}

async fn run_cycle(app: &App, source: &ScraperSource) -> Result<i64, ScrapeError> {
    let previous = app
        .database
        .get_snapshot(&source.id, &source.term.term_code)
        .map(|(_, tree)| tree);
    let timeout = Duration::from_secs(app.config.scraper_timeout);

    let tree = scraper::run_scraper(&source.command, previous.as_deref(), timeout).await?;

    let age = app
        .database
        .ingest(&source.id, source.term.clone(), tree.clone());

    if let Some(cache) = app.local_cache(&source.id) {
        if let Err(error) = cache.write(&tree).await {
            warn!(scraper = %source.id, "failed to write cache file: {error:#}");
        }
    }
    if app.config.s3_write {
        if let Some(remote) = &app.remote_cache {
            if let Err(error) = remote.write(&source.id, &tree).await {
                warn!(scraper = %source.id, "failed to write remote cache: {error:#}");
            }
        }
    }
    app.report_success().await;

    Ok(age)
}

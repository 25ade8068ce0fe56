use std::sync::Arc;

use anyhow::Context;
use tracing::{info, instrument};

use crate::cache::{LocalCache, RemoteCache};
use crate::config::Config;
use crate::database::Database;
use crate::notify::Webhook;

/// Process-wide application state: the in-memory database plus the advisory
/// side channels (webhook, durable caches), owned rather than global so that
/// tests can spin up as many instances as they like.
pub struct App {
    pub database: Database,
    pub webhook: Option<Webhook>,
    pub remote_cache: Option<RemoteCache>,
    pub config: Config,
}

impl App {
    #[instrument(name = "App::new", level = "debug", skip_all)]
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let webhook = if config.snitch {
            let url = config
                .webhook_url
                .clone()
                .context("snitch is enabled but webhook_url is not set")?;
            Some(Webhook::new(url, config.webhook_interval)?)
        } else {
            None
        };

        let remote_cache = if config.s3_read || config.s3_write {
            let url = config
                .remote_cache_url
                .clone()
                .context("s3_read/s3_write is enabled but remote_cache_url is not set")?;
            Some(RemoteCache::new(
                url,
                config.remote_cache_token.clone(),
                config.remote_cache_write_interval,
            )?)
        } else {
            None
        };

        Ok(Arc::new(Self {
            database: Database::new(),
            webhook,
            remote_cache,
            config,
        }))
    }

    /// The local cache adapter for one scraper source, when enabled.
    #[must_use]
    pub fn local_cache(&self, scraper_id: &str) -> Option<LocalCache> {
        self.config
            .cache
            .then(|| LocalCache::new(self.config.cache_dir.join(format!("{scraper_id}.json"))))
    }

    /// Seed the database from the durable caches so that readers get data
    /// before the first scrape completes. Local cache first, remote second.
    pub async fn seed_from_cache(&self) {
        for source in &self.config.scrapers {
            let mut seed = match self.local_cache(&source.id) {
                Some(cache) => cache.read().await,
                None => None,
            };
            if seed.is_none() && self.config.s3_read {
                if let Some(remote) = &self.remote_cache {
                    seed = remote.read(&source.id).await;
                }
            }
            if let Some(tree) = seed {
                let age = self.database.ingest(&source.id, source.term.clone(), tree);
                info!(scraper = %source.id, age, "seeded course data from durable cache");
            }
        }
    }

    /// Report success to the webhook, if one is configured.
    pub async fn report_success(&self) {
        if let Some(webhook) = &self.webhook {
            webhook.ping().await;
        }
    }
}

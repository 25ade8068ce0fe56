use std::time::Duration;

use anyhow::Context;
use reqwest::Url;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::diff::Tree;

const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote snapshot store speaking plain HTTP: GET/PUT of
/// `<base>/<scraper>.json`, optionally with a bearer token. Writes are
/// rate-limited independently of the webhook limiter.
#[derive(Debug)]
pub struct RemoteCache {
    base_url: Url,
    token: Option<String>,
    client: reqwest::Client,
    min_write_interval: Duration,
    last_write: Mutex<Option<Instant>>,
}

impl RemoteCache {
    pub fn new(
        base_url: Url,
        token: Option<String>,
        min_write_interval: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(REMOTE_TIMEOUT).build()?;
        Ok(Self {
            base_url,
            token,
            client,
            min_write_interval,
            last_write: Mutex::new(None),
        })
    }

    fn object_url(&self, scraper_id: &str) -> String {
        format!(
            "{}/{scraper_id}.json",
            self.base_url.as_str().trim_end_matches('/')
        )
    }

    /// Fetch the stored tree, or `None` on any failure (logged).
    pub async fn read(&self, scraper_id: &str) -> Option<Tree> {
        let mut request = self.client.get(self.object_url(scraper_id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let result = async {
            request
                .send()
                .await?
                .error_for_status()?
                .json::<Tree>()
                .await
        }
        .await;
        match result {
            Ok(tree) => Some(tree),
            Err(err) => {
                warn!(scraper = %scraper_id, "failed to read remote cache: {err}");
                None
            }
        }
    }

    /// Store `tree`, at most once per `min_write_interval`; calls within the
    /// interval are silently skipped.
    pub async fn write(&self, scraper_id: &str, tree: &Tree) -> anyhow::Result<()> {
        {
            let mut last_write = self.last_write.lock().await;
            if let Some(at) = *last_write {
                if at.elapsed() < self.min_write_interval {
                    debug!(scraper = %scraper_id, "remote cache write rate-limited");
                    return Ok(());
                }
            }
            *last_write = Some(Instant::now());
        }

        let mut request = self.client.put(self.object_url(scraper_id)).json(tree);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .context("sending remote cache write")?
            .error_for_status()
            .context("remote cache write rejected")?;
        Ok(())
    }
}

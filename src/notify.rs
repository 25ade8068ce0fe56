//! Success webhook with rate limiting, used to tell a dead-man's-snitch
//! style monitor that scraping is still alive.

use std::time::Duration;

use reqwest::Url;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends a GET to one URL at most once every `min_interval`.
#[derive(Debug)]
pub struct Webhook {
    url: Url,
    min_interval: Duration,
    client: reqwest::Client,
    last_sent: Mutex<Option<Instant>>,
}

impl Webhook {
    pub fn new(url: Url, min_interval: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            url,
            min_interval,
            client,
            last_sent: Mutex::new(None),
        })
    }

    /// GET the webhook URL. Within `min_interval` of the last attempt this
    /// silently does nothing. Network errors are logged, never propagated.
    pub async fn ping(&self) {
        {
            let mut last_sent = self.last_sent.lock().await;
            if let Some(at) = *last_sent {
                if at.elapsed() < self.min_interval {
                    return;
                }
            }
            *last_sent = Some(Instant::now());
        }

        let result = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match result {
            Ok(_) => debug!(url = %self.url, "success webhook pinged"),
            Err(err) => warn!("failed to reach success webhook: {err}"),
        }
    }
}

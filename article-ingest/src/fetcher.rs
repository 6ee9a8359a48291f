use crate::config::FetchConfig;
use crate::traits::PageFetcher;
use crate::types::{IngestError, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// HTTP fetcher with retries, a body size cap and a per-host politeness delay.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn retry_backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let initial = Duration::from_millis(self.config.retry_delay_millis);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            randomization_factor: 0.5,
            multiplier: 2.0,
            max_interval: initial * 16,
            max_elapsed_time: Some(Duration::from_secs(self.config.timeout_seconds * 2)),
            ..Default::default()
        }
    }

    /// Fetch `url` as text, retrying transport errors and retryable statuses.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let start_time = Instant::now();
        let mut backoff = self.retry_backoff();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(url).await?;

            match self.fetch_once(url).await {
                Ok(body) => {
                    info!(
                        "Fetched {} ({} bytes in {}ms)",
                        url,
                        body.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(body);
                }
                Err(FetchAttemptError::Fatal(e)) => return Err(e),
                Err(FetchAttemptError::Retryable(e)) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        error!("Failed to fetch {} after {} attempts", url, self.config.max_retries + 1);
        Err(last_error.unwrap_or_else(|| IngestError::General(format!("Failed to fetch {url}"))))
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, FetchAttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchAttemptError::Retryable(IngestError::Http(e)))?;

        let status = response.status();
        if !status.is_success() {
            let err = IngestError::General(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ));
            return Err(if is_retryable_status(status) {
                FetchAttemptError::Retryable(err)
            } else {
                FetchAttemptError::Fatal(err)
            });
        }

        let limit_bytes = self.config.max_body_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit_bytes {
                return Err(FetchAttemptError::Fatal(IngestError::TooLarge {
                    size_mb: content_length as usize / (1024 * 1024),
                }));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchAttemptError::Retryable(IngestError::Http(e)))?;
        if bytes.len() > limit_bytes {
            return Err(FetchAttemptError::Fatal(IngestError::TooLarge {
                size_mb: bytes.len() / (1024 * 1024),
            }));
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.per_host_delay_millis);

        let wait_time = {
            let mut rate_limiter = self.rate_limiter.write().await;
            let now = Instant::now();
            let slot = match rate_limiter.get(&host) {
                Some(last_slot) => (*last_slot + min_interval).max(now),
                None => now,
            };
            rate_limiter.insert(host.clone(), slot);
            slot - now
        };

        if !wait_time.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        Ok(())
    }
}

enum FetchAttemptError {
    Retryable(IngestError),
    Fatal(IngestError),
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT || status.is_server_error()
}

#[async_trait]
impl PageFetcher for Fetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetch(url).await
    }
}

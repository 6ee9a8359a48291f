use crate::types::{ArticleStore, FetchHistoryEntry, FetchHistoryStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a URL is new for a user, against stored articles and the
/// user's fetch history. History outlives article deletion.
pub struct Deduplicator {
    articles: Arc<dyn ArticleStore>,
    history: Arc<dyn FetchHistoryStore>,
}

impl Deduplicator {
    pub fn new(articles: Arc<dyn ArticleStore>, history: Arc<dyn FetchHistoryStore>) -> Self {
        Self { articles, history }
    }

    /// Lookup failures count as "not a duplicate"; the store's unique
    /// constraint on the URL still guards the insert.
    pub async fn is_duplicate(&self, url: &str, user_id: &str, force: bool) -> bool {
        if force {
            return false;
        }

        match self.articles.exists_by_url(url).await {
            Ok(true) => {
                debug!("{} already stored", url);
                return true;
            }
            Ok(false) => {}
            Err(e) => warn!("Article lookup failed for {}: {}", url, e),
        }

        match self.history.has_fetched(user_id, url).await {
            Ok(seen) => {
                if seen {
                    debug!("{} already fetched by {}", url, user_id);
                }
                seen
            }
            Err(e) => {
                warn!("Fetch history lookup failed for {}: {}", url, e);
                false
            }
        }
    }

    /// Best-effort append to the fetch history.
    pub async fn record(&self, url: &str, user_id: &str) {
        if let Err(e) = self.history.record(&FetchHistoryEntry::now(user_id, url)).await {
            warn!("Failed to record fetch history for {}: {}", url, e);
        }
    }
}

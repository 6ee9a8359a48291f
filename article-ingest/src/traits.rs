use crate::types::{RawArticle, Result, Source};
use async_trait::async_trait;

/// Retrieves the body behind a URL as text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Turns a configured source into raw article candidates.
#[async_trait]
pub trait SourceStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Candidates in source order. Duplicates are not filtered here.
    async fn fetch(&self, source: &Source, pages: &dyn PageFetcher) -> Result<Vec<RawArticle>>;
}

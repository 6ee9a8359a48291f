pub mod api;
pub mod feed;
pub mod html;

pub use api::ApiStrategy;
pub use feed::FeedStrategy;
pub use html::HtmlStrategy;

use crate::extractor::ContentExtractor;
use crate::traits::{PageFetcher, SourceStrategy};
use crate::types::{RawArticle, Result, Source, SourceKind};
use std::sync::Arc;
use tracing::info;

/// Strategy matching a source kind.
pub fn strategy_for(kind: SourceKind, extractor: &ContentExtractor, allow_listing_fallback: bool) -> Box<dyn SourceStrategy> {
    match kind {
        SourceKind::Feed => Box::new(FeedStrategy::new(extractor.clone(), allow_listing_fallback)),
        SourceKind::Api => Box::new(ApiStrategy::new(extractor.clone())),
        SourceKind::Html => Box::new(HtmlStrategy::new(extractor.clone())),
    }
}

/// Resolves a configured source into raw article candidates.
pub struct SourceFetcher {
    pages: Arc<dyn PageFetcher>,
    extractor: ContentExtractor,
    allow_listing_fallback: bool,
}

impl SourceFetcher {
    pub fn new(pages: Arc<dyn PageFetcher>, extractor: ContentExtractor, allow_listing_fallback: bool) -> Self {
        Self {
            pages,
            extractor,
            allow_listing_fallback,
        }
    }

    pub async fn fetch(&self, source: &Source) -> Result<Vec<RawArticle>> {
        let strategy = strategy_for(source.kind, &self.extractor, self.allow_listing_fallback);
        info!("Fetching {} via {} strategy ({})", source.name, strategy.name(), source.base_url);

        let articles = strategy.fetch(source, self.pages.as_ref()).await?;
        info!("Source {} yielded {} raw articles", source.name, articles.len());
        Ok(articles)
    }
}

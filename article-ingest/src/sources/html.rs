use crate::extractor::ContentExtractor;
use crate::traits::{PageFetcher, SourceStrategy};
use crate::types::{RawArticle, Result, Source};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

/// Plain web pages: a listing of articles, or a single article.
pub struct HtmlStrategy {
    extractor: ContentExtractor,
}

impl HtmlStrategy {
    pub fn new(extractor: ContentExtractor) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl SourceStrategy for HtmlStrategy {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn fetch(&self, source: &Source, pages: &dyn PageFetcher) -> Result<Vec<RawArticle>> {
        let hint = source.language_hint.as_deref();
        let html = pages.fetch_text(&source.base_url).await?;

        let articles = self
            .extractor
            .discover_articles(&html, &source.base_url, pages, hint)
            .await;
        if !articles.is_empty() {
            info!("Extracted {} articles from listing {}", articles.len(), source.base_url);
            return Ok(articles);
        }

        debug!("No article links on {}, extracting the page itself", source.base_url);
        Ok(self
            .extractor
            .extract(&html)
            .map(|page| RawArticle {
                title: page.title,
                body: page.body,
                source_url: source.base_url.clone(),
                published_at: page.published_at.unwrap_or_else(Utc::now),
                language_hint: hint.map(str::to_string),
            })
            .into_iter()
            .collect())
    }
}

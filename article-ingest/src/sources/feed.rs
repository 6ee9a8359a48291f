use crate::discovery::{find_feed_link, find_iframe_src, looks_like_html};
use crate::extractor::ContentExtractor;
use crate::parser::FeedParser;
use crate::traits::{PageFetcher, SourceStrategy};
use crate::types::{IngestError, ParsedEntry, RawArticle, Result, Source};
use crate::utils::url;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Syndication feeds, with discovery when the configured URL serves a web page.
pub struct FeedStrategy {
    extractor: ContentExtractor,
    allow_listing_fallback: bool,
}

impl FeedStrategy {
    pub fn new(extractor: ContentExtractor, allow_listing_fallback: bool) -> Self {
        Self {
            extractor,
            allow_listing_fallback,
        }
    }

    async fn entry_to_article(
        &self,
        entry: ParsedEntry,
        feed_url: &str,
        pages: &dyn PageFetcher,
        hint: Option<&str>,
    ) -> Option<RawArticle> {
        let link = url::resolve(feed_url, &entry.url).unwrap_or(entry.url);
        let embedded = entry.content.or(entry.summary).filter(|body| !body.trim().is_empty());

        match embedded {
            Some(body) => Some(RawArticle {
                title: entry.title,
                body,
                source_url: link,
                published_at: entry.published_at.unwrap_or_else(Utc::now),
                language_hint: hint.map(str::to_string),
            }),
            None => {
                debug!("Feed entry {} has no body, fetching the page", link);
                let page = self.extractor.extract_url(&link, pages, hint).await?;
                Some(RawArticle {
                    title: if entry.title == "Untitled" { page.title } else { entry.title },
                    published_at: entry.published_at.unwrap_or(page.published_at),
                    ..page
                })
            }
        }
    }

    /// Listing mode over the HTML bodies seen during discovery, latest first.
    async fn listing_fallback(
        &self,
        source: &Source,
        html_pages: &[(String, String)],
        pages: &dyn PageFetcher,
    ) -> Result<Vec<RawArticle>> {
        if !self.allow_listing_fallback {
            return Err(IngestError::Parse(format!(
                "{} serves HTML without a feed link",
                source.base_url
            )));
        }

        warn!("No feed found at {}, treating the page as an article listing", source.base_url);
        let hint = source.language_hint.as_deref();
        for (page_url, html) in html_pages.iter().rev() {
            let articles = self.extractor.discover_articles(html, page_url, pages, hint).await;
            if !articles.is_empty() {
                return Ok(articles);
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl SourceStrategy for FeedStrategy {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn fetch(&self, source: &Source, pages: &dyn PageFetcher) -> Result<Vec<RawArticle>> {
        let hint = source.language_hint.as_deref();
        let mut current_url = source.base_url.clone();
        let mut body = pages.fetch_text(&current_url).await?;
        let mut html_pages = Vec::new();

        if looks_like_html(&body) {
            html_pages.push((current_url.clone(), body.clone()));

            if let Some(feed_url) = find_feed_link(&body, &current_url).filter(|u| *u != current_url) {
                info!("Found feed link {} on {}", feed_url, current_url);
                body = pages.fetch_text(&feed_url).await?;
                current_url = feed_url;
            } else if let Some(frame_url) = find_iframe_src(&body, &current_url).filter(|u| *u != current_url) {
                debug!("No feed link on {}, trying iframe {}", current_url, frame_url);
                match pages.fetch_text(&frame_url).await {
                    Ok(frame_body) => {
                        body = frame_body;
                        current_url = frame_url;
                    }
                    Err(e) => warn!("Failed to fetch iframe {}: {}", frame_url, e),
                }
            }

            if looks_like_html(&body) {
                if current_url != source.base_url {
                    html_pages.push((current_url.clone(), body.clone()));
                }
                return self.listing_fallback(source, &html_pages, pages).await;
            }
        }

        let feed = FeedParser::parse_feed(&body)?;
        info!(
            "Feed {} lists {} entries",
            feed.title.as_deref().unwrap_or(current_url.as_str()),
            feed.entries.len()
        );

        let mut articles = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            if let Some(article) = self.entry_to_article(entry, &current_url, pages, hint).await {
                articles.push(article);
            }
        }
        Ok(articles)
    }
}

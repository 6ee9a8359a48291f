#![allow(dead_code)]

use article_ingest::{
    CrawlOrchestrator, IngestError, MockLlmAdapter, PageFetcher, PipelineConfig, PipelineStores, Result,
};
use async_trait::async_trait;
use interfaces::memory::InMemoryStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SITE: &str = "https://news.example.com/";
pub const FEED_URL: &str = "https://news.example.com/feed.xml";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// Serves canned bodies by URL and counts requests.
#[derive(Default)]
pub struct StaticPages {
    pages: HashMap<String, String>,
    hits: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StaticPages {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| IngestError::General(format!("HTTP 404 for {}", url)))
    }
}

pub struct FeedItem {
    pub url: String,
    pub title: String,
    pub description: String,
}

impl FeedItem {
    pub fn new(url: &str, title: &str, description: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            description: description.to_string(),
        }
    }
}

pub fn rss(items: &[FeedItem]) -> String {
    let entries: String = items
        .iter()
        .map(|item| {
            format!(
                "<item><title>{}</title><link>{}</link><description>{}</description>\
                 <pubDate>Tue, 10 Jun 2025 04:00:00 GMT</pubDate></item>",
                item.title, item.url, item.description
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <rss version=\"2.0\"><channel><title>Example News</title><link>{}</link>\
         <description>Test feed</description>{}</channel></rss>",
        SITE, entries
    )
}

/// Home page advertising the feed through a relative alternate link.
pub fn home_page_with_feed_link() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
  <title>Example News</title>
  <link rel="alternate" type="application/rss+xml" title="RSS" href="/feed.xml">
</head>
<body><h1>Example News</h1><p>Welcome.</p></body>
</html>"#
        .to_string()
}

pub fn english_items() -> Vec<FeedItem> {
    vec![
        FeedItem::new(
            "https://news.example.com/2025/06/council-budget",
            "Council approves budget",
            "The city council approved next year's budget on Monday after a long debate. \
             Transit and housing received the largest increases.",
        ),
        FeedItem::new(
            "https://news.example.com/2025/06/river-cleanup",
            "Volunteers clean the river",
            "Hundreds of volunteers spent Saturday removing rubbish from the riverbanks. \
             Organisers said the turnout was the best in a decade.",
        ),
        FeedItem::new(
            "https://news.example.com/2025/06/library-hours",
            "Library extends opening hours",
            "The central library will stay open until ten in the evening from July. \
             The change follows a survey of more than two thousand residents.",
        ),
    ]
}

pub fn chinese_item() -> FeedItem {
    FeedItem::new(
        "https://news.example.com/2025/06/gdp-data",
        "上半年经济数据发布",
        &"国家统计局今天发布数据显示，上半年国内生产总值同比增长百分之五，经济运行总体平稳。\
          消费和投资保持增长，就业形势基本稳定。"
            .repeat(4),
    )
}

pub fn site_with_feed(items: &[FeedItem]) -> StaticPages {
    StaticPages::new()
        .with_page(SITE, home_page_with_feed_link())
        .with_page(FEED_URL, rss(items))
}

pub fn pipeline(pages: Arc<StaticPages>, ai: &MockLlmAdapter) -> (CrawlOrchestrator, Arc<InMemoryStore>) {
    pipeline_with_config(pages, ai, &PipelineConfig::default())
}

pub fn pipeline_with_config(
    pages: Arc<StaticPages>,
    ai: &MockLlmAdapter,
    config: &PipelineConfig,
) -> (CrawlOrchestrator, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = CrawlOrchestrator::new(
        pages,
        Arc::new(ai.clone()),
        PipelineStores::shared(store.clone()),
        config,
    );
    (orchestrator, store)
}

/// Minimal single-article page.
pub fn story_page(title: &str, text: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head><body>\
         <article><h1>{title}</h1><p>{text}</p><p>{text}</p></article></body></html>"
    )
}

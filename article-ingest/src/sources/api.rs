use crate::extractor::{html_to_text, ContentExtractor};
use crate::traits::{PageFetcher, SourceStrategy};
use crate::types::{RawArticle, Result, Source};
use crate::utils::{time, url};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

const ARRAY_KEYS: [&str; 6] = ["articles", "items", "data", "results", "entries", "posts"];
const TITLE_KEYS: [&str; 3] = ["title", "headline", "name"];
const BODY_KEYS: [&str; 5] = ["content", "body", "text", "description", "summary"];
const URL_KEYS: [&str; 3] = ["url", "link", "href"];
const DATE_KEYS: [&str; 6] = ["published_at", "publishedAt", "pubDate", "date", "published", "created_at"];

/// JSON endpoints returning a list of articles.
pub struct ApiStrategy {
    extractor: ContentExtractor,
}

impl ApiStrategy {
    pub fn new(extractor: ContentExtractor) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl SourceStrategy for ApiStrategy {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn fetch(&self, source: &Source, pages: &dyn PageFetcher) -> Result<Vec<RawArticle>> {
        let hint = source.language_hint.as_deref();
        let body = pages.fetch_text(&source.base_url).await?;
        let payload: Value = serde_json::from_str(&body)?;

        let items = article_items(&payload);
        info!("API {} returned {} items", source.base_url, items.len());

        let mut articles = Vec::with_capacity(items.len());
        for item in items.iter().filter_map(Value::as_object) {
            let fields = ApiItem::from_json(item, &source.base_url);

            match (fields.body, fields.url) {
                (Some(body), Some(link)) => articles.push(RawArticle {
                    title: fields.title.unwrap_or_else(|| "Untitled".to_string()),
                    body,
                    source_url: link,
                    published_at: fields.published_at.unwrap_or_else(Utc::now),
                    language_hint: hint.map(str::to_string),
                }),
                (None, Some(link)) => {
                    if let Some(page) = self.extractor.extract_url(&link, pages, hint).await {
                        articles.push(RawArticle {
                            title: fields.title.unwrap_or(page.title),
                            published_at: fields.published_at.unwrap_or(page.published_at),
                            ..page
                        });
                    }
                }
                (_, None) => debug!("Dropping API item without a URL"),
            }
        }

        Ok(articles)
    }
}

struct ApiItem {
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

impl ApiItem {
    fn from_json(item: &Map<String, Value>, base_url: &str) -> Self {
        Self {
            title: first_string(item, &TITLE_KEYS).map(|t| html_to_text(&t)),
            body: first_string(item, &BODY_KEYS)
                .map(|b| html_to_text(&b))
                .filter(|b| !b.trim().is_empty()),
            url: first_string(item, &URL_KEYS).and_then(|href| url::resolve(base_url, &href)),
            published_at: DATE_KEYS.iter().find_map(|key| item.get(*key).and_then(parse_date)),
        }
    }
}

/// The root array, or the first known key holding an array.
fn article_items(payload: &Value) -> &[Value] {
    match payload {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => ARRAY_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

fn first_string(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => time::parse_loose(raw),
        Value::Number(n) => {
            let secs = n.as_i64()?;
            // Millisecond timestamps are common in JS backends.
            let secs = if secs > 100_000_000_000 { secs / 1000 } else { secs };
            DateTime::from_timestamp(secs, 0)
        }
        _ => None,
    }
}

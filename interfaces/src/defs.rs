use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Auto-fetch intervals below this are rejected on write.
pub const MIN_AUTO_FETCH_INTERVAL_SECS: u64 = 10;

/// Sleep used by the scheduler while no user has auto-fetch enabled.
pub const DEFAULT_AUTO_FETCH_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Api,
    Html,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Api => "api",
            SourceKind::Html => "html",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" | "rss" | "atom" => Ok(SourceKind::Feed),
            "api" | "json" => Ok(SourceKind::Api),
            "html" | "web" | "page" => Ok(SourceKind::Html),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub kind: SourceKind,
    pub language_hint: Option<String>,
    pub crawl_frequency_minutes: Option<u32>,
    pub is_active: bool,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub settings: Option<CrawlSettings>,
}

impl Source {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            base_url: base_url.into(),
            kind,
            language_hint: None,
            crawl_frequency_minutes: None,
            is_active: true,
            last_crawled_at: None,
            settings: None,
        }
    }

    pub fn with_language_hint(mut self, hint: impl Into<String>) -> Self {
        self.language_hint = Some(hint.into());
        self
    }

    pub fn with_settings(mut self, settings: CrawlSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_crawl_frequency(mut self, minutes: u32) -> Self {
        self.crawl_frequency_minutes = Some(minutes);
        self
    }

    /// A source without a crawl frequency is always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match (self.crawl_frequency_minutes, self.last_crawled_at) {
            (Some(minutes), Some(last)) => now - last >= Duration::minutes(i64::from(minutes)),
            _ => true,
        }
    }
}

/// Ephemeral fetch result, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    pub body: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
    pub language_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: Uuid,
    pub source_id: Option<Uuid>,
    pub title_en: String,
    pub title_zh: Option<String>,
    pub full_content_en: String,
    pub full_content_zh: Option<String>,
    pub origin_language: String,
    pub summary_en: Option<String>,
    pub summary_zh: Option<String>,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchHistoryEntry {
    pub user_id: String,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
}

impl FetchHistoryEntry {
    pub fn now(user_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            source_url: source_url.into(),
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PreferenceError {
    #[error("auto-fetch interval {requested}s is below the {minimum}s floor")]
    IntervalTooShort { requested: u64, minimum: u64 },

    #[error("no auto-fetch preference for user {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFetchPreference {
    pub user_id: String,
    pub enabled: bool,
    interval_seconds: u64,
    pub updated_at: DateTime<Utc>,
}

impl AutoFetchPreference {
    pub fn new(user_id: impl Into<String>, enabled: bool, interval_seconds: u64) -> Result<Self, PreferenceError> {
        check_interval(interval_seconds)?;
        Ok(Self {
            user_id: user_id.into(),
            enabled,
            interval_seconds,
            updated_at: Utc::now(),
        })
    }

    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    /// Leaves the stored interval untouched when the new value is below the floor.
    pub fn set_interval(&mut self, interval_seconds: u64) -> Result<(), PreferenceError> {
        check_interval(interval_seconds)?;
        self.interval_seconds = interval_seconds;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn check_interval(interval_seconds: u64) -> Result<(), PreferenceError> {
    if interval_seconds < MIN_AUTO_FETCH_INTERVAL_SECS {
        return Err(PreferenceError::IntervalTooShort {
            requested: interval_seconds,
            minimum: MIN_AUTO_FETCH_INTERVAL_SECS,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryTone {
    #[default]
    Neutral,
    Formal,
    Casual,
    Analytical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    #[default]
    Paragraph,
    Bullets,
    Headline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub translate_on_fetch: bool,
    pub summary_tone: SummaryTone,
    pub summary_format: SummaryFormat,
    pub summary_word_count: u32,
    pub summary_focus: Option<String>,
    pub custom_key_points: Vec<String>,
    pub summarize_en: bool,
    pub summarize_zh: bool,
    pub max_articles_per_fetch: Option<usize>,
    pub min_article_length: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            translate_on_fetch: true,
            summary_tone: SummaryTone::Neutral,
            summary_format: SummaryFormat::Paragraph,
            summary_word_count: 150,
            summary_focus: None,
            custom_key_points: Vec::new(),
            summarize_en: true,
            summarize_zh: true,
            max_articles_per_fetch: None,
            min_article_length: 0,
        }
    }
}

/// Parameters handed to the summarization capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub target_language: String,
    pub tone: SummaryTone,
    pub format: SummaryFormat,
    pub word_count: u32,
    pub focus: Option<String>,
    pub key_points: Vec<String>,
}

impl SummaryRequest {
    pub fn from_settings(settings: &CrawlSettings, target_language: &str) -> Self {
        Self {
            target_language: target_language.to_string(),
            tone: settings.summary_tone,
            format: settings.summary_format,
            word_count: settings.summary_word_count,
            focus: settings.summary_focus.clone(),
            key_points: settings.custom_key_points.clone(),
        }
    }

    pub fn with_word_count(mut self, word_count: u32) -> Self {
        self.word_count = word_count;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateOptions {
    pub preserve_list_structure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMetric {
    pub source_id: Uuid,
    pub success: bool,
    pub duration_ms: u64,
    pub item_count: usize,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateUrl,
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI capability rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("AI capability unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("AI capability returned an empty response")]
    EmptyResponse,

    #[error("AI call timed out after {0}s")]
    Timeout(u64),

    #[error("AI transport error: {0}")]
    Transport(String),
}

impl AiError {
    /// Fatal errors are not worth a reduced-scope retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AiError::Unauthorized(_))
    }

    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Unavailable { status, .. } => *status == 429 || *status >= 500,
            AiError::Timeout(_) | AiError::Transport(_) => true,
            _ => false,
        }
    }
}

// The collaborator traits below are the only way the pipeline reaches the
// outside world. Stores return anyhow errors: their failure modes belong to
// whoever implements them.

#[async_trait]
pub trait AiCapability: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(&self, text: &str, target_language: &str, options: &TranslateOptions) -> Result<String, AiError>;

    /// Returns a 2-letter language code.
    async fn detect_language(&self, text: &str) -> Result<String, AiError>;

    async fn summarize(&self, text: &str, request: &SummaryRequest) -> Result<String, AiError>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn exists_by_url(&self, url: &str) -> anyhow::Result<bool>;

    /// Must report `DuplicateUrl` instead of failing when the URL is taken.
    async fn insert(&self, record: &ArticleRecord) -> anyhow::Result<InsertOutcome>;

    async fn delete_by_url(&self, url: &str) -> anyhow::Result<bool>;

    async fn list_recent(&self, limit: usize) -> anyhow::Result<Vec<ArticleRecord>>;
}

#[async_trait]
pub trait FetchHistoryStore: Send + Sync {
    async fn has_fetched(&self, user_id: &str, url: &str) -> anyhow::Result<bool>;

    /// Append-only; recording an existing (user, url) pair is a no-op.
    async fn record(&self, entry: &FetchHistoryEntry) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn list_active(&self) -> anyhow::Result<Vec<Source>>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Source>>;

    async fn mark_crawled(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn list_enabled(&self) -> anyhow::Result<Vec<AutoFetchPreference>>;

    async fn get(&self, user_id: &str) -> anyhow::Result<Option<AutoFetchPreference>>;

    async fn upsert(&self, preference: &AutoFetchPreference) -> anyhow::Result<()>;

    /// Rejects intervals below the floor with `PreferenceError::IntervalTooShort`
    /// and keeps the stored value.
    async fn set_interval(&self, user_id: &str, interval_seconds: u64) -> anyhow::Result<AutoFetchPreference>;
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_fetch_metric(&self, metric: &FetchMetric) -> anyhow::Result<()>;
}

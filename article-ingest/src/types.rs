use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use interfaces::defs::{
    AiCapability, AiError, ArticleRecord, ArticleStore, AutoFetchPreference, CrawlSettings, FetchHistoryEntry,
    FetchHistoryStore, FetchMetric, InsertOutcome, MetricsSink, PreferenceError, PreferenceStore, RawArticle, Source, SourceKind,
    SourceStore, SummaryFormat, SummaryRequest, SummaryTone, TranslateOptions, DEFAULT_AUTO_FETCH_INTERVAL_SECS,
    MIN_AUTO_FETCH_INTERVAL_SECS,
};

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug)]
pub struct ParsedEntry {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Result of one orchestrator run over a single source.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    pub processed: Vec<ArticleRecord>,
    pub raw_count: usize,
    pub duplicate_skipped: usize,
    pub too_short_skipped: usize,
    pub failed: usize,
    /// Set when the source itself could not be fetched; the run is then empty.
    pub fetch_error: Option<String>,
}

impl CrawlOutcome {
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }
}

/// Counters after the accepted records of one source were written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistReport {
    pub inserted: usize,
    pub duplicate_skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRunReport {
    pub source_id: Uuid,
    pub source_name: String,
    pub success: bool,
    pub raw_count: usize,
    pub processed_count: usize,
    pub duplicate_skipped: usize,
    pub too_short_skipped: usize,
    pub failed: usize,
    pub inserted: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl SourceRunReport {
    pub fn to_metric(&self) -> FetchMetric {
        FetchMetric {
            source_id: self.source_id,
            success: self.success,
            duration_ms: self.duration_ms,
            item_count: self.processed_count,
            error: self.error.clone(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub sources: Vec<SourceRunReport>,
}

impl CycleReport {
    pub fn total_inserted(&self) -> usize {
        self.sources.iter().map(|s| s.inserted).sum()
    }

    pub fn total_duplicates(&self) -> usize {
        self.sources.iter().map(|s| s.duplicate_skipped).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| !s.success).count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error("Source not found: {id}")]
    SourceNotFound { id: Uuid },

    #[error("Response size exceeds limit: {size_mb}MB")]
    TooLarge { size_mb: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;

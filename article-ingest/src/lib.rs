pub mod config;
pub mod crawler;
pub mod dedup;
pub mod discovery;
pub mod extractor;
pub mod fetcher;
pub mod language;
pub mod llm_adapter;
pub mod parser;
pub mod processing;
pub mod scheduler;
pub mod sources;
pub mod storage;
pub mod summary;
pub mod traits;
pub mod translation;
pub mod types;
pub mod utils;

pub use config::PipelineConfig;
pub use crawler::{effective_settings, CrawlOrchestrator, PipelineStores};
pub use dedup::Deduplicator;
pub use extractor::ContentExtractor;
pub use fetcher::Fetcher;
pub use language::LanguageClassifier;
pub use llm_adapter::{ChatAdapter, MockLlmAdapter, MockSummaryMode};
pub use parser::FeedParser;
pub use processing::ArticleProcessor;
pub use scheduler::{AutoFetchScheduler, SchedulerState};
pub use sources::SourceFetcher;
pub use storage::PgStore;
pub use summary::SummaryOrchestrator;
pub use traits::{PageFetcher, SourceStrategy};
pub use translation::{TextKind, TranslationOrchestrator};
pub use types::*;

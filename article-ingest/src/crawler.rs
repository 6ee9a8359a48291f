use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::extractor::ContentExtractor;
use crate::processing::ArticleProcessor;
use crate::sources::SourceFetcher;
use crate::traits::PageFetcher;
use crate::types::{
    AiCapability, ArticleStore, CrawlOutcome, CrawlSettings, CycleReport, FetchHistoryStore, IngestError,
    InsertOutcome, MetricsSink, PersistReport, PreferenceStore, Result, Source, SourceRunReport, SourceStore,
};
use crate::utils::text;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The persistence collaborators the pipeline talks to.
#[derive(Clone)]
pub struct PipelineStores {
    pub articles: Arc<dyn ArticleStore>,
    pub history: Arc<dyn FetchHistoryStore>,
    pub sources: Arc<dyn SourceStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl PipelineStores {
    /// Every role served by one backend.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ArticleStore + FetchHistoryStore + SourceStore + PreferenceStore + MetricsSink + 'static,
    {
        Self {
            articles: store.clone(),
            history: store.clone(),
            sources: store.clone(),
            preferences: store.clone(),
            metrics: store,
        }
    }
}

/// Settings of a source, with an optional per-call cap override.
pub fn effective_settings(source: &Source, max_articles: Option<usize>) -> CrawlSettings {
    let mut settings = source.settings.clone().unwrap_or_default();
    if max_articles.is_some() {
        settings.max_articles_per_fetch = max_articles;
    }
    settings
}

/// Fetch, deduplicate, process and persist articles for sources.
pub struct CrawlOrchestrator {
    fetcher: SourceFetcher,
    dedup: Deduplicator,
    processor: ArticleProcessor,
    stores: PipelineStores,
}

impl CrawlOrchestrator {
    pub fn new(
        pages: Arc<dyn PageFetcher>,
        ai: Arc<dyn AiCapability>,
        stores: PipelineStores,
        config: &PipelineConfig,
    ) -> Self {
        let extractor = ContentExtractor::new(config.extraction.clone());
        Self {
            fetcher: SourceFetcher::new(pages, extractor, config.fetch.allow_listing_fallback),
            dedup: Deduplicator::new(stores.articles.clone(), stores.history.clone()),
            processor: ArticleProcessor::new(ai, config),
            stores,
        }
    }

    pub fn stores(&self) -> &PipelineStores {
        &self.stores
    }

    /// One source, no writes. Accepts candidates in fetch order until the cap
    /// is reached; a failed fetch yields an empty outcome with `fetch_error` set.
    pub async fn run(&self, source: &Source, settings: &CrawlSettings, force: bool, user_id: &str) -> CrawlOutcome {
        let candidates = match self.fetcher.fetch(source).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Failed to fetch source {} ({}): {}", source.name, source.base_url, e);
                return CrawlOutcome {
                    fetch_error: Some(e.to_string()),
                    ..CrawlOutcome::default()
                };
            }
        };

        let cap = settings.max_articles_per_fetch;
        let mut outcome = CrawlOutcome {
            raw_count: candidates.len(),
            ..CrawlOutcome::default()
        };
        let mut seen_in_run = HashSet::new();

        for candidate in candidates {
            if cap.is_some_and(|cap| outcome.processed.len() >= cap) {
                debug!("Acceptance cap reached for {}", source.name);
                break;
            }

            let url = candidate.source_url.as_str();
            if !seen_in_run.insert(url.to_string()) || self.dedup.is_duplicate(url, user_id, force).await {
                outcome.duplicate_skipped += 1;
                continue;
            }

            if text::is_blank(&candidate.body) || text::char_len(&candidate.body) < settings.min_article_length {
                outcome.too_short_skipped += 1;
                continue;
            }

            match self.processor.process(&candidate, Some(source.id), settings).await {
                Ok(Some(record)) => outcome.processed.push(record),
                Ok(None) => outcome.too_short_skipped += 1,
                Err(e) => {
                    warn!("Failed to process {}: {}", url, e);
                    outcome.failed += 1;
                }
            }
        }

        info!(
            source = %source.name,
            raw = outcome.raw_count,
            processed = outcome.processed_count(),
            duplicates = outcome.duplicate_skipped,
            too_short = outcome.too_short_skipped,
            failed = outcome.failed,
            "Crawl run finished"
        );
        outcome
    }

    /// Sequential inserts. A URL conflict counts as a duplicate; history is
    /// recorded only after a successful insert.
    pub async fn persist(&self, outcome: &CrawlOutcome, user_id: &str) -> PersistReport {
        let mut report = PersistReport::default();

        for record in &outcome.processed {
            match self.stores.articles.insert(record).await {
                Ok(InsertOutcome::Inserted) => {
                    report.inserted += 1;
                    self.dedup.record(&record.source_url, user_id).await;
                }
                Ok(InsertOutcome::DuplicateUrl) => {
                    debug!("{} was inserted concurrently", record.source_url);
                    report.duplicate_skipped += 1;
                }
                Err(e) => {
                    warn!("Failed to store {}: {}", record.source_url, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Writes for one finished run: articles, last-crawled time and a metric.
    async fn finish(&self, source: &Source, outcome: CrawlOutcome, user_id: &str, started: Instant) -> SourceRunReport {
        let persisted = self.persist(&outcome, user_id).await;

        if outcome.fetch_error.is_none() {
            if let Err(e) = self.stores.sources.mark_crawled(source.id, Utc::now()).await {
                warn!("Failed to update last crawl time for {}: {}", source.name, e);
            }
        }

        let report = SourceRunReport {
            source_id: source.id,
            source_name: source.name.clone(),
            success: outcome.fetch_error.is_none(),
            raw_count: outcome.raw_count,
            processed_count: outcome.processed_count(),
            duplicate_skipped: outcome.duplicate_skipped + persisted.duplicate_skipped,
            too_short_skipped: outcome.too_short_skipped,
            failed: outcome.failed + persisted.failed,
            inserted: persisted.inserted,
            duration_ms: started.elapsed().as_millis() as u64,
            error: outcome.fetch_error,
        };

        if let Err(e) = self.stores.metrics.record_fetch_metric(&report.to_metric()).await {
            warn!("Failed to record fetch metric for {}: {}", source.name, e);
        }
        report
    }

    /// Run and persist one source.
    pub async fn crawl_source(&self, source: &Source, settings: &CrawlSettings, force: bool, user_id: &str) -> SourceRunReport {
        let started = Instant::now();
        let outcome = self.run(source, settings, force, user_id).await;
        self.finish(source, outcome, user_id, started).await
    }

    /// Manual fetch: sources are crawled concurrently, then written one by one.
    pub async fn fetch_now(
        &self,
        sources: &[Source],
        max_articles: Option<usize>,
        force: bool,
        user_id: &str,
    ) -> CycleReport {
        info!("Manual fetch of {} sources for {}", sources.len(), user_id);

        let runs = join_all(sources.iter().map(|source| async move {
            let started = Instant::now();
            let settings = effective_settings(source, max_articles);
            let outcome = self.run(source, &settings, force, user_id).await;
            (source, outcome, started)
        }))
        .await;

        let mut report = CycleReport::default();
        for (source, outcome, started) in runs {
            report.sources.push(self.finish(source, outcome, user_id, started).await);
        }

        info!(
            "Manual fetch stored {} articles, skipped {} duplicates, {} sources failed",
            report.total_inserted(),
            report.total_duplicates(),
            report.failed_sources()
        );
        report
    }

    /// One source by id, or every active source.
    pub async fn load_sources(&self, source_id: Option<Uuid>) -> Result<Vec<Source>> {
        match source_id {
            Some(id) => {
                let source = self
                    .stores
                    .sources
                    .get(id)
                    .await?
                    .ok_or(IngestError::SourceNotFound { id })?;
                Ok(vec![source])
            }
            None => Ok(self.stores.sources.list_active().await?),
        }
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::defs::{
    ArticleRecord, ArticleStore, AutoFetchPreference, FetchHistoryEntry, FetchHistoryStore, FetchMetric,
    InsertOutcome, MetricsSink, PreferenceError, PreferenceStore, Source, SourceStore,
};

#[derive(Default)]
struct MemoryState {
    articles: Vec<ArticleRecord>,
    history: HashSet<(String, String)>,
    sources: HashMap<Uuid, Source>,
    preferences: HashMap<String, AutoFetchPreference>,
    metrics: Vec<FetchMetric>,
}

/// Process-local implementation of every store trait. Cloning shares state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_source(&self, source: Source) {
        self.state.write().await.sources.insert(source.id, source);
    }

    pub async fn source(&self, id: Uuid) -> Option<Source> {
        self.state.read().await.sources.get(&id).cloned()
    }

    pub async fn article_count(&self) -> usize {
        self.state.read().await.articles.len()
    }

    pub async fn article_by_url(&self, url: &str) -> Option<ArticleRecord> {
        let state = self.state.read().await;
        state.articles.iter().find(|a| a.source_url == url).cloned()
    }

    pub async fn history_len(&self) -> usize {
        self.state.read().await.history.len()
    }

    pub async fn metrics(&self) -> Vec<FetchMetric> {
        self.state.read().await.metrics.clone()
    }
}

#[async_trait]
impl ArticleStore for InMemoryStore {
    async fn exists_by_url(&self, url: &str) -> anyhow::Result<bool> {
        Ok(self.state.read().await.articles.iter().any(|a| a.source_url == url))
    }

    async fn insert(&self, record: &ArticleRecord) -> anyhow::Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if state.articles.iter().any(|a| a.source_url == record.source_url) {
            return Ok(InsertOutcome::DuplicateUrl);
        }
        state.articles.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn delete_by_url(&self, url: &str) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let before = state.articles.len();
        state.articles.retain(|a| a.source_url != url);
        Ok(state.articles.len() != before)
    }

    async fn list_recent(&self, limit: usize) -> anyhow::Result<Vec<ArticleRecord>> {
        let mut articles = self.state.read().await.articles.clone();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        articles.truncate(limit);
        Ok(articles)
    }
}

#[async_trait]
impl FetchHistoryStore for InMemoryStore {
    async fn has_fetched(&self, user_id: &str, url: &str) -> anyhow::Result<bool> {
        let state = self.state.read().await;
        Ok(state.history.contains(&(user_id.to_string(), url.to_string())))
    }

    async fn record(&self, entry: &FetchHistoryEntry) -> anyhow::Result<()> {
        self.state
            .write()
            .await
            .history
            .insert((entry.user_id.clone(), entry.source_url.clone()));
        Ok(())
    }
}

#[async_trait]
impl SourceStore for InMemoryStore {
    async fn list_active(&self) -> anyhow::Result<Vec<Source>> {
        let state = self.state.read().await;
        let mut sources: Vec<Source> = state.sources.values().filter(|s| s.is_active).cloned().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Source>> {
        Ok(self.source(id).await)
    }

    async fn mark_crawled(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        match state.sources.get_mut(&id) {
            Some(source) => {
                source.last_crawled_at = Some(at);
                Ok(())
            }
            None => anyhow::bail!("unknown source {id}"),
        }
    }
}

#[async_trait]
impl PreferenceStore for InMemoryStore {
    async fn list_enabled(&self) -> anyhow::Result<Vec<AutoFetchPreference>> {
        let state = self.state.read().await;
        Ok(state.preferences.values().filter(|p| p.enabled).cloned().collect())
    }

    async fn get(&self, user_id: &str) -> anyhow::Result<Option<AutoFetchPreference>> {
        Ok(self.state.read().await.preferences.get(user_id).cloned())
    }

    async fn upsert(&self, preference: &AutoFetchPreference) -> anyhow::Result<()> {
        self.state
            .write()
            .await
            .preferences
            .insert(preference.user_id.clone(), preference.clone());
        Ok(())
    }

    async fn set_interval(&self, user_id: &str, interval_seconds: u64) -> anyhow::Result<AutoFetchPreference> {
        let mut state = self.state.write().await;
        let preference = state
            .preferences
            .get_mut(user_id)
            .ok_or_else(|| PreferenceError::NotFound(user_id.to_string()))?;
        preference.set_interval(interval_seconds)?;
        Ok(preference.clone())
    }
}

#[async_trait]
impl MetricsSink for InMemoryStore {
    async fn record_fetch_metric(&self, metric: &FetchMetric) -> anyhow::Result<()> {
        self.state.write().await.metrics.push(metric.clone());
        Ok(())
    }
}

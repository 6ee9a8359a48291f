use crate::types::{
    ArticleRecord, ArticleStore, AutoFetchPreference, CrawlSettings, FetchHistoryEntry, FetchHistoryStore,
    FetchMetric, InsertOutcome, MetricsSink, PreferenceError, PreferenceStore, Result, Source, SourceKind, SourceStore,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        base_url TEXT NOT NULL,
        kind TEXT NOT NULL,
        language_hint TEXT,
        crawl_frequency_minutes INTEGER,
        is_active BOOLEAN NOT NULL DEFAULT true,
        last_crawled_at TIMESTAMPTZ,
        settings TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id UUID PRIMARY KEY,
        source_id UUID REFERENCES sources(id) ON DELETE SET NULL,
        title_en TEXT NOT NULL,
        title_zh TEXT,
        full_content_en TEXT NOT NULL,
        full_content_zh TEXT,
        origin_language TEXT NOT NULL,
        summary_en TEXT,
        summary_zh TEXT,
        source_url TEXT NOT NULL UNIQUE,
        published_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fetch_history (
        user_id TEXT NOT NULL,
        source_url TEXT NOT NULL,
        fetched_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (user_id, source_url)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auto_fetch_preferences (
        user_id TEXT PRIMARY KEY,
        enabled BOOLEAN NOT NULL DEFAULT false,
        interval_seconds BIGINT NOT NULL CHECK (interval_seconds >= 10),
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fetch_metrics (
        id BIGSERIAL PRIMARY KEY,
        source_id UUID NOT NULL,
        success BOOLEAN NOT NULL,
        duration_ms BIGINT NOT NULL,
        item_count INTEGER NOT NULL,
        error TEXT,
        recorded_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles (created_at DESC)",
];

/// Postgres-backed store for every persistence role of the pipeline.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }

    /// Creates the tables and unique constraints if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.db).await?;
        }
        info!("Database schema ready");
        Ok(())
    }

    fn source_from_row(row: &PgRow) -> anyhow::Result<Source> {
        let kind: String = row.try_get("kind")?;
        let settings = row
            .try_get::<Option<String>, _>("settings")?
            .map(|raw| serde_json::from_str::<CrawlSettings>(&raw))
            .transpose()
            .context("invalid source settings")?;

        Ok(Source {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            base_url: row.try_get("base_url")?,
            kind: kind.parse::<SourceKind>().map_err(anyhow::Error::msg)?,
            language_hint: row.try_get("language_hint")?,
            crawl_frequency_minutes: row
                .try_get::<Option<i32>, _>("crawl_frequency_minutes")?
                .map(|m| m.max(0) as u32),
            is_active: row.try_get("is_active")?,
            last_crawled_at: row.try_get("last_crawled_at")?,
            settings,
        })
    }

    fn article_from_row(row: &PgRow) -> anyhow::Result<ArticleRecord> {
        Ok(ArticleRecord {
            id: row.try_get("id")?,
            source_id: row.try_get("source_id")?,
            title_en: row.try_get("title_en")?,
            title_zh: row.try_get("title_zh")?,
            full_content_en: row.try_get("full_content_en")?,
            full_content_zh: row.try_get("full_content_zh")?,
            origin_language: row.try_get("origin_language")?,
            summary_en: row.try_get("summary_en")?,
            summary_zh: row.try_get("summary_zh")?,
            source_url: row.try_get("source_url")?,
            published_at: row.try_get("published_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn preference_from_row(row: &PgRow) -> anyhow::Result<AutoFetchPreference> {
        let interval: i64 = row.try_get("interval_seconds")?;
        let mut preference = AutoFetchPreference::new(
            row.try_get::<String, _>("user_id")?,
            row.try_get("enabled")?,
            interval.max(0) as u64,
        )?;
        preference.updated_at = row.try_get("updated_at")?;
        Ok(preference)
    }

    /// Adds or replaces a source definition.
    pub async fn upsert_source(&self, source: &Source) -> Result<()> {
        let settings = source.settings.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO sources (id, name, base_url, kind, language_hint, crawl_frequency_minutes, is_active, last_crawled_at, settings)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                base_url = EXCLUDED.base_url,
                kind = EXCLUDED.kind,
                language_hint = EXCLUDED.language_hint,
                crawl_frequency_minutes = EXCLUDED.crawl_frequency_minutes,
                is_active = EXCLUDED.is_active,
                settings = EXCLUDED.settings
            "#,
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(&source.base_url)
        .bind(source.kind.as_str())
        .bind(&source.language_hint)
        .bind(source.crawl_frequency_minutes.map(|m| m as i32))
        .bind(source.is_active)
        .bind(source.last_crawled_at)
        .bind(settings)
        .execute(&self.db)
        .await?;

        info!("Saved source {} ({})", source.name, source.id);
        Ok(())
    }
}

#[async_trait]
impl ArticleStore for PgStore {
    async fn exists_by_url(&self, url: &str) -> anyhow::Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM articles WHERE source_url = $1) AS found")
            .bind(url)
            .fetch_one(&self.db)
            .await?;
        Ok(row.try_get("found")?)
    }

    async fn insert(&self, record: &ArticleRecord) -> anyhow::Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (id, source_id, title_en, title_zh, full_content_en, full_content_zh,
                                  origin_language, summary_en, summary_zh, source_url, published_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (source_url) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.source_id)
        .bind(&record.title_en)
        .bind(&record.title_zh)
        .bind(&record.full_content_en)
        .bind(&record.full_content_zh)
        .bind(&record.origin_language)
        .bind(&record.summary_en)
        .bind(&record.summary_zh)
        .bind(&record.source_url)
        .bind(record.published_at)
        .bind(record.created_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            debug!("Article {} already stored", record.source_url);
            return Ok(InsertOutcome::DuplicateUrl);
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn delete_by_url(&self, url: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM articles WHERE source_url = $1")
            .bind(url)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_recent(&self, limit: usize) -> anyhow::Result<Vec<ArticleRecord>> {
        let rows = sqlx::query("SELECT * FROM articles ORDER BY created_at DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(Self::article_from_row).collect()
    }
}

#[async_trait]
impl FetchHistoryStore for PgStore {
    async fn has_fetched(&self, user_id: &str, url: &str) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM fetch_history WHERE user_id = $1 AND source_url = $2) AS found",
        )
        .bind(user_id)
        .bind(url)
        .fetch_one(&self.db)
        .await?;
        Ok(row.try_get("found")?)
    }

    async fn record(&self, entry: &FetchHistoryEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fetch_history (user_id, source_url, fetched_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, source_url) DO NOTHING
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.source_url)
        .bind(entry.fetched_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SourceStore for PgStore {
    async fn list_active(&self) -> anyhow::Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources WHERE is_active = true ORDER BY name")
            .fetch_all(&self.db)
            .await?;

        let mut sources = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::source_from_row(row) {
                Ok(source) => sources.push(source),
                Err(e) => warn!("Skipping unreadable source row: {:#}", e),
            }
        }
        Ok(sources)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(Self::source_from_row).transpose()
    }

    async fn mark_crawled(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE sources SET last_crawled_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("unknown source {id}");
        }
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn list_enabled(&self) -> anyhow::Result<Vec<AutoFetchPreference>> {
        let rows = sqlx::query("SELECT * FROM auto_fetch_preferences WHERE enabled = true")
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(Self::preference_from_row).collect()
    }

    async fn get(&self, user_id: &str) -> anyhow::Result<Option<AutoFetchPreference>> {
        let row = sqlx::query("SELECT * FROM auto_fetch_preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(Self::preference_from_row).transpose()
    }

    async fn upsert(&self, preference: &AutoFetchPreference) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auto_fetch_preferences (user_id, enabled, interval_seconds, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                interval_seconds = EXCLUDED.interval_seconds,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&preference.user_id)
        .bind(preference.enabled)
        .bind(preference.interval_seconds() as i64)
        .bind(preference.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_interval(&self, user_id: &str, interval_seconds: u64) -> anyhow::Result<AutoFetchPreference> {
        let mut preference = PreferenceStore::get(self, user_id)
            .await?
            .ok_or_else(|| PreferenceError::NotFound(user_id.to_string()))?;
        preference.set_interval(interval_seconds)?;
        self.upsert(&preference).await?;
        Ok(preference)
    }
}

#[async_trait]
impl MetricsSink for PgStore {
    async fn record_fetch_metric(&self, metric: &FetchMetric) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fetch_metrics (source_id, success, duration_ms, item_count, error, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(metric.source_id)
        .bind(metric.success)
        .bind(metric.duration_ms as i64)
        .bind(metric.item_count as i32)
        .bind(&metric.error)
        .bind(metric.recorded_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

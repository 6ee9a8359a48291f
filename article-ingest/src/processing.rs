use crate::config::PipelineConfig;
use crate::language::LanguageClassifier;
use crate::summary::SummaryOrchestrator;
use crate::translation::{TextKind, TranslationOrchestrator};
use crate::types::{AiCapability, ArticleRecord, CrawlSettings, RawArticle, Result};
use crate::utils::text;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Turns a raw candidate into a bilingual, summarized record.
pub struct ArticleProcessor {
    classifier: LanguageClassifier,
    translator: TranslationOrchestrator,
    summarizer: SummaryOrchestrator,
}

impl ArticleProcessor {
    pub fn new(ai: Arc<dyn AiCapability>, config: &PipelineConfig) -> Self {
        Self {
            classifier: LanguageClassifier::new(ai.clone(), config.language.clone()),
            translator: TranslationOrchestrator::new(ai.clone(), config.translation.clone()),
            summarizer: SummaryOrchestrator::new(ai, config.summary.clone()),
        }
    }

    /// Language of the title, judged by its own script.
    fn title_language<'a>(&self, title: &str, body_origin: &'a str) -> &'a str {
        if self.classifier.is_chinese_title(title) {
            "zh"
        } else if body_origin == "zh" {
            "en"
        } else {
            body_origin
        }
    }

    /// `Ok(None)` when the raw body is empty. Errors are fatal capability failures.
    pub async fn process(
        &self,
        raw: &RawArticle,
        source_id: Option<Uuid>,
        settings: &CrawlSettings,
    ) -> Result<Option<ArticleRecord>> {
        if text::is_blank(&raw.body) {
            debug!("Skipping {}: empty body", raw.source_url);
            return Ok(None);
        }

        let origin = self.classifier.classify(&raw.body, raw.language_hint.as_deref()).await;
        let translate = settings.translate_on_fetch;

        let body = self.translator.bilingual(&raw.body, &origin, translate, TextKind::Body).await?;
        let title_origin = self.title_language(&raw.title, &origin);
        let title = self
            .translator
            .bilingual(&raw.title, title_origin, translate, TextKind::Title)
            .await?;
        let summary = self.summarizer.summarize(&body.en, body.zh.as_deref(), settings).await?;

        info!(
            "Processed {} (origin {}, zh content: {}, zh summary: {})",
            raw.source_url,
            origin,
            body.zh.is_some(),
            summary.zh.is_some()
        );

        Ok(Some(ArticleRecord {
            id: Uuid::new_v4(),
            source_id,
            title_en: title.en,
            title_zh: title.zh,
            full_content_en: body.en,
            full_content_zh: body.zh,
            origin_language: origin,
            summary_en: summary.en,
            summary_zh: summary.zh,
            source_url: raw.source_url.clone(),
            published_at: raw.published_at,
            created_at: Utc::now(),
        }))
    }
}

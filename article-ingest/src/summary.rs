use crate::config::SummaryGuardConfig;
use crate::translation::TranslationOrchestrator;
use crate::types::{AiCapability, CrawlSettings, Result, SummaryRequest, TranslateOptions};
use crate::utils::text;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a candidate Chinese summary was not accepted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SummaryRejection {
    #[error("{chars} chars exceeds the {limit} char limit")]
    TooLong { chars: usize, limit: usize },

    #[error("repeats the opening of the full text")]
    BleedThrough,

    #[error("not shorter than the full text")]
    NotShorterThanSource,

    #[error("empty")]
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BilingualSummary {
    pub en: Option<String>,
    pub zh: Option<String>,
}

/// Summaries in both languages, guarding the Chinese one against copied body text.
pub struct SummaryOrchestrator {
    ai: Arc<dyn AiCapability>,
    config: SummaryGuardConfig,
}

impl SummaryOrchestrator {
    pub fn new(ai: Arc<dyn AiCapability>, config: SummaryGuardConfig) -> Self {
        Self { ai, config }
    }

    pub async fn summarize(
        &self,
        full_en: &str,
        full_zh: Option<&str>,
        settings: &CrawlSettings,
    ) -> Result<BilingualSummary> {
        if !settings.summarize_en && !settings.summarize_zh {
            return Ok(BilingualSummary::default());
        }

        // Needed by the Chinese chain even when only zh is emitted.
        let summary_en = self.summarize_en(full_en, settings).await?;

        let summary_zh = match full_zh {
            Some(full_zh) if settings.summarize_zh && !text::is_blank(full_zh) => {
                self.summarize_zh(summary_en.as_deref(), full_zh, settings).await?
            }
            _ => None,
        };

        Ok(BilingualSummary {
            en: summary_en.filter(|_| settings.summarize_en),
            zh: summary_zh,
        })
    }

    /// One reduced-scope retry on a prefix of the text.
    pub async fn summarize_en(&self, full_en: &str, settings: &CrawlSettings) -> Result<Option<String>> {
        if text::is_blank(full_en) {
            return Ok(None);
        }
        let request = SummaryRequest::from_settings(settings, "en");

        let summary = match self.ai.summarize(full_en, &request).await {
            Ok(summary) => Some(summary),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("English summary failed ({}), retrying on a prefix", e);
                let prefix = text::prefix(full_en, self.config.en_retry_prefix_chars);
                match self.ai.summarize(prefix, &request).await {
                    Ok(summary) => Some(summary),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!("English summary retry failed: {}", e);
                        None
                    }
                }
            }
        };

        Ok(summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|s| Self::shorter_than_source(s, full_en)))
    }

    fn shorter_than_source(summary: String, full: &str) -> String {
        let full_len = text::char_len(full);
        if text::char_len(&summary) < full_len {
            return summary;
        }
        text::truncate_at_sentence(&summary, (full_len / 2).max(1))
    }

    /// Checks a Chinese candidate against the full Chinese text.
    pub fn check_zh(&self, candidate: &str, full_zh: &str, word_count: u32) -> std::result::Result<(), SummaryRejection> {
        let chars = text::char_len(candidate.trim());
        if chars == 0 {
            return Err(SummaryRejection::Empty);
        }
        let limit = (self.config.length_multiple * f64::from(word_count)) as usize;
        if chars > limit {
            return Err(SummaryRejection::TooLong { chars, limit });
        }
        let opening = text::prefix(full_zh.trim(), self.config.bleed_prefix_chars);
        if !opening.is_empty() && candidate.contains(opening) {
            return Err(SummaryRejection::BleedThrough);
        }
        if chars >= text::char_len(full_zh.trim()) {
            return Err(SummaryRejection::NotShorterThanSource);
        }
        Ok(())
    }

    async fn translate_prefix(&self, summary_en: &str, max_chars: usize) -> Result<Option<String>> {
        let prefix = text::prefix(summary_en, max_chars);
        let options = TranslateOptions {
            preserve_list_structure: TranslationOrchestrator::has_list_markers(prefix),
        };
        match self.ai.translate(prefix, "zh", &options).await {
            Ok(out) => Ok(Some(out.trim().to_string())),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                debug!("Summary translation failed: {}", e);
                Ok(None)
            }
        }
    }

    async fn summarize_reduced(&self, full_zh: &str, settings: &CrawlSettings) -> Result<Option<String>> {
        let word_count = (settings.summary_word_count / 3).max(self.config.reduced_min_words);
        let request = SummaryRequest::from_settings(settings, "zh").with_word_count(word_count);
        match self.ai.summarize(full_zh, &request).await {
            Ok(out) => Ok(Some(out.trim().to_string())),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                debug!("Reduced Chinese summary failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Fallback chain; each step is taken only when the previous one was rejected.
    pub async fn summarize_zh(
        &self,
        summary_en: Option<&str>,
        full_zh: &str,
        settings: &CrawlSettings,
    ) -> Result<Option<String>> {
        let word_count = settings.summary_word_count;

        if let Some(summary_en) = summary_en {
            if let Some(candidate) = self
                .translate_prefix(summary_en, self.config.zh_translate_prefix_chars)
                .await?
            {
                match self.check_zh(&candidate, full_zh, word_count) {
                    Ok(()) => return Ok(Some(candidate)),
                    Err(reason) => debug!("Translated summary rejected: {}", reason),
                }
            }
        }

        if let Some(reduced) = self.summarize_reduced(full_zh, settings).await? {
            match self.check_zh(&reduced, full_zh, word_count) {
                Ok(()) => return Ok(Some(reduced)),
                Err(reason) => debug!("Reduced summary rejected: {}", reason),
            }

            let truncated = text::truncate_at_sentence(&reduced, self.config.zh_max_chars);
            match self.check_zh(&truncated, full_zh, word_count) {
                Ok(()) => return Ok(Some(truncated)),
                Err(reason) => debug!("Truncated summary rejected: {}", reason),
            }
        }

        if let Some(summary_en) = summary_en {
            if let Some(candidate) = self
                .translate_prefix(summary_en, self.config.last_resort_prefix_chars)
                .await?
            {
                let chars = text::char_len(&candidate);
                if chars > 0 && chars < self.config.zh_max_chars && chars < text::char_len(full_zh.trim()) {
                    return Ok(Some(candidate));
                }
            }
        }

        warn!("No acceptable Chinese summary");
        Ok(None)
    }
}

use crate::config::TranslationConfig;
use crate::types::{AiCapability, AiError, Result, TranslateOptions};
use crate::utils::text;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("blank line pattern compiles"));

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([-*•·]|\d{1,3}[.)、])\s+\S").expect("list marker pattern compiles"));

/// Why a single translation attempt produced nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum TranslationFailure {
    #[error("capability error: {0}")]
    Capability(#[from] AiError),

    #[error("result too short ({got} chars, wanted {wanted})")]
    TooShort { got: usize, wanted: usize },
}

/// What is being translated. Titles get a length floor scaled to their size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Title,
    Body,
}

/// Text in both languages. `zh` is absent when no usable Chinese exists.
#[derive(Debug, Clone, PartialEq)]
pub struct BilingualText {
    pub en: String,
    pub zh: Option<String>,
}

/// Chunked translation with a reduced-scope retry.
pub struct TranslationOrchestrator {
    ai: Arc<dyn AiCapability>,
    config: TranslationConfig,
}

impl TranslationOrchestrator {
    pub fn new(ai: Arc<dyn AiCapability>, config: TranslationConfig) -> Self {
        Self { ai, config }
    }

    /// Paragraphs split on blank lines; oversized ones cut at the last
    /// whitespace before the limit, or hard cut when there is none.
    pub fn split_chunks(&self, input: &str) -> Vec<String> {
        let limit = self.config.chunk_chars.max(1);
        let mut chunks = Vec::new();

        for paragraph in BLANK_LINES.split(input).map(str::trim).filter(|p| !p.is_empty()) {
            let mut rest = paragraph;
            while text::char_len(rest) > limit {
                let window = text::prefix(rest, limit);
                let cut = match window.rfind(char::is_whitespace) {
                    Some(idx) if idx > 0 => idx,
                    _ => window.len(),
                };
                chunks.push(rest[..cut].trim_end().to_string());
                rest = rest[cut..].trim_start();
            }
            if !rest.is_empty() {
                chunks.push(rest.to_string());
            }
        }
        chunks
    }

    pub fn has_list_markers(input: &str) -> bool {
        LIST_MARKER.is_match(input)
    }

    /// Translates every chunk independently and rejoins them with blank lines.
    pub async fn translate(&self, input: &str, target: &str) -> std::result::Result<String, AiError> {
        let options = TranslateOptions {
            preserve_list_structure: Self::has_list_markers(input),
        };
        let chunks = self.split_chunks(input);
        debug!("Translating {} chunks to {}", chunks.len(), target);

        let mut translated = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let out = self.ai.translate(chunk, target, &options).await?;
            translated.push(out.trim().to_string());
        }
        Ok(translated.join("\n\n"))
    }

    fn min_result_chars(&self, input: &str, kind: TextKind) -> usize {
        match kind {
            TextKind::Body => self.config.min_result_chars,
            TextKind::Title => self.config.min_result_chars.min((text::char_len(input) / 4).max(1)),
        }
    }

    async fn attempt(
        &self,
        input: &str,
        target: &str,
        kind: TextKind,
    ) -> std::result::Result<String, TranslationFailure> {
        let out = self.translate(input, target).await?;
        let wanted = self.min_result_chars(input, kind);
        let got = text::char_len(out.trim());
        if got < wanted {
            return Err(TranslationFailure::TooShort { got, wanted });
        }
        Ok(out)
    }

    /// Full attempt, then one retry on a prefix. `Ok(None)` when both fail;
    /// `Err` only for fatal capability errors.
    pub async fn translate_with_retries(&self, input: &str, target: &str, kind: TextKind) -> Result<Option<String>> {
        if text::is_blank(input) {
            return Ok(None);
        }

        match self.attempt(input, target, kind).await {
            Ok(out) => return Ok(Some(out)),
            Err(TranslationFailure::Capability(e)) if e.is_fatal() => return Err(e.into()),
            Err(reason) => warn!("Translation to {} failed ({}), retrying on a prefix", target, reason),
        }

        let prefix = text::prefix(input, self.config.retry_prefix_chars);
        let truncated = prefix.len() < input.len();
        match self.attempt(prefix, target, kind).await {
            Ok(mut out) => {
                if truncated {
                    out.push_str(&self.config.truncation_marker);
                }
                Ok(Some(out))
            }
            Err(TranslationFailure::Capability(e)) if e.is_fatal() => Err(e.into()),
            Err(reason) => {
                warn!("Translation retry to {} failed ({}), giving up", target, reason);
                Ok(None)
            }
        }
    }

    /// English and Chinese versions of `raw` given its origin language.
    pub async fn bilingual(&self, raw: &str, origin: &str, translate: bool, kind: TextKind) -> Result<BilingualText> {
        if !translate {
            return Ok(BilingualText {
                en: raw.to_string(),
                zh: (origin == "zh").then(|| raw.to_string()),
            });
        }

        match origin {
            "zh" => Ok(BilingualText {
                en: self
                    .translate_with_retries(raw, "en", kind)
                    .await?
                    .unwrap_or_else(|| raw.to_string()),
                zh: Some(raw.to_string()),
            }),
            "en" => Ok(BilingualText {
                en: raw.to_string(),
                zh: self.translate_with_retries(raw, "zh", kind).await?,
            }),
            _ => {
                let en = self
                    .translate_with_retries(raw, "en", kind)
                    .await?
                    .unwrap_or_else(|| raw.to_string());
                let zh = self.translate_with_retries(raw, "zh", kind).await?;
                Ok(BilingualText { en, zh })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::MockLlmAdapter;
    use crate::types::IngestError;

    fn orchestrator(mock: &MockLlmAdapter) -> TranslationOrchestrator {
        TranslationOrchestrator::new(Arc::new(mock.clone()), TranslationConfig::default())
    }

    #[tokio::test]
    async fn test_short_text_is_one_call() {
        let mock = MockLlmAdapter::new("t").with_delay(0);
        let out = orchestrator(&mock).translate("A single short paragraph.", "zh").await.unwrap();
        assert_eq!(mock.translate_calls(), 1);
        assert_eq!(out, "[zh] A single short paragraph.");
    }

    #[tokio::test]
    async fn test_paragraphs_are_translated_separately() {
        let mock = MockLlmAdapter::new("t").with_delay(0);
        let input = "First paragraph.\n\nSecond paragraph.\n  \nThird paragraph.";
        let out = orchestrator(&mock).translate(input, "zh").await.unwrap();
        assert_eq!(mock.translate_calls(), 3);
        assert_eq!(out.split("\n\n").count(), 3);
    }

    #[test]
    fn test_long_paragraph_split() {
        let mock = MockLlmAdapter::new("t");
        let word = "word ";
        let long = word.repeat(1000);
        let chunks = orchestrator(&mock).split_chunks(&long);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| text::char_len(c) <= 2000));
        assert!(chunks.iter().all(|c| !c.starts_with(' ') && !c.ends_with(' ')));

        let unbroken = "中".repeat(4500);
        let chunks = orchestrator(&mock).split_chunks(&unbroken);
        assert_eq!(chunks.iter().map(|c| text::char_len(c)).collect::<Vec<_>>(), vec![2000, 2000, 500]);
    }

    #[test]
    fn test_list_markers() {
        assert!(TranslationOrchestrator::has_list_markers("Intro\n- first\n- second"));
        assert!(TranslationOrchestrator::has_list_markers("1. one\n2. two"));
        assert!(!TranslationOrchestrator::has_list_markers("Plain prose - with a dash."));
    }

    #[tokio::test]
    async fn test_retry_on_prefix_appends_marker() {
        let mock = MockLlmAdapter::new("t").with_delay(0).failing_translations(1);
        let input = "word ".repeat(600);
        let out = orchestrator(&mock)
            .translate_with_retries(&input, "zh", TextKind::Body)
            .await
            .unwrap()
            .unwrap();
        assert!(out.ends_with("\n\n[…]"));
        // one failed chunk, then a single call for the 2000-char prefix
        assert_eq!(mock.translate_calls(), 2);
    }

    #[tokio::test]
    async fn test_second_failure_gives_none() {
        let mock = MockLlmAdapter::new("t").with_delay(0).failing_translations(10);
        let out = orchestrator(&mock).translate_with_retries("Hello there world", "zh", TextKind::Body).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mock = MockLlmAdapter::new("t").with_delay(0).unauthorized();
        let err = orchestrator(&mock)
            .translate_with_retries("Hello there world", "zh", TextKind::Body)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Ai(AiError::Unauthorized(_))));
        assert_eq!(mock.translate_calls(), 1);
    }

    #[test]
    fn test_short_result_floor() {
        let mock = MockLlmAdapter::new("t");
        let t = orchestrator(&mock);
        let short_body = "Rain expected later today.";
        assert_eq!(t.min_result_chars(short_body, TextKind::Body), 10);
        assert_eq!(t.min_result_chars(short_body, TextKind::Title), 6);
        assert_eq!(t.min_result_chars("Hi", TextKind::Title), 1);
        assert_eq!(t.min_result_chars(&"word ".repeat(100), TextKind::Title), 10);
    }

    #[tokio::test]
    async fn test_bilingual_policy() {
        let mock = MockLlmAdapter::new("t").with_delay(0);
        let t = orchestrator(&mock);

        let zh = t.bilingual("今天天气很好，我们去公园散步吧", "zh", true, TextKind::Body).await.unwrap();
        assert_eq!(zh.zh.as_deref(), Some("今天天气很好，我们去公园散步吧"));
        assert!(zh.en.starts_with("[en]"));

        let en = t.bilingual("The weather is nice today", "en", true, TextKind::Body).await.unwrap();
        assert_eq!(en.en, "The weather is nice today");
        assert!(en.zh.unwrap().starts_with("[zh]"));

        let calls = mock.translate_calls();
        let off = t.bilingual("Le temps est beau", "fr", false, TextKind::Body).await.unwrap();
        assert_eq!(off.en, "Le temps est beau");
        assert!(off.zh.is_none());
        assert_eq!(mock.translate_calls(), calls);
    }
}

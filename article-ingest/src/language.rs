use crate::config::LanguageConfig;
use crate::types::AiCapability;
use crate::utils::text;
use std::sync::Arc;
use tracing::{debug, warn};

/// CJK Unified Ideographs, Extension A and Compatibility Ideographs.
pub fn is_cjk_ideograph(c: char) -> bool {
    matches!(c, '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' | '\u{F900}'..='\u{FAFF}')
}

pub fn count_cjk(text: &str) -> usize {
    text.chars().filter(|c| is_cjk_ideograph(*c)).count()
}

/// Lowercase 2-letter code from values like `en-US` or `ZH_hans`.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .take(2)
        .collect::<String>()
        .to_ascii_lowercase();
    (code.len() == 2).then_some(code)
}

/// Origin language from script heuristics, a source hint and AI detection.
pub struct LanguageClassifier {
    ai: Arc<dyn AiCapability>,
    config: LanguageConfig,
}

impl LanguageClassifier {
    pub fn new(ai: Arc<dyn AiCapability>, config: LanguageConfig) -> Self {
        Self { ai, config }
    }

    /// Enough ideographs near the start of the text settle the question without AI.
    pub fn has_cjk_majority(&self, body: &str) -> bool {
        count_cjk(text::prefix(body, self.config.cjk_scan_chars)) > self.config.cjk_threshold
    }

    /// Titles are short, so the ratio of ideographs counts as well as their number.
    pub fn is_chinese_title(&self, title: &str) -> bool {
        let cjk = count_cjk(title);
        if cjk > self.config.cjk_threshold {
            return true;
        }
        let visible = title.chars().filter(|c| !c.is_whitespace()).count();
        visible > 0 && cjk as f64 / visible as f64 >= self.config.title_cjk_ratio
    }

    pub async fn classify(&self, body: &str, hint: Option<&str>) -> String {
        if self.has_cjk_majority(body) {
            return "zh".to_string();
        }

        let hint = hint.and_then(normalize_code);
        let detected = self.detect(body).await;

        match (hint, detected) {
            (Some(hint), Some(detected)) => {
                if hint != detected {
                    debug!("Language hint {} overridden by detection {}", hint, detected);
                }
                detected
            }
            (Some(code), None) | (None, Some(code)) => code,
            (None, None) => "en".to_string(),
        }
    }

    async fn detect(&self, body: &str) -> Option<String> {
        if text::is_blank(body) {
            return None;
        }
        match self
            .ai
            .detect_language(text::prefix(body, self.config.detect_prefix_chars))
            .await
        {
            Ok(code) => normalize_code(&code),
            Err(e) => {
                warn!("Language detection failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::MockLlmAdapter;

    fn classifier(mock: MockLlmAdapter) -> LanguageClassifier {
        LanguageClassifier::new(Arc::new(mock), LanguageConfig::default())
    }

    #[tokio::test]
    async fn test_cjk_precedence_over_hint() {
        let mock = MockLlmAdapter::new("lang").with_delay(0).with_detected_language("en");
        let lang = classifier(mock.clone())
            .classify("北京市政府今天宣布了新的城市交通发展规划方案", Some("en"))
            .await;
        assert_eq!(lang, "zh");
        assert_eq!(mock.detect_calls(), 0);
    }

    #[tokio::test]
    async fn test_detection_beats_disagreeing_hint() {
        let mock = MockLlmAdapter::new("lang").with_delay(0).with_detected_language("fr");
        assert_eq!(classifier(mock).classify("Bonjour tout le monde", Some("en-US")).await, "fr");
    }

    #[tokio::test]
    async fn test_failed_detection_falls_back_to_hint_then_en() {
        let mock = MockLlmAdapter::new("lang").with_delay(0).failing_detection();
        assert_eq!(classifier(mock.clone()).classify("Hallo Welt", Some("DE")).await, "de");
        assert_eq!(classifier(mock).classify("Hallo Welt", None).await, "en");
    }

    #[test]
    fn test_title_rules() {
        let c = classifier(MockLlmAdapter::new("lang"));
        assert!(c.is_chinese_title("新冠疫苗 update"));
        assert!(!c.is_chinese_title("Weekly market update for 中国"));
        assert!(c.is_chinese_title("中华人民共和国国务院新闻办公室发布会 on Monday with many more English words"));
        assert!(!c.is_chinese_title(""));
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("en-US").as_deref(), Some("en"));
        assert_eq!(normalize_code(" ZH ").as_deref(), Some("zh"));
        assert_eq!(normalize_code("x"), None);
        assert_eq!(normalize_code(""), None);
    }
}

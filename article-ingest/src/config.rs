use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

use interfaces::defs::DEFAULT_AUTO_FETCH_INTERVAL_SECS;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_millis: u64,
    pub max_body_size_mb: usize,
    pub max_redirects: usize,
    /// Minimum gap between two requests to the same host.
    pub per_host_delay_millis: u64,
    /// Treat an HTML page with no feed link as an article listing.
    pub allow_listing_fallback: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; ArticleIngest/1.0)".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_millis: 500,
            max_body_size_mb: 10,
            max_redirects: 5,
            per_host_delay_millis: 1000,
            allow_listing_fallback: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 60,
            max_retries: 2,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub chunk_chars: usize,
    pub retry_prefix_chars: usize,
    pub min_result_chars: usize,
    pub truncation_marker: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 2000,
            retry_prefix_chars: 2000,
            min_result_chars: 10,
            truncation_marker: "\n\n[…]".to_string(),
        }
    }
}

/// Thresholds for rejecting a Chinese summary that looks like copied body text.
#[derive(Debug, Clone)]
pub struct SummaryGuardConfig {
    pub zh_translate_prefix_chars: usize,
    pub length_multiple: f64,
    pub bleed_prefix_chars: usize,
    pub reduced_min_words: u32,
    pub zh_max_chars: usize,
    pub last_resort_prefix_chars: usize,
    pub en_retry_prefix_chars: usize,
}

impl Default for SummaryGuardConfig {
    fn default() -> Self {
        Self {
            zh_translate_prefix_chars: 400,
            length_multiple: 3.0,
            bleed_prefix_chars: 60,
            reduced_min_words: 30,
            zh_max_chars: 300,
            last_resort_prefix_chars: 200,
            en_retry_prefix_chars: 4000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub min_text_chars: usize,
    pub early_stop_chars: usize,
    pub boilerplate_window_chars: usize,
    pub boilerplate_rejection_hits: usize,
    pub max_listing_links: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            early_stop_chars: 200,
            boilerplate_window_chars: 1000,
            boilerplate_rejection_hits: 2,
            max_listing_links: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub cjk_scan_chars: usize,
    pub cjk_threshold: usize,
    pub detect_prefix_chars: usize,
    pub title_cjk_ratio: f64,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            cjk_scan_chars: 500,
            cjk_threshold: 10,
            detect_prefix_chars: 1000,
            title_cjk_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub default_interval_seconds: u64,
    pub system_user_id: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_seconds: DEFAULT_AUTO_FETCH_INTERVAL_SECS,
            system_user_id: "auto-fetch".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub database_url: Option<String>,
    pub fetch: FetchConfig,
    pub ai: AiConfig,
    pub translation: TranslationConfig,
    pub summary: SummaryGuardConfig,
    pub extraction: ExtractionConfig,
    pub language: LanguageConfig,
    pub scheduler: SchedulerConfig,
}

impl PipelineConfig {
    /// Defaults overridden by the environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let mut config = Self::default();
        config.database_url = env::var("DATABASE_URL").ok();

        config.ai.api_key = env::var("AI_API_KEY").ok();
        if let Ok(base_url) = env::var("AI_BASE_URL") {
            config.ai.base_url = base_url;
        }
        if let Ok(model) = env::var("AI_MODEL") {
            config.ai.model = model;
        }
        if let Some(timeout) = parse_var("AI_TIMEOUT_SECONDS")? {
            config.ai.timeout_seconds = timeout;
        }

        if let Ok(user_agent) = env::var("FETCH_USER_AGENT") {
            config.fetch.user_agent = user_agent;
        }
        if let Some(timeout) = parse_var("FETCH_TIMEOUT_SECONDS")? {
            config.fetch.timeout_seconds = timeout;
        }
        if let Some(allow) = parse_var("FETCH_ALLOW_LISTING_FALLBACK")? {
            config.fetch.allow_listing_fallback = allow;
        }

        if let Some(multiple) = parse_var("SUMMARY_LENGTH_MULTIPLE")? {
            config.summary.length_multiple = multiple;
        }
        if let Some(max_chars) = parse_var("SUMMARY_ZH_MAX_CHARS")? {
            config.summary.zh_max_chars = max_chars;
        }

        if let Some(interval) = parse_var("SCHEDULER_DEFAULT_INTERVAL_SECONDS")? {
            config.scheduler.default_interval_seconds = interval;
        }
        if let Ok(user_id) = env::var("SCHEDULER_USER_ID") {
            config.scheduler.system_user_id = user_id;
        }

        Ok(config)
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{name} must be a valid value, got {raw:?}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

use crate::config::AiConfig;
use crate::language::count_cjk;
use crate::types::{AiCapability, AiError, IngestError, Result, SummaryFormat, SummaryRequest, SummaryTone, TranslateOptions};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

fn language_name(code: &str) -> &str {
    match code {
        "zh" => "Simplified Chinese",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        other => other,
    }
}

fn translate_prompt(target: &str, options: &TranslateOptions) -> String {
    let mut prompt = format!(
        "You are a professional news translator. Translate the user's text into {}. \
         Keep names, numbers and quotes accurate. Reply with the translation only.",
        language_name(target)
    );
    if options.preserve_list_structure {
        prompt.push_str(" Preserve bullet and numbered list structure line by line.");
    }
    prompt
}

fn summary_prompt(request: &SummaryRequest) -> String {
    let tone = match request.tone {
        SummaryTone::Neutral => "neutral",
        SummaryTone::Formal => "formal",
        SummaryTone::Casual => "casual",
        SummaryTone::Analytical => "analytical",
    };
    let format = match request.format {
        SummaryFormat::Paragraph => "a single paragraph",
        SummaryFormat::Bullets => "concise bullet points",
        SummaryFormat::Headline => "one headline sentence followed by a short paragraph",
    };

    let mut prompt = format!(
        "Summarize the user's article in {} using a {} tone, as {}, in about {} words. \
         Do not copy sentences verbatim. Reply with the summary only.",
        language_name(&request.target_language),
        tone,
        format,
        request.word_count
    );
    if let Some(focus) = &request.focus {
        prompt.push_str(&format!(" Focus on: {}.", focus));
    }
    if !request.key_points.is_empty() {
        prompt.push_str(&format!(" Make sure to cover: {}.", request.key_points.join("; ")));
    }
    prompt
}

const DETECT_PROMPT: &str = "Identify the language of the user's text. \
    Reply with the two-letter ISO 639-1 code only, for example: en";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions backend.
pub struct ChatAdapter {
    client: Client,
    api_key: String,
    config: AiConfig,
}

impl fmt::Debug for ChatAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatAdapter")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ChatAdapter {
    pub fn new(config: AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| IngestError::General("AI_API_KEY is required".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, api_key, config })
    }

    async fn complete(&self, system: &str, user: &str) -> std::result::Result<String, AiError> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(1),
            initial_interval: Duration::from_secs(1),
            randomization_factor: 0.5,
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Some(Duration::from_secs(self.config.timeout_seconds * 3)),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.complete_once(system, user).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("AI call failed ({}), retry {} in {:?}", e, attempt, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_once(&self, system: &str, user: &str) -> std::result::Result<String, AiError> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(self.config.timeout_seconds)
                } else {
                    AiError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AiError::Unauthorized(message),
                _ => AiError::Unavailable {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Transport(format!("invalid response body: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AiError::EmptyResponse)?;

        debug!(
            model = %self.config.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "AI chat completion"
        );
        Ok(content)
    }
}

#[async_trait]
impl AiCapability for ChatAdapter {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn translate(&self, text: &str, target_language: &str, options: &TranslateOptions) -> std::result::Result<String, AiError> {
        self.complete(&translate_prompt(target_language, options), text).await
    }

    async fn detect_language(&self, text: &str) -> std::result::Result<String, AiError> {
        self.complete(DETECT_PROMPT, text).await
    }

    async fn summarize(&self, text: &str, request: &SummaryRequest) -> std::result::Result<String, AiError> {
        self.complete(&summary_prompt(request), text).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSummaryMode {
    /// First `word_count` words (or chars for unspaced text).
    FirstWords,
    /// Returns the input unchanged.
    Echo,
}

#[derive(Debug, Default)]
struct MockCounters {
    translate: AtomicUsize,
    detect: AtomicUsize,
    summarize: AtomicUsize,
}

/// Deterministic capability for development and testing. Clones share counters.
#[derive(Debug, Clone)]
pub struct MockLlmAdapter {
    name: String,
    response_delay_ms: u64,
    detected_language: Option<String>,
    fail_detection: bool,
    unauthorized: bool,
    summary_mode: MockSummaryMode,
    translate_failures: Arc<AtomicUsize>,
    counters: Arc<MockCounters>,
}

impl MockLlmAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response_delay_ms: 0,
            detected_language: None,
            fail_detection: false,
            unauthorized: false,
            summary_mode: MockSummaryMode::FirstWords,
            translate_failures: Arc::new(AtomicUsize::new(0)),
            counters: Arc::new(MockCounters::default()),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    pub fn with_detected_language(mut self, code: impl Into<String>) -> Self {
        self.detected_language = Some(code.into());
        self
    }

    pub fn with_summary_mode(mut self, mode: MockSummaryMode) -> Self {
        self.summary_mode = mode;
        self
    }

    pub fn failing_detection(mut self) -> Self {
        self.fail_detection = true;
        self
    }

    /// The next `count` translate calls fail with a 503.
    pub fn failing_translations(self, count: usize) -> Self {
        self.translate_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn unauthorized(mut self) -> Self {
        self.unauthorized = true;
        self
    }

    pub fn translate_calls(&self) -> usize {
        self.counters.translate.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.counters.detect.load(Ordering::SeqCst)
    }

    pub fn summarize_calls(&self) -> usize {
        self.counters.summarize.load(Ordering::SeqCst)
    }

    async fn simulate_processing(&self) {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
    }

    fn take_failure(&self) -> bool {
        self.translate_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AiCapability for MockLlmAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(&self, text: &str, target_language: &str, _options: &TranslateOptions) -> std::result::Result<String, AiError> {
        self.counters.translate.fetch_add(1, Ordering::SeqCst);
        self.simulate_processing().await;

        if self.unauthorized {
            return Err(AiError::Unauthorized("mock key rejected".to_string()));
        }
        if self.take_failure() {
            return Err(AiError::Unavailable {
                status: 503,
                message: "mock outage".to_string(),
            });
        }
        Ok(format!("[{}] {}", target_language, text))
    }

    async fn detect_language(&self, text: &str) -> std::result::Result<String, AiError> {
        self.counters.detect.fetch_add(1, Ordering::SeqCst);
        self.simulate_processing().await;

        if self.fail_detection {
            return Err(AiError::Transport("mock detection unavailable".to_string()));
        }
        Ok(match &self.detected_language {
            Some(code) => code.clone(),
            None if count_cjk(text) > 0 => "zh".to_string(),
            None => "en".to_string(),
        })
    }

    async fn summarize(&self, text: &str, request: &SummaryRequest) -> std::result::Result<String, AiError> {
        self.counters.summarize.fetch_add(1, Ordering::SeqCst);
        self.simulate_processing().await;

        if self.unauthorized {
            return Err(AiError::Unauthorized("mock key rejected".to_string()));
        }
        let limit = request.word_count as usize;
        let summary = match self.summary_mode {
            MockSummaryMode::Echo => text.to_string(),
            MockSummaryMode::FirstWords => {
                let words: Vec<&str> = text.split_whitespace().collect();
                if words.len() > 1 {
                    words.into_iter().take(limit).collect::<Vec<_>>().join(" ")
                } else {
                    text.chars().take(limit).collect()
                }
            }
        };
        if summary.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(summary)
    }
}

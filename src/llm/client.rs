//! Language model service client.
//!
//! The model is a stateless request/response capability: one instruction, one
//! question, freeform text back. No conversation memory between calls.

use crate::otel::{llm_span, record_llm_response};
use crate::types::{InsightError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::Instrument;

/// Text generation capability used by the translator.
///
/// Implemented by [`LlmClient`] for hosted APIs; tests plug in scripted models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion from an instruction and a question.
    ///
    /// # Errors
    ///
    /// Returns `InsightError::TranslationError` on network, quota or response-shape failures
    async fn generate(&self, instruction: &str, question: &str) -> Result<String>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
    Gemini,
}

impl LlmProvider {
    /// Pick the provider from the model name prefix.
    ///
    /// `claude*` → Anthropic, `gemini*` → Gemini, anything else → OpenAI.
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("claude") || model.starts_with("anthropic") {
            Self::Anthropic
        } else if model.starts_with("gemini") || model.starts_with("google") {
            Self::Gemini
        } else {
            Self::OpenAI
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

/// OpenAI chat completion response.
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

/// Anthropic messages response.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

/// Gemini generateContent response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

/// HTTP client for hosted language models.
pub struct LlmClient {
    api_key: String,
    model: String,
    provider: LlmProvider,
    base_url: Option<String>,
    client: Client,
}

impl LlmClient {
    /// Create new client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Provider API key
    /// * `model` - Model name (e.g., "gemini-pro", "gpt-4o-mini", "claude-3-5-haiku-latest")
    ///
    /// # Returns
    ///
    /// New `LlmClient` talking to the provider implied by the model name
    pub fn new(api_key: String, model: String) -> Self {
        let provider = LlmProvider::for_model(&model);
        Self {
            api_key,
            model,
            provider,
            base_url: None,
            client: Client::new(),
        }
    }

    /// Create from environment variables.
    ///
    /// Reads the key from the provider's variable (`OPENAI_API_KEY`,
    /// `ANTHROPIC_API_KEY` or `GOOGLE_API_KEY`).
    ///
    /// # Errors
    ///
    /// Returns `InsightError::ConfigError` if the API key is not set
    pub fn from_env(model: &str) -> Result<Self> {
        let var = LlmProvider::for_model(model).api_key_var();
        let api_key = std::env::var(var)
            .map_err(|_| InsightError::ConfigError(format!("{} environment variable not set", var)))?;
        Ok(Self::new(api_key, model.to_string()))
    }

    /// Override the API base URL (proxies, compatible gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn base_url(&self, default: &str) -> String {
        self.base_url.clone().unwrap_or_else(|| default.to_string())
    }

    /// Call OpenAI chat completions API.
    async fn call_openai(&self, instruction: &str, question: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url("https://api.openai.com"));
        let body = self
            .send(
                self.client
                    .post(url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&json!({
                        "model": self.model,
                        "messages": [
                            {"role": "system", "content": instruction},
                            {"role": "user", "content": question}
                        ],
                        "temperature": 0.0
                    })),
            )
            .await?;

        let parsed: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            InsightError::translation(format!("Failed to parse OpenAI response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InsightError::translation("No response from OpenAI"))
    }

    /// Call Anthropic messages API.
    async fn call_anthropic(&self, instruction: &str, question: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url("https://api.anthropic.com"));
        let body = self
            .send(
                self.client
                    .post(url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&json!({
                        "model": self.model,
                        "max_tokens": 1024,
                        "system": instruction,
                        "messages": [
                            {"role": "user", "content": question}
                        ],
                        "temperature": 0.0
                    })),
            )
            .await?;

        let parsed: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            InsightError::translation(format!("Failed to parse Anthropic response: {}", e))
        })?;

        let text: String = parsed.content.into_iter().map(|c| c.text).collect();
        if text.is_empty() {
            return Err(InsightError::translation("No response from Anthropic"));
        }
        Ok(text)
    }

    /// Call Gemini generateContent API.
    ///
    /// Instruction and question travel as two parts of one user turn.
    async fn call_gemini(&self, instruction: &str, question: &str) -> Result<String> {
        let model = self.model.strip_prefix("google:").unwrap_or(&self.model);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url("https://generativelanguage.googleapis.com"),
            model
        );
        let body = self
            .send(
                self.client
                    .post(url)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&json!({
                        "contents": [{
                            "role": "user",
                            "parts": [{"text": instruction}, {"text": question}]
                        }],
                        "generationConfig": {"temperature": 0.0}
                    })),
            )
            .await?;

        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            InsightError::translation(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(InsightError::translation("No response from Gemini"));
        }
        Ok(text)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let provider = self.provider.as_str();
        let response = request
            .send()
            .await
            .map_err(|e| InsightError::translation(format!("{} API error: {}", provider, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InsightError::translation(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(InsightError::translation(format!(
                "{} API error {}: {}",
                provider, status, body
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate(&self, instruction: &str, question: &str) -> Result<String> {
        let span = llm_span(self.provider.as_str(), &self.model);
        async {
            let text = match self.provider {
                LlmProvider::OpenAI => self.call_openai(instruction, question).await,
                LlmProvider::Anthropic => self.call_anthropic(instruction, question).await,
                LlmProvider::Gemini => self.call_gemini(instruction, question).await,
            }?;

            record_llm_response(text.len());
            tracing::debug!(raw = %text, "model response");
            Ok::<_, InsightError>(text)
        }
        .instrument(span)
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_for_model() {
        assert_eq!(LlmProvider::for_model("gemini-pro"), LlmProvider::Gemini);
        assert_eq!(LlmProvider::for_model("claude-3-5-haiku-latest"), LlmProvider::Anthropic);
        assert_eq!(LlmProvider::for_model("gpt-4o-mini"), LlmProvider::OpenAI);
    }

    #[test]
    fn test_api_key_var() {
        assert_eq!(LlmProvider::Gemini.api_key_var(), "GOOGLE_API_KEY");
        assert_eq!(LlmProvider::OpenAI.api_key_var(), "OPENAI_API_KEY");
    }

    #[test]
    fn test_parse_gemini_response() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"SELECT 1"}],"role":"model"}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        let content = parsed.candidates[0].content.as_ref().unwrap();
        assert_eq!(content.parts[0].text, "SELECT 1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_translation_error() {
        let client = LlmClient::new("key".to_string(), "gpt-4o-mini".to_string())
            .with_base_url("http://127.0.0.1:9");
        assert_eq!(client.provider(), LlmProvider::OpenAI);
        let result = client.generate("instruction", "question").await;
        assert!(matches!(result, Err(InsightError::TranslationError(_))));
    }
}

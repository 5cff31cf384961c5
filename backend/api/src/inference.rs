//! Hosted text-generation clients (HuggingFace Inference API, OpenRouter).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::config::{AiConfig, AiProvider};
use crate::errors::VendorError;

const HUGGING_FACE_API_BASE: &str = "https://api-inference.huggingface.co/models";
const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 150,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("inference API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference response contained no generated text")]
    Empty,

    #[error("no inference provider is configured")]
    NotConfigured,
}

impl GenerationError {
    /// HTTP status reported by the vendor, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Empty | Self::NotConfigured => None,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// Pick the generator matching the configured provider.
pub fn from_config(client: Client, config: &AiConfig) -> Arc<dyn TextGenerator> {
    match (config.provider, config.api_key()) {
        (Some(AiProvider::HuggingFace), Some(key)) => {
            Arc::new(HuggingFaceClient::new(client, key.to_string()))
        }
        (Some(AiProvider::OpenRouter), Some(key)) => {
            Arc::new(OpenRouterClient::new(client, key.to_string()))
        }
        _ => Arc::new(Unconfigured),
    }
}

/// Used when no API key is present; every call fails without touching the network.
pub struct Unconfigured;

#[async_trait]
impl TextGenerator for Unconfigured {
    async fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _params: GenerationParams,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::NotConfigured)
    }
}

// ─────────────────────────────────────────────────────────
// HuggingFace
// ─────────────────────────────────────────────────────────

pub struct HuggingFaceClient {
    client: Client,
    api_key: String,
}

impl HuggingFaceClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct HfGeneration {
    generated_text: String,
}

#[async_trait]
impl TextGenerator for HuggingFaceClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let resp = self
            .client
            .post(format!("{HUGGING_FACE_API_BASE}/{model}"))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "inputs": prompt,
                "parameters": {
                    "max_new_tokens": params.max_new_tokens,
                    "temperature": params.temperature,
                    "return_full_text": false,
                },
                "options": { "wait_for_model": false },
            }))
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        // The API answers with either a list or a single object.
        let generations: Vec<HfGeneration> = match body {
            Value::Array(_) => serde_json::from_value(body).unwrap_or_default(),
            Value::Object(_) => serde_json::from_value::<HfGeneration>(body)
                .map(|g| vec![g])
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        generations
            .into_iter()
            .map(|g| g.generated_text)
            .find(|t| !t.trim().is_empty())
            .ok_or(GenerationError::Empty)
    }
}

// ─────────────────────────────────────────────────────────
// OpenRouter
// ─────────────────────────────────────────────────────────

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let resp = self
            .client
            .post(OPENROUTER_CHAT_URL)
            .bearer_auth(&self.api_key)
            .header("X-Title", "Tree Adoption Platform")
            .json(&json!({
                "model": model,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": params.max_new_tokens,
                "temperature": params.temperature,
            }))
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let completion: ChatCompletion =
            serde_json::from_value(body).map_err(|_| GenerationError::Empty)?;
        completion
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .find(|t| !t.trim().is_empty())
            .ok_or(GenerationError::Empty)
    }
}

impl From<GenerationError> for VendorError {
    fn from(err: GenerationError) -> Self {
        let status = err.status();
        let vendor = VendorError::new(err.to_string()).with_kind("inference_error");
        match status {
            Some(status) => vendor.with_code(status.to_string()),
            None => vendor,
        }
    }
}

/// A primary model with a single fallback model behind it.
#[derive(Clone)]
pub struct ModelChain {
    generator: Arc<dyn TextGenerator>,
    primary: String,
    fallback: String,
}

/// Text produced by a [`ModelChain`] and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub model: String,
    pub fallback_used: bool,
}

/// The last error a [`ModelChain`] saw, and whether the fallback was tried.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ChainFailure {
    pub error: GenerationError,
    pub fallback_used: bool,
}

impl ModelChain {
    pub fn new(generator: Arc<dyn TextGenerator>, primary: String, fallback: String) -> Self {
        Self {
            generator,
            primary,
            fallback,
        }
    }

    /// Try the primary model, then the fallback once. The fallback's error wins.
    ///
    /// No retry happens when nothing is configured or when both names point
    /// at the same model.
    pub async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<Generated, ChainFailure> {
        let primary_err = match self.generator.generate(&self.primary, prompt, params).await {
            Ok(text) => {
                return Ok(Generated {
                    text,
                    model: self.primary.clone(),
                    fallback_used: false,
                })
            }
            Err(e) => e,
        };

        if matches!(primary_err, GenerationError::NotConfigured) || self.fallback == self.primary {
            return Err(ChainFailure {
                error: primary_err,
                fallback_used: false,
            });
        }

        warn!(
            "Primary model {} failed ({primary_err}); retrying with {}",
            self.primary, self.fallback
        );
        match self.generator.generate(&self.fallback, prompt, params).await {
            Ok(text) => Ok(Generated {
                text,
                model: self.fallback.clone(),
                fallback_used: true,
            }),
            Err(error) => Err(ChainFailure {
                error,
                fallback_used: true,
            }),
        }
    }
}

/// Vendors report errors as `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn error_message(body: &Value) -> String {
    match body.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| obj.to_string()),
        None => "no error details".to_string(),
    }
}

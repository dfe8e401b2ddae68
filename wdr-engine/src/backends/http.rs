//! HTTP chat-completion backend
//!
//! Implements both the `Producer` and `Arbiter` capabilities against an
//! OpenAI-style chat-completion endpoint (JSON POST, optional bearer auth,
//! token usage read from the response). One instance wraps one model id;
//! the pool cycles attempts across several instances.
//!
//! A minimum-interval rate limit guards the remote service; the per-call
//! timeout is set on the HTTP client, with the workflow-level timeout
//! wrapping the whole invocation as a second guard.

use crate::arbiter::{CONFIDENCE_LABEL, FINAL_LABEL, SIMILARITY_LABEL};
use crate::types::{
    Arbiter, ArbitrationRequest, GenerationRequest, Producer, ProducerError, ProducerResponse,
};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Default timeout for backend requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default minimum interval between requests to the same endpoint
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// How many title variations are offered to the backend for search coverage
const MAX_TITLE_VARIATIONS: usize = 3;

/// Backend configuration
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Chat-completion endpoint URL
    pub endpoint: String,
    /// Bearer token, if the endpoint requires one
    pub api_key: Option<String>,
    /// Model identifier sent with each request
    pub model_id: String,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Minimum interval between requests
    pub min_request_interval: Duration,
}

impl HttpBackendConfig {
    pub fn new(endpoint: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model_id: model_id.into(),
            timeout: DEFAULT_TIMEOUT,
            min_request_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

/// HTTP chat-completion backend bound to one model id
pub struct HttpBackend {
    http_client: Client,
    config: HttpBackendConfig,
    /// Last request time, for the minimum-interval rate limit
    rate_limiter: Arc<Mutex<Option<Instant>>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl HttpBackend {
    /// Create a backend client.
    ///
    /// Fails only when the HTTP client itself cannot be constructed (bad
    /// header value in the API key).
    pub fn new(config: HttpBackendConfig) -> Result<Self, ProducerError> {
        let mut headers = header::HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| ProducerError::Api(format!("Invalid API key header: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let http_client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProducerError::Network(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            config,
            rate_limiter: Arc::new(Mutex::new(None)),
        })
    }

    /// Sleep if needed to keep the minimum interval between requests
    async fn enforce_rate_limit(&self) {
        let mut last_request = self.rate_limiter.lock().await;

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < self.config.min_request_interval {
                let sleep_duration = self.config.min_request_interval - elapsed;
                debug!(
                    sleep_ms = sleep_duration.as_millis(),
                    "Rate limiting: sleeping before backend request"
                );
                sleep(sleep_duration).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    async fn chat(&self, system: String, user: String) -> Result<ProducerResponse, ProducerError> {
        self.enforce_rate_limit().await;

        let request = ChatRequest {
            model: &self.config.model_id,
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
            temperature: 0.4,
        };

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProducerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProducerError::Api(format!(
                "backend returned {}: {:.200}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProducerError::Parse(e.to_string()))?;

        let text = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProducerError::Parse("response carried no content".to_string()))?;

        let (tokens_in, tokens_out) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(ProducerResponse {
            text,
            tokens_in,
            tokens_out,
        })
    }
}

/// System instruction for one generation attempt
fn generation_system_prompt(req: &GenerationRequest) -> String {
    let authors = if req.known_authors.is_empty() {
        "Unknown".to_string()
    } else {
        req.known_authors
            .iter()
            .map(|name| format!("'{}'", name))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let variations = req
        .title_variations
        .iter()
        .take(MAX_TITLE_VARIATIONS)
        .map(|v| format!("\"{}\"", v))
        .collect::<Vec<_>>()
        .join(" OR ");

    format!(
        "You are a bibliographic research assistant. Produce a single JSON object \
         describing the published work '{}' (also searchable as {}). Known authors: {}. \
         Use the keys: index, title, alternative_titles, type, authors, artists, genres, \
         synopsis, main_characters, publication_info, status. Respond with JSON only.",
        req.cleaned_title, variations, authors
    )
}

/// User prompt for one generation attempt
fn generation_user_prompt(req: &GenerationRequest) -> String {
    format!(
        "Generate the detailed JSON description for the work: {} (Index: {}).",
        req.title, req.index
    )
}

/// System instruction for the arbitration call
fn arbitration_system_prompt(candidate_count: usize, title: &str) -> String {
    format!(
        "You are reconciling {} candidate descriptions of the published work '{}'. \
         Respond with exactly three labeled sections in this order: \
         '{}' comparing the candidates, '{}' as a number from 0 to 100, and '{}' \
         followed by a single JSON object with no surrounding prose.",
        candidate_count, title, SIMILARITY_LABEL, CONFIDENCE_LABEL, FINAL_LABEL
    )
}

/// User input for the arbitration call, listing every candidate
fn arbitration_input(req: &ArbitrationRequest) -> String {
    let mut input = format!("Work Title: {}\n\n", req.title);
    input.push_str(&format!(
        "Evaluate the following {} generated JSON descriptions:\n",
        req.candidates.len()
    ));
    for (i, candidate) in req.candidates.iter().enumerate() {
        input.push_str(&format!("\n--- Description {} ---\n{}\n", i + 1, candidate));
    }
    if req.candidates.is_empty() {
        input.push_str(
            "[No candidate descriptions were produced. Generate a new description \
             from scratch based on the work title.]\n",
        );
    }
    input.push_str("\n--- End of Descriptions ---");
    input
}

#[async_trait]
impl Producer for HttpBackend {
    fn id(&self) -> &str {
        &self.config.model_id
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<ProducerResponse, ProducerError> {
        debug!(model = %self.config.model_id, title = %req.title, "Generation request");
        self.chat(generation_system_prompt(req), generation_user_prompt(req))
            .await
    }
}

#[async_trait]
impl Arbiter for HttpBackend {
    fn id(&self) -> &str {
        &self.config.model_id
    }

    async fn reconcile(
        &self,
        req: &ArbitrationRequest,
    ) -> Result<ProducerResponse, ProducerError> {
        debug!(model = %self.config.model_id, title = %req.title, "Arbitration request");
        self.chat(
            arbitration_system_prompt(req.candidates.len(), &req.title),
            arbitration_input(req),
        )
        .await
    }
}

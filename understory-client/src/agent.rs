//! OpenAI-compatible chat completions with structured (JSON schema) output

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn, Span};
use understory_core::config::{env_non_empty, AgentConfig};
use understory_core::{Agent, AgentRequest, Result, UnderstoryError};

const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// One failed attempt: retry or give up.
enum Failure {
    Transient(String),
    Permanent(String),
}

pub struct HttpAgent {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: usize,
    backoff: Duration,
    span: Span,
}

impl HttpAgent {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_retries: usize,
        span: Span,
    ) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| UnderstoryError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_retries,
            backoff: DEFAULT_BACKOFF,
            span,
        })
    }

    pub fn from_config(config: &AgentConfig, span: Span) -> Result<Self> {
        let api_key = env_non_empty(&config.api_key_env).ok_or_else(|| {
            UnderstoryError::Configuration(format!(
                "agent backend enabled but {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(&config.endpoint, api_key, &config.model, config.max_retries, span)
    }

    /// Base delay between attempts, doubled after each failure.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn body(&self, request: &AgentRequest) -> Value {
        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        json!({
            "model": self.model,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                }
            }
        })
    }

    fn attempt(&self, body: &Value) -> std::result::Result<Value, Failure> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| Failure::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {status}");
            return Err(
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    Failure::Transient(message)
                } else {
                    Failure::Permanent(message)
                },
            );
        }

        let chat: ChatResponse = response
            .json()
            .map_err(|e| Failure::Transient(format!("unexpected response: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Failure::Transient("reply has no content".to_string()))?;
        // Malformed JSON counts as transient
        serde_json::from_str(&content).map_err(|e| Failure::Transient(format!("reply is not JSON: {e}")))
    }
}

impl Agent for HttpAgent {
    fn complete(&self, request: &AgentRequest) -> Result<Value> {
        let body = self.body(request);
        let mut delay = self.backoff;
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            match self.attempt(&body) {
                Ok(value) => {
                    debug!(parent: &self.span, schema = %request.schema_name, attempt, "Agent replied");
                    return Ok(value);
                }
                Err(Failure::Permanent(message)) => {
                    return Err(UnderstoryError::Agent(message));
                }
                Err(Failure::Transient(message)) => {
                    warn!(parent: &self.span, schema = %request.schema_name, attempt, error = %message, "Agent call failed");
                    last_error = message;
                }
            }
            if attempt < self.max_retries {
                std::thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
        }
        Err(UnderstoryError::Agent(format!(
            "gave up after {} attempts: {last_error}",
            self.max_retries + 1
        )))
    }
}

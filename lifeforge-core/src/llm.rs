//! LLM text generation clients.
//!
//! The chat orchestrator only needs "prompt in, reply text out"; providers
//! differ in URL layout, auth headers and where the text sits in the response.

use crate::config::{LlmConfig, LlmProvider};
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;

const GIGACHAT_OAUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";

/// Text generation interface used by the chat orchestrator.
pub trait LlmClient: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Create the HTTP-backed client for the configured provider.
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    Ok(Box::new(HttpLlmClient::new(config)?))
}

struct HttpLlmClient {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    scope: String,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpLlmClient {
    fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = config.api_key.clone().or_else(|| {
            config
                .provider
                .api_key_env()
                .and_then(|var| std::env::var(var).ok())
        });

        if config.provider.api_key_env().is_some() && api_key.is_none() {
            return Err(Error::Config(format!(
                "llm.api_key (or {}) is required",
                config.provider.api_key_env().unwrap_or_default()
            )));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Llm(format!("failed to build tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            scope: config.scope.clone(),
            runtime,
            http,
        })
    }

    fn bearer(token: &str) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::Llm(format!("invalid auth header: {e}")))
    }

    /// Send a request and return the decoded JSON body of a 2xx response.
    async fn send(&self, label: &str, request: reqwest::RequestBuilder) -> Result<Value> {
        let resp = request
            .send()
            .await
            .map_err(|e| Error::Llm(format!("{label} request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Llm(format!("{label} read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "{label} returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| Error::Llm(format!("{label} returned invalid JSON: {e}")))
    }

    async fn generate_ollama(&self, prompt: &str) -> Result<String> {
        let request = self
            .http
            .post(format!("{}/api/generate", self.endpoint))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }));
        let body = self.send("ollama", request).await?;
        ollama_text(&body)
    }

    async fn generate_claude(&self, prompt: &str) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key.as_deref().unwrap_or_default())
                .map_err(|e| Error::Llm(format!("invalid claude api key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let request = self
            .http
            .post(format!("{}/v1/messages", self.endpoint))
            .headers(headers)
            .json(&json!({
                "model": self.model,
                "max_tokens": 2048,
                "messages": [{ "role": "user", "content": prompt }],
            }));
        let body = self.send("claude", request).await?;
        claude_text(&body)
    }

    async fn generate_openai(&self, prompt: &str) -> Result<String> {
        let request = self
            .http
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .header(
                AUTHORIZATION,
                Self::bearer(self.api_key.as_deref().unwrap_or_default())?,
            )
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
            }));
        let body = self.send("openai", request).await?;
        chat_completion_text(&body)
    }

    /// GigaChat issues a short-lived access token per authorization key.
    async fn gigachat_token(&self) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("RqUID", request_uid()?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "Basic {}",
                self.api_key.as_deref().unwrap_or_default()
            ))
            .map_err(|e| Error::Llm(format!("invalid gigachat auth key header: {e}")))?,
        );

        let request = self
            .http
            .post(GIGACHAT_OAUTH_URL)
            .headers(headers)
            .body(format!("scope={}", urlencoding::encode(&self.scope)));
        let body = self.send("gigachat oauth", request).await?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::Llm("gigachat oauth response missing access_token".to_string()))
    }

    async fn generate_gigachat(&self, prompt: &str) -> Result<String> {
        let token = self.gigachat_token().await?;
        tracing::debug!("GigaChat access token obtained");

        let request = self
            .http
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .header(AUTHORIZATION, Self::bearer(&token)?)
            .header("RqUID", request_uid()?)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "stream": false,
            }));
        let body = self.send("gigachat", request).await?;
        chat_completion_text(&body)
    }
}

impl LlmClient for HttpLlmClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        tracing::info!(
            provider = ?self.provider,
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "Sending prompt to LLM"
        );
        let reply = self.runtime.block_on(async {
            match self.provider {
                LlmProvider::Ollama => self.generate_ollama(prompt).await,
                LlmProvider::Claude => self.generate_claude(prompt).await,
                LlmProvider::OpenAI => self.generate_openai(prompt).await,
                LlmProvider::GigaChat => self.generate_gigachat(prompt).await,
            }
        })?;
        tracing::debug!(reply_chars = reply.chars().count(), "LLM reply received");
        Ok(reply)
    }
}

fn request_uid() -> Result<HeaderValue> {
    HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
        .map_err(|e| Error::Llm(format!("invalid RqUID header: {e}")))
}

fn ollama_text(body: &Value) -> Result<String> {
    body.get("response")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| Error::Llm("ollama response missing string field `response`".to_string()))
}

fn claude_text(body: &Value) -> Result<String> {
    body.get("content")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("text"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| Error::Llm("claude response missing content[0].text".to_string()))
}

/// OpenAI-style `choices[0].message.content`, shared by GigaChat.
fn chat_completion_text(body: &Value) -> Result<String> {
    body.get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| Error::Llm("response has no choices[0].message.content".to_string()))
}

//! HTTP client for the running inference server

use crate::config::GenerationParams;
use crate::error::{GgufError, GgufResult};
use crate::proxy::chat::EventStreamScanner;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};

/// Body of `POST /completion`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub n_predict: u32,
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cache_prompt: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl CompletionRequest {
    /// One-shot completion with the given sampling parameters
    pub fn new(prompt: impl Into<String>, params: &GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            n_predict: params.n_predict,
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
            cache_prompt: false,
            stop: Vec::new(),
            stream: false,
        }
    }

    /// Streamed completion that reuses the server's prompt cache
    pub fn streaming(mut self, stop: &[&str]) -> Self {
        self.cache_prompt = true;
        self.stream = true;
        self.stop = stop.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Thin wrapper over the inference server's HTTP API
#[derive(Debug, Clone)]
pub struct ServerClient {
    base_url: String,
    client: reqwest::Client,
    params: GenerationParams,
}

impl ServerClient {
    pub fn new(base_url: &str, params: GenerationParams) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            params,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx response into [`GgufError::Upstream`] carrying the body
    async fn check(response: reqwest::Response) -> GgufResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GgufError::Upstream {
            status: status.as_u16(),
            body,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> GgufResult<Value> {
        tracing::debug!(path = %path, "POST to inference server");
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn get_json(&self, path: &str) -> GgufResult<Value> {
        tracing::debug!(path = %path, "GET from inference server");
        let response = self.client.get(self.url(path)).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Complete `prompt` and return the generated text
    pub async fn complete(&self, prompt: &str) -> GgufResult<String> {
        let request = CompletionRequest::new(prompt, &self.params);
        let response = self
            .client
            .post(self.url("/completion"))
            .json(&request)
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;

        Ok(body
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Stream a completion, handing each content fragment to `on_fragment`
    ///
    /// Returns the concatenated text of every fragment.
    pub async fn complete_stream<F>(
        &self,
        prompt: &str,
        stop: &[&str],
        mut on_fragment: F,
    ) -> GgufResult<String>
    where
        F: FnMut(&str) -> GgufResult<()>,
    {
        let request = CompletionRequest::new(prompt, &self.params).streaming(stop);
        let response = self
            .client
            .post(self.url("/completion"))
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let mut scanner = EventStreamScanner::new();
        let mut reply = String::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            for fragment in scanner.feed(&chunk?) {
                on_fragment(&fragment)?;
                reply.push_str(&fragment);
            }
        }
        for fragment in scanner.finish() {
            on_fragment(&fragment)?;
            reply.push_str(&fragment);
        }

        Ok(reply)
    }

    pub async fn embed(&self, text: &str) -> GgufResult<Value> {
        self.post_json("/embedding", &json!({ "content": text })).await
    }

    pub async fn tokenize(&self, text: &str) -> GgufResult<Value> {
        self.post_json("/tokenize", &json!({ "content": text })).await
    }

    pub async fn detokenize(&self, tokens: &[i64]) -> GgufResult<Value> {
        self.post_json("/detokenize", &json!({ "tokens": tokens })).await
    }

    pub async fn health(&self) -> GgufResult<Value> {
        self.get_json("/health").await
    }

    pub async fn props(&self) -> GgufResult<Value> {
        self.get_json("/props").await
    }
}

//! Hugging Face hub listing API client
//!
//! Only the two JSON endpoints the manager needs are wrapped:
//! - `GET /api/models/{id}` for a single model's file manifest
//! - `GET /api/models?filter=gguf&sort=...` for the public listing

use crate::error::{GgufError, GgufResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Suffix of the quantized artifact selected by `pull`
pub const QUANT_SUFFIX: &str = "q4_k_m.gguf";

/// Tag that marks a hub model as carrying GGUF files
pub const GGUF_TAG: &str = "gguf";

/// One model as returned by the hub API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubModel {
    pub model_id: String,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub siblings: Vec<Sibling>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub likes: u64,
}

/// One file in a model repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sibling {
    pub rfilename: String,
}

impl HubModel {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Sort order for the public listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSort {
    /// Most recently modified first (`recent`)
    LastModified,
    /// Most downloaded first (`trending`)
    Downloads,
}

impl RemoteSort {
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::LastModified => "lastModified",
            Self::Downloads => "downloads",
        }
    }
}

/// First repository file ending in the quantization suffix, case-insensitively
pub fn select_quantized_file(model: &HubModel) -> Option<&str> {
    model
        .siblings
        .iter()
        .map(|s| s.rfilename.as_str())
        .find(|name| name.to_lowercase().ends_with(QUANT_SUFFIX))
}

/// Read-only access to the hub's model metadata
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Fetch a single model, including its file manifest
    async fn model_info(&self, source_id: &str) -> GgufResult<HubModel>;

    /// Fetch one page of the public GGUF listing
    async fn list_models(&self, sort: RemoteSort) -> GgufResult<Vec<HubModel>>;
}

/// Production hub client over HTTPS
pub struct HttpHubClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpHubClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, &str)],
    ) -> GgufResult<T> {
        tracing::debug!(url = %url, "Querying hub");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GgufError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    async fn model_info(&self, source_id: &str) -> GgufResult<HubModel> {
        let url = format!("{}/api/models/{}", self.endpoint, source_id);
        self.get_json(url, &[("filter", GGUF_TAG), ("sort", "lastModified")])
            .await
    }

    async fn list_models(&self, sort: RemoteSort) -> GgufResult<Vec<HubModel>> {
        let url = format!("{}/api/models", self.endpoint);
        self.get_json(url, &[("filter", GGUF_TAG), ("sort", sort.as_query())])
            .await
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

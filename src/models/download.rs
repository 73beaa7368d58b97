//! Model artifact download using hf-hub
//!
//! Fetches a single repository file through the native Rust hf-hub crate
//! instead of shelling out to huggingface-cli, then moves it into the
//! manager's `<models_dir>/<source_id>/` layout.

use crate::error::{GgufError, GgufResult};
use async_trait::async_trait;
use hf_hub::api::tokio::ApiBuilder;
use std::path::{Path, PathBuf};

/// Name of the throwaway hf-hub cache created inside the destination directory
const STAGING_DIR: &str = ".hf-staging";

/// Fetches one file of a hub repository into a local directory
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Place `file_name` from repository `source_id` at `dest_dir/file_name`
    async fn download(
        &self,
        source_id: &str,
        file_name: &str,
        dest_dir: &Path,
    ) -> GgufResult<PathBuf>;
}

/// Production downloader backed by hf-hub
pub struct HfHubDownloader {
    endpoint: String,
    progress: bool,
}

impl HfHubDownloader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            progress: true,
        }
    }

    /// Disable the terminal progress bar
    pub fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }
}

#[async_trait]
impl Downloader for HfHubDownloader {
    async fn download(
        &self,
        source_id: &str,
        file_name: &str,
        dest_dir: &Path,
    ) -> GgufResult<PathBuf> {
        tracing::info!(source_id = %source_id, file = %file_name, "Starting download via hf-hub");

        let staging = dest_dir.join(STAGING_DIR);
        let api = ApiBuilder::new()
            .with_cache_dir(staging.clone())
            .with_endpoint(self.endpoint.clone())
            .with_progress(self.progress)
            .build()
            .map_err(|e| GgufError::Download(format!("Failed to create HF API client: {}", e)))?;

        let repo = api.model(source_id.to_string());
        let snapshot_path = repo
            .get(file_name)
            .await
            .map_err(|e| GgufError::Download(format!("Failed to download {}: {}", file_name, e)))?;

        // Snapshot entries are symlinks into the blob store; move the blob itself
        let blob = tokio::fs::canonicalize(&snapshot_path).await?;
        let target = dest_dir.join(file_name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&blob, &target).await?;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            tracing::warn!(error = %e, path = ?staging, "Failed to clean up download staging cache");
        }

        tracing::info!(path = ?target, "Download complete");
        Ok(target)
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downloader_builder() {
        let downloader = HfHubDownloader::new("https://huggingface.co").quiet();
        assert!(!downloader.progress);
        assert_eq!(downloader.endpoint, "https://huggingface.co");
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_download_small_gguf() {
        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = HfHubDownloader::new("https://huggingface.co").quiet();
        let path = downloader
            .download(
                "ggml-org/models",
                "tinyllamas/stories260K.gguf",
                temp_dir.path(),
            )
            .await
            .unwrap();
        assert!(path.exists());
        assert!(!temp_dir.path().join(STAGING_DIR).exists());
    }
}

//! Model acquisition module
//!
//! Provides functionality for:
//! - Validating hub identifiers and deriving slugs
//! - Querying the Hugging Face hub for file manifests and listings
//! - Downloading the selected quantized GGUF artifact
//! - Importing, resetting, removing and aliasing local models

pub mod download;
pub mod hub;
pub mod manager;
pub mod slug;

pub use download::{Downloader, HfHubDownloader};
pub use hub::{HttpHubClient, HubClient, HubModel, RemoteSort, select_quantized_file};
pub use manager::{ImportReport, ModelManager, PullOutcome};
pub use slug::{format_file_size, generate_slug, validate_slug, validate_source_id};

//! gguf-manager - Local GGUF model manager
//!
//! Pulls quantized GGUF models from the Hugging Face hub into a local cache,
//! keeps their metadata in SQLite, supervises a `llama-server` process per
//! model and forwards completion, embedding and tokenization requests to it.

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod lock;
pub mod models;
pub mod process;
pub mod proxy;
pub mod render;
pub mod store;
pub mod supervisor;

pub use config::{Config, GenerationParams};
pub use error::{GgufError, GgufResult};
pub use models::{ModelManager, PullOutcome};
pub use store::{ModelRecord, NewModel, Store};
pub use supervisor::{EnsureOutcome, Supervisor, SupervisorSettings};

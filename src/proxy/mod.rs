//! Request proxy to the running inference server
//!
//! - `client`: typed HTTP calls (`/completion`, `/embedding`, `/tokenize`, ...)
//! - `chat`: chat transcript and streamed reply parsing
//! - `commands`: command handlers that make sure a server is up first

pub mod chat;
pub mod client;
pub mod commands;

pub use chat::{ChatSession, EventStreamScanner, Role, Turn};
pub use client::{CompletionRequest, ServerClient};
pub use commands::{Proxy, chat_loop};

//! Client for the ChatGPT backend API.
//!
//! Authenticates through the session endpoint, issues conversation
//! requests, and incrementally decodes the streamed response into typed
//! message events. At most one conversation is in flight per client; a new
//! request supersedes the previous one.
//!
//! # Example
//!
//! ```ignore
//! use chatgpt_client::{ChatGptClient, ConversationParams};
//!
//! let client = ChatGptClient::new();
//! client
//!     .conversation(ConversationParams::new("Hello!"), |message, done| {
//!         if let Some(message) = message {
//!             println!("{}", message.text);
//!         }
//!         if done {
//!             println!("(done)");
//!         }
//!     })
//!     .await?;
//! ```

mod client;
mod error;
mod session;
mod sse;
mod types;

pub use client::*;
pub use error::*;
pub use session::*;
pub use sse::*;
pub use types::*;

//! # longhaul-core
//!
//! Core library for longhaul - long-running, iterative analysis sessions
//! driven one model call at a time.
//!
//! This library provides:
//! - Domain types for sessions and iterations
//! - A directory-backed JSON session store
//! - The iteration processor and its Anthropic Messages API client
//! - The HTTP API router
//! - Static HTML report rendering
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use longhaul_core::{AnthropicClient, Config, InteractionLog, IterationProcessor, SessionStore};
//!
//! # async fn run() -> longhaul_core::Result<()> {
//! let config = Config::load()?;
//! let store = SessionStore::open(&config.server.sessions_dir).await?;
//! let client = Arc::new(AnthropicClient::from_config(&config.llm)?);
//! let processor = IterationProcessor::new(
//!     store.clone(),
//!     client,
//!     InteractionLog::new(&config.server.interactions_dir),
//!     config.server.pacing(),
//! );
//!
//! let session_id = store.create("Map the failure modes of tidal turbines", 5).await?;
//! processor.process(&session_id).await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use interactions::InteractionLog;
pub use llm::{AnthropicClient, CompletionClient};
pub use processor::IterationProcessor;
pub use store::SessionStore;
pub use types::*;

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod interactions;
pub mod llm;
pub mod logging;
pub mod processor;
pub mod report;
pub mod store;
pub mod types;

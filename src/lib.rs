//! # Scholar Agent
//!
//! Multi-source literature discovery with ranked, citation-checked LLM
//! synthesis. Given a research question, Scholar Agent queries arXiv and
//! Crossref, merges duplicate records, ranks what remains and asks a language
//! model for a narrative whose every citation points into the bibliography.
//!
//! ## Overview
//!
//! Scholar Agent can be used in three ways:
//!
//! 1. **From the command line** - `scholar research "<question>"`
//! 2. **As an HTTP service** - `scholar serve`, then `POST /api/research`
//! 3. **As a library** - drive [`ResearchCoordinator`] directly
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use scholar::{ResearchCoordinator, ScholarConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScholarConfig::default();
//!     let coordinator = ResearchCoordinator::from_config(&config, Some("ollama")).await?;
//!
//!     let report = coordinator.research("protein structure prediction").await?;
//!     println!("{}", report.to_markdown());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Native Ollama client via `ollama-rs` (default) |
//!
//! ## Modules
//!
//! - [`research`] - The pipeline stages and their coordinator
//! - [`sources`] - arXiv and Crossref adapters
//! - [`llm`] - Language model clients and provider detection
//! - [`api`] - REST API handlers and routes
//! - [`cli`] - Command-line parsing and terminal output
//! - [`types`] - Records, reports and errors
//! - [`utils`] - TOML configuration

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface.
pub mod cli;
/// LLM provider clients and abstractions.
pub mod llm;
/// The literature pipeline.
pub mod research;
/// Academic metadata source adapters.
pub mod sources;
/// Core types (records, reports, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use llm::{Credentials, GenerationParams, LLMClient, Provider};
pub use research::coordinator::{ResearchCoordinator, ResearchOptions};
pub use sources::{SourceAdapter, SourceRegistry};
pub use types::{AppError, ResearchReport, Result};
pub use utils::toml_config::ScholarConfig;

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration, used to build per-request coordinators
    pub config: Arc<ScholarConfig>,
    /// Coordinator for requests without a provider override
    pub coordinator: Arc<ResearchCoordinator>,
}

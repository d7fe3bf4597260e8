//! LLM Provider Clients and Abstractions
//!
//! The synthesizer and the LLM query expander talk to a language model only
//! through the [`LLMClient`] trait. Concrete clients are created from a
//! [`Provider`], which is chosen once from configuration and credentials by
//! [`Provider::detect`].
//!
//! # Example
//!
//! ```ignore
//! use scholar::llm::{Credentials, GenerationParams, Provider};
//!
//! let credentials = Credentials::from_env(&config);
//! let provider = Provider::detect(&config.llm, &credentials)?;
//! let client = provider.create_client(&GenerationParams::from(&config.llm)).await?;
//! let text = client.generate_with_system("You are terse.", "Say hi").await?;
//! ```

/// Core LLM client trait and provider selection.
pub mod client;
/// OpenAI-compatible chat-completions client (OpenAI, Together).
pub mod openai;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use client::{Credentials, GenerationParams, LLMClient, Provider};

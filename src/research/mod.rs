//! Literature discovery and synthesis pipeline
//!
//! A research run turns one query into a cited report:
//!
//! 1. **Expansion** - [`expander`] derives search variants; the seed comes first
//! 2. **Aggregation** - [`aggregator`] fans every query out to every source
//!    concurrently and salvages partial failures
//! 3. **Deduplication** - [`dedup`] merges records describing the same work
//! 4. **Ranking** - [`ranker`] scores relevance and recency, assigns citation
//!    indices `1..=K`
//! 5. **Synthesis** - [`synthesizer`] asks the model for a narrative and
//!    rejects citations outside the bibliography
//!
//! [`coordinator::ResearchCoordinator`] drives the stages.
//!
//! # Usage
//!
//! ```ignore
//! use scholar::research::coordinator::ResearchCoordinator;
//!
//! let coordinator = ResearchCoordinator::from_config(&config, None).await?;
//! let report = coordinator.research("graph neural networks for drug discovery").await?;
//!
//! println!("{}", report.to_markdown());
//! ```

/// Retrieval fan-out across queries and sources.
pub mod aggregator;
/// Pipeline orchestration.
pub mod coordinator;
/// Cross-source deduplication.
pub mod dedup;
/// Query expansion strategies.
pub mod expander;
/// Relevance and recency ranking.
pub mod ranker;
/// Citation-checked synthesis.
pub mod synthesizer;
/// Title normalization and token helpers.
pub mod text;

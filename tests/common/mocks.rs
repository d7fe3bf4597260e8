//! Mock implementations for testing.
//!
//! This module provides mock LLM clients, search sources and a coordinator
//! builder that can be used across different test files without duplication.

#![allow(dead_code)]

use async_trait::async_trait;
use scholar::llm::LLMClient;
use scholar::research::coordinator::ResearchCoordinator;
use scholar::research::dedup::Deduplicator;
use scholar::research::expander::HeuristicExpander;
use scholar::research::ranker::Ranker;
use scholar::research::synthesizer::{Synthesizer, SynthesizerConfig};
use scholar::sources::{SourceAdapter, SourceRegistry};
use scholar::types::{AppError, PartialDate, RawRecord, Result, SourceError};
use scholar::utils::toml_config::PipelineConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock LLM client with scripted responses.
///
/// Replies are consumed in order; once the script runs out the last reply
/// repeats. Every prompt is recorded for later inspection.
pub struct MockLLMClient {
    script: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLLMClient {
    /// A client that always answers with `response`.
    pub fn new(response: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A client that always fails.
    pub fn failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A client that answers with `responses` in order, then repeats the last one.
    pub fn scripted(responses: Vec<Result<String>>) -> Self {
        let fallback = match responses.last() {
            Some(Ok(text)) => Some(text.clone()),
            _ => None,
        };
        Self {
            script: Mutex::new(responses.into()),
            fallback,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        self.fallback
            .clone()
            .ok_or_else(|| AppError::LLM("Mock LLM failure".to_string()))
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Source returning a fixed record list for every query.
pub struct StaticSource {
    pub id: String,
    pub records: Vec<RawRecord>,
    pub calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(id: &str, records: Vec<RawRecord>) -> Self {
        Self {
            id: id.to_string(),
            records,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> std::result::Result<Vec<RawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.iter().take(max_results).cloned().collect())
    }
}

/// Source that fails every call.
pub struct FailingSource {
    pub id: String,
    pub retryable: bool,
}

impl FailingSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            retryable: true,
        }
    }
}

#[async_trait]
impl SourceAdapter for FailingSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(
        &self,
        query: &str,
        _max_results: usize,
    ) -> std::result::Result<Vec<RawRecord>, SourceError> {
        Err(SourceError::new(&self.id, query, "HTTP 503 Service Unavailable", self.retryable))
    }
}

/// Source that answers after a delay.
pub struct SlowSource {
    pub inner: StaticSource,
    pub delay: Duration,
}

impl SlowSource {
    pub fn new(id: &str, records: Vec<RawRecord>, delay: Duration) -> Self {
        Self {
            inner: StaticSource::new(id, records),
            delay,
        }
    }
}

#[async_trait]
impl SourceAdapter for SlowSource {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Vec<RawRecord>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.search(query, max_results).await
    }
}

/// A record with a DOI, authors, abstract and year.
pub fn paper(source: &str, title: &str, doi: &str, year: i32) -> RawRecord {
    RawRecord::new(source, title)
        .with_authors([format!("{} Author", title.split(' ').next().unwrap_or("Anon"))])
        .with_abstract(format!("We study {}.", title.to_lowercase()))
        .with_date(PartialDate::year(year))
        .with_id("doi", doi)
}

pub fn pipeline_config(fanout: usize, top_k: usize) -> PipelineConfig {
    PipelineConfig {
        fanout,
        top_k,
        retry_pause_ms: 1,
        ..Default::default()
    }
}

/// Coordinator over the given sources with heuristic expansion and a fixed
/// ranking year.
pub fn coordinator(
    sources: Vec<Arc<dyn SourceAdapter>>,
    llm: Arc<dyn LLMClient>,
    config: PipelineConfig,
) -> ResearchCoordinator {
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry.register(source);
    }
    ResearchCoordinator::new(
        config.clone(),
        Arc::new(HeuristicExpander::new()),
        registry,
        Deduplicator::default(),
        Ranker::default().with_reference_year(2025),
        Synthesizer::new(llm, SynthesizerConfig::from(&config)),
    )
}

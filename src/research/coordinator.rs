use crate::{
    llm::{Credentials, GenerationParams, LLMClient, Provider},
    research::{
        aggregator::{aggregate, AggregateOptions},
        dedup::Deduplicator,
        expander::{HeuristicExpander, LlmExpander, QueryExpander},
        ranker::Ranker,
        synthesizer::{Synthesizer, SynthesizerConfig},
    },
    sources::SourceRegistry,
    types::{AppError, ReportCounts, ResearchReport, Result},
    utils::toml_config::{ExpansionMode, PipelineConfig, ScholarConfig},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-run overrides of the pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct ResearchOptions {
    pub top_k: Option<usize>,
    pub fanout: Option<usize>,
    /// Bound on the retrieval round
    pub deadline: Option<Duration>,
}

/// Runs expand → aggregate → dedup → rank → synthesize for one query.
pub struct ResearchCoordinator {
    config: PipelineConfig,
    expander: Arc<dyn QueryExpander>,
    sources: SourceRegistry,
    deduplicator: Deduplicator,
    ranker: Ranker,
    synthesizer: Synthesizer,
}

impl ResearchCoordinator {
    pub fn new(
        config: PipelineConfig,
        expander: Arc<dyn QueryExpander>,
        sources: SourceRegistry,
        deduplicator: Deduplicator,
        ranker: Ranker,
        synthesizer: Synthesizer,
    ) -> Self {
        Self {
            config,
            expander,
            sources,
            deduplicator,
            ranker,
            synthesizer,
        }
    }

    /// Wire every stage from configuration and the environment.
    ///
    /// `provider_override` takes precedence over both the configured and the
    /// environment-selected provider.
    pub async fn from_config(config: &ScholarConfig, provider_override: Option<&str>) -> Result<Self> {
        config.validate()?;

        let mut credentials = Credentials::from_env(config);
        if let Some(name) = provider_override {
            credentials.preferred = Some(name.to_string());
        }
        let provider = Provider::detect(&config.llm, &credentials)?;
        tracing::info!(provider = provider.name(), model = provider.model(), "Selected LLM provider");

        let client = provider
            .create_client(&GenerationParams::from(&config.llm))
            .await?;
        let llm: Arc<dyn LLMClient> = Arc::from(client);

        let expander: Arc<dyn QueryExpander> = match config.pipeline.expansion {
            ExpansionMode::Heuristic => Arc::new(HeuristicExpander::new()),
            ExpansionMode::Llm => Arc::new(LlmExpander::new(Arc::clone(&llm))),
        };

        let sources = SourceRegistry::from_config(&config.effective_sources())?;

        Ok(Self::new(
            config.pipeline.clone(),
            expander,
            sources,
            Deduplicator::new(config.dedup.clone()),
            Ranker::new(config.ranking.clone()),
            Synthesizer::new(llm, SynthesizerConfig::from(&config.pipeline)),
        ))
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.synthesizer.model_name()
    }

    /// Run the pipeline with configured defaults.
    pub async fn research(&self, query: &str) -> Result<ResearchReport> {
        self.research_with(query, ResearchOptions::default(), CancellationToken::new())
            .await
    }

    /// Run the pipeline. Cancelling `cancel` stops the retrieval round and
    /// continues with whatever was already retrieved.
    pub async fn research_with(
        &self,
        query: &str,
        options: ResearchOptions,
        cancel: CancellationToken,
    ) -> Result<ResearchReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("query must not be blank".to_string()));
        }

        let started = Instant::now();
        let top_k = options.top_k.unwrap_or(self.config.top_k);
        let fanout = options.fanout.unwrap_or(self.config.fanout);
        if fanout > self.config.max_fanout {
            return Err(AppError::InvalidInput(format!(
                "fanout {} exceeds the configured maximum of {}",
                fanout, self.config.max_fanout
            )));
        }

        tracing::info!(query = %query, fanout, top_k, expander = self.expander.name(), "Expanding query");
        let queries = self.expander.expand(query, fanout).await;
        tracing::debug!(?queries, "Expanded queries");

        let aggregate_options = AggregateOptions {
            per_query_cap: self.config.per_query_cap,
            call_timeout: Duration::from_secs(self.config.adapter_timeout_secs),
            deadline: options
                .deadline
                .or(self.config.aggregation_deadline_secs.map(Duration::from_secs)),
        };
        let outcome = aggregate(&queries, self.sources.adapters(), &aggregate_options, &cancel).await?;

        let records_seen = outcome.records.len();
        if records_seen == 0 {
            tracing::warn!(query = %query, "Sources answered but returned no records");
            return Err(AppError::NoUsableRecords {
                errors: outcome.errors,
            });
        }

        let entries = self.deduplicator.deduplicate(outcome.records);
        let canonical_entries = entries.len();
        if canonical_entries == 0 {
            tracing::warn!(records_seen, "No identifiable records after deduplication");
            return Err(AppError::NoUsableRecords {
                errors: outcome.errors,
            });
        }

        let ranked = self.ranker.rank(query, entries, top_k);
        let ranked_count = ranked.len();

        tracing::info!(entries = ranked_count, model = self.synthesizer.model_name(), "Synthesizing");
        let synthesis = match self.synthesizer.synthesize(query, ranked).await {
            Ok(synthesis) => synthesis,
            Err(AppError::SynthesisBackend {
                message,
                bibliography,
                ..
            }) => {
                return Err(AppError::SynthesisBackend {
                    message,
                    bibliography,
                    errors: outcome.errors,
                })
            }
            Err(e) => return Err(e),
        };
        let cited = synthesis.used_indices.len();

        let report = ResearchReport {
            id: Uuid::new_v4(),
            query: query.to_string(),
            generated_at: chrono::Utc::now(),
            expanded_queries: queries,
            counts: ReportCounts {
                records_seen,
                canonical_entries,
                ranked: ranked_count,
                cited,
            },
            synthesis,
            source_errors: outcome.errors,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            id = %report.id,
            records_seen,
            canonical_entries,
            ranked = ranked_count,
            cited,
            degraded = report.synthesis.status.is_degraded(),
            source_errors = report.source_errors.len(),
            duration_ms = report.duration_ms,
            "Research finished"
        );
        Ok(report)
    }
}

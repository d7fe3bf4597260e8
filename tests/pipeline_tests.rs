//! End-to-end pipeline tests over in-memory sources and a scripted model.

mod common;

use common::mocks::{coordinator, paper, pipeline_config, FailingSource, MockLLMClient, SlowSource, StaticSource};
use scholar::research::aggregator::CANCELLED_CAUSE;
use scholar::research::synthesizer::invalid_citations;
use scholar::sources::SourceAdapter;
use scholar::types::{AppError, DegradeReason, RawRecord, SynthesisStatus};
use scholar::ResearchOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn arxiv_records() -> Vec<RawRecord> {
    vec![
        paper("arxiv", "Graph neural networks for molecules", "10.1000/a1", 2021),
        paper("arxiv", "Message passing in chemistry", "10.1000/a2", 2019),
        paper("arxiv", "Equivariant transformers for proteins", "10.1000/shared", 2023),
        paper("arxiv", "Contrastive pretraining of molecular graphs", "10.1000/a4", 2022),
        paper("arxiv", "Benchmarking property prediction", "10.1000/a5", 2020),
    ]
}

fn crossref_records() -> Vec<RawRecord> {
    vec![
        paper("crossref", "Retrosynthesis planning with search", "10.2000/b1", 2018),
        paper("crossref", "Equivariant Transformers for Proteins", "10.1000/SHARED", 2023)
            .with_venue("Nature Methods"),
        paper("crossref", "Docking scores as weak labels", "10.2000/b3", 2017),
        paper("crossref", "Active learning for lead optimization", "10.2000/b4", 2024),
        paper("crossref", "Generative models of drug-like molecules", "10.2000/b5", 2022),
    ]
}

fn two_sources() -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(StaticSource::new("arxiv", arxiv_records())),
        Arc::new(StaticSource::new("crossref", crossref_records())),
    ]
}

#[tokio::test]
async fn test_two_sources_one_overlap_top_five() {
    let llm = Arc::new(MockLLMClient::new(
        "## Executive Summary\nGraph models dominate [1], [2-3]. Later work extends them [5].",
    ));
    let coordinator = coordinator(two_sources(), llm.clone(), pipeline_config(1, 5));

    let report = coordinator
        .research("graph neural networks for molecules")
        .await
        .unwrap();

    assert_eq!(report.counts.records_seen, 10);
    assert_eq!(report.counts.canonical_entries, 9);
    assert_eq!(report.counts.ranked, 5);
    assert_eq!(report.synthesis.bibliography.len(), 5);

    let indices: Vec<usize> = report
        .synthesis
        .bibliography
        .iter()
        .map(|r| r.citation_index)
        .collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);

    assert!(report.synthesis.used_indices.iter().all(|i| (1..=5).contains(i)));
    assert_eq!(report.synthesis.uncited_indices.iter().copied().collect::<Vec<_>>(), vec![4]);
    assert_eq!(report.synthesis.status, SynthesisStatus::Accepted);
    assert_eq!(report.counts.cited, 4);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_fanout_three_repeats_retrieval_but_not_entries() {
    let llm = Arc::new(MockLLMClient::new(
        "## Executive Summary\nGraph models dominate [1], [2-3]. Later work extends them [5].",
    ));
    let coordinator = coordinator(two_sources(), llm.clone(), pipeline_config(3, 5));

    let report = coordinator
        .research("graph neural networks for molecules")
        .await
        .unwrap();

    assert_eq!(
        report.expanded_queries,
        vec![
            "graph neural networks for molecules",
            "graph neural networks molecules",
            "graph neural networks",
        ]
    );
    assert_eq!(report.counts.records_seen, 10 * report.expanded_queries.len());
    assert_eq!(report.counts.canonical_entries, 9);
    assert_eq!(report.counts.ranked, 5);
    assert!(report.synthesis.used_indices.iter().all(|i| (1..=5).contains(i)));
    assert_eq!(report.synthesis.uncited_indices.iter().copied().collect::<Vec<_>>(), vec![4]);
    assert!(report.source_errors.is_empty());
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_shared_doi_merges_across_sources() {
    let llm = Arc::new(MockLLMClient::new("Summary [1]."));
    let coordinator = coordinator(two_sources(), llm, pipeline_config(1, 10));

    let report = coordinator.research("equivariant transformers proteins").await.unwrap();
    let merged = report
        .synthesis
        .bibliography
        .iter()
        .find(|r| r.entry.doi() == Some("10.1000/shared"))
        .expect("merged entry is ranked");

    assert_eq!(merged.citation_index, 1);
    assert_eq!(merged.entry.source_count, 2);
    assert_eq!(
        merged.entry.contributing_sources.iter().cloned().collect::<Vec<_>>(),
        vec!["arxiv".to_string(), "crossref".to_string()]
    );
    assert_eq!(merged.entry.venue.as_deref(), Some("Nature Methods"));
}

#[tokio::test]
async fn test_total_failure_skips_synthesis() {
    let llm = Arc::new(MockLLMClient::new("never used [1]"));
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(FailingSource::new("arxiv")),
        Arc::new(FailingSource::new("crossref")),
    ];
    let coordinator = coordinator(sources, llm.clone(), pipeline_config(2, 5));

    let err = coordinator
        .research("graph neural networks for molecules")
        .await
        .unwrap_err();

    match err {
        AppError::AggregationExhausted { errors } => {
            // Two queries against two sources.
            assert_eq!(errors.len(), 4);
            assert!(errors.iter().all(|e| e.retryable));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_partial_failure_is_reported() {
    let llm = Arc::new(MockLLMClient::new("Summary [1]."));
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(StaticSource::new("arxiv", arxiv_records())),
        Arc::new(FailingSource::new("crossref")),
    ];
    let coordinator = coordinator(sources, llm, pipeline_config(1, 5));

    let report = coordinator.research("message passing chemistry").await.unwrap();
    assert_eq!(report.counts.canonical_entries, 5);
    assert_eq!(report.source_errors.len(), 1);
    assert_eq!(report.source_errors[0].source_id, "crossref");
    assert!(report.to_markdown().contains("## Retrieval Issues"));
}

#[tokio::test]
async fn test_ranking_is_deterministic_across_runs() {
    let run = || async {
        let llm = Arc::new(MockLLMClient::new("Summary [1]."));
        coordinator(two_sources(), llm, pipeline_config(3, 7))
            .research("graph neural networks for molecules")
            .await
            .unwrap()
    };
    let first = run().await;
    let second = run().await;

    assert_eq!(first.expanded_queries, second.expanded_queries);
    assert_eq!(first.synthesis.bibliography, second.synthesis.bibliography);
}

#[tokio::test]
async fn test_seed_query_is_always_searched() {
    let llm = Arc::new(MockLLMClient::new("Summary [1]."));
    let coordinator = coordinator(two_sources(), llm, pipeline_config(3, 5));
    let query = "Graph neural networks for drug discovery";

    let report = coordinator.research(query).await.unwrap();
    assert_eq!(report.expanded_queries[0], query);
    assert!(report.expanded_queries.len() <= 3);
}

#[tokio::test]
async fn test_options_override_configuration() {
    let llm = Arc::new(MockLLMClient::new("Summary [1]."));
    let coordinator = coordinator(two_sources(), llm, pipeline_config(3, 10));

    let options = ResearchOptions {
        top_k: Some(2),
        fanout: Some(1),
        deadline: None,
    };
    let report = coordinator
        .research_with("graph neural networks", options, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.expanded_queries.len(), 1);
    assert_eq!(report.synthesis.bibliography.len(), 2);
}

#[tokio::test]
async fn test_invalid_citations_are_retried_then_stripped() {
    let llm = Arc::new(MockLLMClient::new("Strong evidence [1] and [42]."));
    let coordinator = coordinator(two_sources(), llm.clone(), pipeline_config(1, 3));

    let report = coordinator.research("molecules").await.unwrap();
    assert_eq!(llm.calls(), 3);
    assert_eq!(report.synthesis.narrative, "Strong evidence [1] and.");
    assert_eq!(
        report.synthesis.status,
        SynthesisStatus::Degraded {
            reason: DegradeReason::InvalidCitations { stripped: vec![42] }
        }
    );
    assert!(invalid_citations(&report.synthesis.narrative, 3).is_empty());

    let prompts = llm.prompts();
    assert!(prompts[1].contains("[42]"));
}

#[tokio::test]
async fn test_backend_outage_falls_back_to_summary() {
    let llm = Arc::new(MockLLMClient::failing());
    let coordinator = coordinator(two_sources(), llm.clone(), pipeline_config(1, 4));

    let report = coordinator.research("molecules").await.unwrap();
    assert_eq!(llm.calls(), 3);
    assert!(matches!(
        report.synthesis.status,
        SynthesisStatus::Degraded {
            reason: DegradeReason::BackendUnavailable { .. }
        }
    ));
    assert!(report.synthesis.model.is_none());
    assert!(invalid_citations(&report.synthesis.narrative, 4).is_empty());
    assert!(report.synthesis.uncited_indices.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_keeps_fast_results() {
    let llm = Arc::new(MockLLMClient::new("Summary [1]."));
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(StaticSource::new("arxiv", arxiv_records())),
        Arc::new(SlowSource::new("crossref", crossref_records(), Duration::from_secs(20))),
    ];
    let coordinator = coordinator(sources, llm, pipeline_config(1, 5));

    let options = ResearchOptions {
        deadline: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let report = coordinator
        .research_with("molecules", options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.counts.records_seen, 5);
    assert_eq!(report.source_errors.len(), 1);
    assert_eq!(report.source_errors[0].cause, CANCELLED_CAUSE);
}

#[tokio::test]
async fn test_blank_query_is_invalid_input() {
    let llm = Arc::new(MockLLMClient::new("x"));
    let coordinator = coordinator(two_sources(), llm, pipeline_config(1, 5));
    let err = coordinator.research("  \t ").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

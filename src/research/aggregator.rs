//! Concurrent retrieval across every (query, source) pair.
//!
//! One round issues the full cross product at once. Results land in a slot
//! per pair and are flattened in slot order, so the output never depends on
//! which provider answered first.

use crate::sources::SourceAdapter;
use crate::types::{AppError, RawRecord, Result, SourceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Cause attached to calls that were still running when the round stopped.
pub const CANCELLED_CAUSE: &str = "cancelled before completion";

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Records requested from each source per query
    pub per_query_cap: usize,
    /// Bound on every individual call
    pub call_timeout: Duration,
    /// Optional bound on the whole round
    pub deadline: Option<Duration>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            per_query_cap: 25,
            call_timeout: Duration::from_secs(30),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregationOutcome {
    /// Ordered by query index, then source index, then provider order
    pub records: Vec<RawRecord>,
    pub errors: Vec<SourceError>,
    pub calls: usize,
    pub succeeded: usize,
    /// Whether the round was stopped by cancellation or deadline
    pub cancelled: bool,
}

type Slot = Option<std::result::Result<Vec<RawRecord>, SourceError>>;

/// Run one retrieval round.
///
/// Fails with [`AppError::AggregationExhausted`] when no call succeeded,
/// including the degenerate case of zero calls.
pub async fn aggregate(
    queries: &[String],
    adapters: &[Arc<dyn SourceAdapter>],
    options: &AggregateOptions,
    cancel: &CancellationToken,
) -> Result<AggregationOutcome> {
    let n_adapters = adapters.len();
    let calls = queries.len() * n_adapters;
    let mut slots: Vec<Slot> = vec![None; calls];

    tracing::info!(
        queries = queries.len(),
        sources = n_adapters,
        calls,
        "Starting retrieval round"
    );

    let mut set = JoinSet::new();
    for (qi, query) in queries.iter().enumerate() {
        for (ai, adapter) in adapters.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let query = query.clone();
            let cap = options.per_query_cap;
            let call_timeout = options.call_timeout;

            set.spawn(async move {
                let source_id = adapter.id().to_string();
                let result = match tokio::time::timeout(call_timeout, adapter.search(&query, cap))
                    .await
                {
                    Ok(Ok(records)) => Ok(stamp(records, &source_id)),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(SourceError::new(
                        &source_id,
                        &query,
                        format!("timed out after {:?}", call_timeout),
                        true,
                    )),
                };
                (qi * n_adapters + ai, result)
            });
        }
    }

    let deadline = async {
        match options.deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut cancelled = false;
    loop {
        tokio::select! {
            joined = set.join_next() => match joined {
                Some(Ok((slot, result))) => slots[slot] = Some(result),
                Some(Err(e)) => tracing::warn!(error = %e, "Source call task failed"),
                None => break,
            },
            _ = cancel.cancelled() => {
                tracing::warn!("Retrieval round cancelled");
                cancelled = true;
                break;
            }
            _ = &mut deadline => {
                tracing::warn!(deadline = ?options.deadline, "Retrieval round deadline reached");
                cancelled = true;
                break;
            }
        }
    }
    set.abort_all();

    let mut outcome = AggregationOutcome {
        calls,
        cancelled,
        ..Default::default()
    };

    for (index, slot) in slots.into_iter().enumerate() {
        let query = &queries[index / n_adapters];
        let source_id = adapters[index % n_adapters].id();
        match slot {
            Some(Ok(records)) => {
                tracing::debug!(
                    source = source_id,
                    query = %query,
                    count = records.len(),
                    "Source call succeeded"
                );
                outcome.succeeded += 1;
                outcome.records.extend(records);
            }
            Some(Err(err)) => {
                tracing::warn!(
                    source = %err.source_id,
                    query = %err.query,
                    cause = %err.cause,
                    "Source call failed"
                );
                outcome.errors.push(err);
            }
            None => {
                let cause = if cancelled {
                    CANCELLED_CAUSE
                } else {
                    "call did not complete"
                };
                outcome
                    .errors
                    .push(SourceError::new(source_id, query, cause, true));
            }
        }
    }

    tracing::info!(
        succeeded = outcome.succeeded,
        failed = outcome.errors.len(),
        records = outcome.records.len(),
        "Retrieval round finished"
    );

    if outcome.succeeded == 0 {
        return Err(AppError::AggregationExhausted {
            errors: outcome.errors,
        });
    }
    Ok(outcome)
}

/// Adapters own their id; make sure every record carries it.
fn stamp(mut records: Vec<RawRecord>, source_id: &str) -> Vec<RawRecord> {
    for record in &mut records {
        if record.source_id != source_id {
            record.source_id = source_id.to_string();
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed {
        id: &'static str,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn id(&self) -> &str {
            self.id
        }

        async fn search(
            &self,
            query: &str,
            _max: usize,
        ) -> std::result::Result<Vec<RawRecord>, SourceError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(SourceError::new(self.id, query, "HTTP 503", true));
            }
            Ok(vec![
                RawRecord::new(self.id, format!("{} {} a", self.id, query)),
                RawRecord::new(self.id, format!("{} {} b", self.id, query)),
            ])
        }
    }

    fn adapter(id: &'static str, delay_ms: u64, fail: bool) -> Arc<dyn SourceAdapter> {
        Arc::new(Fixed {
            id,
            delay: Duration::from_millis(delay_ms),
            fail,
        })
    }

    fn queries(qs: &[&str]) -> Vec<String> {
        qs.iter().map(|q| q.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_order_independent_of_completion() {
        // The slower source is registered first; its records still come first.
        let adapters = vec![adapter("slow", 50, false), adapter("fast", 1, false)];
        let outcome = aggregate(
            &queries(&["q1", "q2"]),
            &adapters,
            &AggregateOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let titles: Vec<&str> = outcome.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "slow q1 a", "slow q1 b", "fast q1 a", "fast q1 b", "slow q2 a", "slow q2 b",
                "fast q2 a", "fast q2 b",
            ]
        );
        assert_eq!(outcome.calls, 4);
        assert_eq!(outcome.succeeded, 4);
        assert!(!outcome.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_keeps_successes() {
        let adapters = vec![adapter("down", 1, true), adapter("up", 1, false)];
        let outcome = aggregate(
            &queries(&["q"]),
            &adapters,
            &AggregateOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].source_id, "down");
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_is_exhausted() {
        let adapters = vec![adapter("a", 1, true), adapter("b", 1, true)];
        let err = aggregate(
            &queries(&["q1", "q2"]),
            &adapters,
            &AggregateOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        match err {
            AppError::AggregationExhausted { errors } => assert_eq!(errors.len(), 4),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_calls_is_exhausted() {
        let err = aggregate(
            &queries(&["q"]),
            &[],
            &AggregateOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::AggregationExhausted { errors } if errors.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_timeout_is_retryable_error() {
        let adapters = vec![adapter("hung", 60_000, false), adapter("ok", 1, false)];
        let options = AggregateOptions {
            call_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let outcome = aggregate(&queries(&["q"]), &adapters, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].retryable);
        assert!(outcome.errors[0].cause.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_salvages_completed_calls() {
        let adapters = vec![adapter("quick", 10, false), adapter("slow", 10_000, false)];
        let options = AggregateOptions {
            deadline: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let outcome = aggregate(&queries(&["q"]), &adapters, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].source_id, "slow");
        assert_eq!(outcome.errors[0].cause, CANCELLED_CAUSE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_before_any_result() {
        let adapters = vec![adapter("slow", 10_000, false)];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = aggregate(&queries(&["q"]), &adapters, &AggregateOptions::default(), &cancel)
            .await
            .unwrap_err();
        match err {
            AppError::AggregationExhausted { errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].cause, CANCELLED_CAUSE);
            }
            other => panic!("unexpected error {other}"),
        }
    }
}

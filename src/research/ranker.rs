//! Relevance and recency scoring.
//!
//! `score = relevance_weight * relevance + recency_weight * recency`, where
//! relevance saturates with the number of query terms found in the title and
//! abstract, and recency is the publication year's position between a floor
//! year and next year. No I/O is involved, so ranking is deterministic for a
//! fixed reference year.

use crate::research::text::{content_terms, tokenize};
use crate::types::{CanonicalEntry, RankedEntry};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,

    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    /// Saturation rate of the relevance curve
    #[serde(default = "default_relevance_decay")]
    pub relevance_decay: f64,

    #[serde(default = "default_title_match_weight")]
    pub title_match_weight: f64,

    #[serde(default = "default_abstract_match_weight")]
    pub abstract_match_weight: f64,

    /// Publications from this year or earlier get zero recency
    #[serde(default = "default_recency_floor_year")]
    pub recency_floor_year: i32,

    /// Recency assigned when the publication date is unknown
    #[serde(default = "default_unknown_date_recency")]
    pub unknown_date_recency: f64,
}

fn default_relevance_weight() -> f64 {
    0.75
}

fn default_recency_weight() -> f64 {
    0.25
}

fn default_relevance_decay() -> f64 {
    0.3
}

fn default_title_match_weight() -> f64 {
    2.0
}

fn default_abstract_match_weight() -> f64 {
    1.0
}

fn default_recency_floor_year() -> i32 {
    1990
}

fn default_unknown_date_recency() -> f64 {
    0.05
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            relevance_weight: default_relevance_weight(),
            recency_weight: default_recency_weight(),
            relevance_decay: default_relevance_decay(),
            title_match_weight: default_title_match_weight(),
            abstract_match_weight: default_abstract_match_weight(),
            recency_floor_year: default_recency_floor_year(),
            unknown_date_recency: default_unknown_date_recency(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ranker {
    config: RankingConfig,
    reference_year: i32,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(RankingConfig::default())
    }
}

impl Ranker {
    /// Ranker anchored at the current calendar year.
    pub fn new(config: RankingConfig) -> Self {
        Self {
            config,
            reference_year: chrono::Utc::now().year(),
        }
    }

    /// Pin the year that counts as "now".
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    /// Score, order and truncate; citation indices run 1..=K in final order.
    pub fn rank(&self, query: &str, entries: Vec<CanonicalEntry>, top_k: usize) -> Vec<RankedEntry> {
        let terms = content_terms(query);

        let mut scored: Vec<(usize, f64, CanonicalEntry)> = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let score = self.score(&terms, &entry);
                (i, score, entry)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.2.source_count.cmp(&a.2.source_count))
                .then_with(|| a.0.cmp(&b.0))
        });

        let k = top_k.min(scored.len());
        let ranked: Vec<RankedEntry> = scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(pos, (_, score, entry))| RankedEntry {
                citation_index: pos + 1,
                score,
                entry,
            })
            .collect();

        tracing::info!(
            top_k,
            ranked = ranked.len(),
            best = ?ranked.first().map(|r| r.score),
            "Ranking finished"
        );
        ranked
    }

    /// Combined score of one entry for the given query terms.
    pub fn score(&self, terms: &BTreeSet<String>, entry: &CanonicalEntry) -> f64 {
        self.config.relevance_weight * self.relevance(terms, entry)
            + self.config.recency_weight * self.recency(entry)
    }

    /// `1 - exp(-decay * weighted_overlap)`, in `[0, 1)`.
    pub fn relevance(&self, terms: &BTreeSet<String>, entry: &CanonicalEntry) -> f64 {
        let title = tokenize(&entry.title);
        let abstract_tokens = entry
            .abstract_text
            .as_deref()
            .map(tokenize)
            .unwrap_or_default();

        let title_hits = terms.intersection(&title).count() as f64;
        let abstract_hits = terms.intersection(&abstract_tokens).count() as f64;
        let overlap = self.config.title_match_weight * title_hits
            + self.config.abstract_match_weight * abstract_hits;

        1.0 - (-self.config.relevance_decay * overlap).exp()
    }

    /// Position of the publication year in `[floor, reference_year + 1]`.
    pub fn recency(&self, entry: &CanonicalEntry) -> f64 {
        let Some(date) = entry.published_at else {
            return self.config.unknown_date_recency;
        };
        let floor = self.config.recency_floor_year as f64;
        let ceiling = (self.reference_year + 1) as f64;
        if ceiling <= floor {
            return self.config.unknown_date_recency;
        }
        ((date.fractional_year() - floor) / (ceiling - floor)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartialDate;
    use std::collections::BTreeMap;

    fn entry(title: &str, abstract_text: Option<&str>, year: Option<i32>) -> CanonicalEntry {
        CanonicalEntry {
            title: title.to_string(),
            authors: vec![],
            abstract_text: abstract_text.map(str::to_string),
            published_at: year.map(PartialDate::year),
            external_ids: BTreeMap::new(),
            url: None,
            venue: None,
            source_count: 1,
            contributing_sources: BTreeSet::new(),
        }
    }

    fn ranker() -> Ranker {
        Ranker::default().with_reference_year(2024)
    }

    #[test]
    fn test_relevance_monotonic_in_overlap() {
        let r = ranker();
        let terms = content_terms("graph neural networks chemistry");
        let none = r.relevance(&terms, &entry("Cooking pasta", None, None));
        let one = r.relevance(&terms, &entry("Graph theory", None, None));
        let two = r.relevance(&terms, &entry("Graph networks", None, None));
        let two_plus_abstract = r.relevance(
            &terms,
            &entry("Graph networks", Some("applied to chemistry"), None),
        );
        assert_eq!(none, 0.0);
        assert!(none < one && one < two && two < two_plus_abstract);
        assert!(two_plus_abstract < 1.0);
    }

    #[test]
    fn test_recency_ordering_and_unknown() {
        let r = ranker();
        let old = r.recency(&entry("a", None, Some(1995)));
        let new = r.recency(&entry("a", None, Some(2023)));
        let unknown = r.recency(&entry("a", None, None));
        assert!(old < new);
        assert!(unknown > 0.0);
        assert!(unknown < new);
        assert_eq!(r.recency(&entry("a", None, Some(1900))), 0.0);
        assert!(r.recency(&entry("a", None, Some(2030))) <= 1.0);
    }

    #[test]
    fn test_rank_assigns_contiguous_indices() {
        let entries = vec![
            entry("unrelated", None, Some(2000)),
            entry("transformers for protein folding", None, Some(2021)),
            entry("protein folding", None, Some(2010)),
        ];
        let ranked = ranker().rank("protein folding transformers", entries, 10);
        let indices: Vec<usize> = ranked.iter().map(|r| r.citation_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(ranked[0].entry.title, "transformers for protein folding");
        assert_eq!(ranked[2].entry.title, "unrelated");
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_rank_clamps_top_k() {
        let entries = vec![entry("a", None, None), entry("b", None, None)];
        assert_eq!(ranker().rank("q", entries.clone(), 0).len(), 0);
        assert_eq!(ranker().rank("q", entries, 50).len(), 2);
    }

    #[test]
    fn test_ties_broken_by_source_count_then_input_order() {
        let mut corroborated = entry("same", None, Some(2020));
        corroborated.source_count = 3;
        corroborated.title = "same b".into();
        let first = entry("same a", None, Some(2020));
        let second = entry("same c", None, Some(2020));

        let ranked = ranker().rank("unmatched", vec![first, corroborated, second], 3);
        let titles: Vec<&str> = ranked.iter().map(|r| r.entry.title.as_str()).collect();
        assert_eq!(titles, vec!["same b", "same a", "same c"]);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let make = || {
            (0..20)
                .map(|i| entry(&format!("paper {}", i % 4), None, Some(2000 + i % 5)))
                .collect::<Vec<_>>()
        };
        let a = ranker().rank("paper", make(), 10);
        let b = ranker().rank("paper", make(), 10);
        assert_eq!(a, b);
    }
}

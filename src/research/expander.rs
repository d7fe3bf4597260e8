//! Query expansion: derive search variants from a seed query.
//!
//! Every expander returns the seed verbatim at index 0, followed by distinct
//! variants, never more than `max(fanout, 1)` queries in total.

use crate::llm::LLMClient;
use crate::research::text::{collapse_whitespace, is_stopword, normalize_title};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Words that separate sub-topics of a compound query.
const CONNECTIVES: &[&str] = &["and", "for", "in", "using", "versus", "via", "vs", "with"];

/// Phrase substitutions, applied on word boundaries of the normalized query.
const SYNONYMS: &[(&str, &str)] = &[
    ("llm", "large language model"),
    ("llms", "large language models"),
    ("large language model", "llm"),
    ("large language models", "llms"),
    ("gnn", "graph neural network"),
    ("gnns", "graph neural networks"),
    ("graph neural network", "gnn"),
    ("graph neural networks", "gnns"),
    ("nlp", "natural language processing"),
    ("natural language processing", "nlp"),
    ("ai", "artificial intelligence"),
    ("artificial intelligence", "ai"),
    ("ml", "machine learning"),
    ("machine learning", "ml"),
    ("rl", "reinforcement learning"),
    ("reinforcement learning", "rl"),
    ("neural network", "deep learning"),
    ("neural networks", "deep learning"),
    ("deep learning", "neural networks"),
    ("survey", "review"),
    ("review", "survey"),
    ("prediction", "forecasting"),
    ("forecasting", "prediction"),
    ("detection", "identification"),
    ("method", "approach"),
    ("methods", "approaches"),
    ("drug discovery", "drug design"),
    ("climate change", "global warming"),
];

#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Short label for logs and reports.
    fn name(&self) -> &str;

    /// Produce up to `fanout` queries; element 0 is always `query` itself.
    async fn expand(&self, query: &str, fanout: usize) -> Vec<String>;
}

/// Seed first, then candidates that are non-empty and distinct after
/// normalization, capped at `max(fanout, 1)`.
pub fn finalize<I>(seed: &str, candidates: I, fanout: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let limit = fanout.max(1);
    let mut out = vec![seed.to_string()];
    let mut seen: HashSet<String> = HashSet::from([normalize_title(seed)]);

    for candidate in candidates {
        if out.len() >= limit {
            break;
        }
        let candidate = collapse_whitespace(&candidate);
        let key = normalize_title(&candidate);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        out.push(candidate);
    }
    out
}

/// Deterministic rule-based expansion.
#[derive(Debug, Clone, Default)]
pub struct HeuristicExpander;

impl HeuristicExpander {
    pub fn new() -> Self {
        Self
    }

    /// All candidate variants in priority order, before deduplication.
    pub fn candidates(&self, query: &str) -> Vec<String> {
        let normalized = normalize_title(query);
        let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

        let mut out = Vec::new();

        let keywords: Vec<&str> = words.iter().copied().filter(|w| !is_stopword(w)).collect();
        if !keywords.is_empty() && keywords.len() < words.len() {
            out.push(keywords.join(" "));
        }

        out.extend(sub_topics(&words));
        out.extend(synonym_variants(&normalized));
        out
    }
}

/// Groups of words between connectives, when the query has more than one.
fn sub_topics(words: &[&str]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in words {
        if CONNECTIVES.contains(word) {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(word);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    if parts.len() < 2 {
        return Vec::new();
    }
    parts
        .into_iter()
        .filter(|p| p.iter().any(|w| !is_stopword(w)))
        .map(|p| p.join(" "))
        .collect()
}

fn synonym_variants(normalized: &str) -> Vec<String> {
    let padded = format!(" {} ", normalized);
    SYNONYMS
        .iter()
        .filter_map(|(from, to)| {
            let needle = format!(" {} ", from);
            padded
                .contains(&needle)
                .then(|| padded.replace(&needle, &format!(" {} ", to)).trim().to_string())
        })
        .collect()
}

#[async_trait]
impl QueryExpander for HeuristicExpander {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn expand(&self, query: &str, fanout: usize) -> Vec<String> {
        finalize(query, self.candidates(query), fanout)
    }
}

/// Asks the language model for alternative phrasings.
///
/// Falls back to [`HeuristicExpander`] when the backend fails or the reply
/// contains no usable lines.
pub struct LlmExpander {
    llm: Arc<dyn LLMClient>,
    fallback: HeuristicExpander,
}

impl LlmExpander {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self {
            llm,
            fallback: HeuristicExpander::new(),
        }
    }

    fn prompt(query: &str, wanted: usize) -> String {
        format!(
            "Rewrite the following research question as {} alternative search queries \
             for academic databases such as arXiv and Crossref. Use different terminology, \
             synonyms or narrower sub-topics. Return only the queries, one per line.\n\n\
             Question: {}",
            wanted, query
        )
    }
}

/// Strip numbering, bullets and quotes from one line of model output.
pub fn clean_line(line: &str) -> String {
    let trimmed = line
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['.', ')', '-', '*', '•', ':'])
        .trim();
    trimmed
        .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '“' || c == '”')
        .trim()
        .to_string()
}

#[async_trait]
impl QueryExpander for LlmExpander {
    fn name(&self) -> &str {
        "llm"
    }

    async fn expand(&self, query: &str, fanout: usize) -> Vec<String> {
        if fanout <= 1 {
            return vec![query.to_string()];
        }

        let response = match self.llm.generate(&Self::prompt(query, fanout - 1)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Query expansion failed, using heuristics");
                return self.fallback.expand(query, fanout).await;
            }
        };

        let variants: Vec<String> = response
            .lines()
            .map(clean_line)
            .filter(|l| !l.is_empty() && !l.ends_with(':'))
            .collect();

        let expanded = finalize(query, variants, fanout);
        if expanded.len() == 1 {
            tracing::warn!("Model returned no usable query variants, using heuristics");
            return self.fallback.expand(query, fanout).await;
        }
        expanded
    }
}

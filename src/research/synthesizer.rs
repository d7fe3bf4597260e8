//! Citation-checked narrative synthesis.
//!
//! The model sees a numbered list of the ranked entries and must cite them
//! with bracketed markers. Every reply is validated against the list; a reply
//! citing numbers outside it is retried with corrective feedback. When the
//! retry budget runs out the synthesizer degrades instead of failing:
//!
//! 1. a narrative exists but kept citing out of range: invalid numbers are
//!    stripped from its markers;
//! 2. the backend never produced a narrative: a deterministic summary is
//!    assembled from the abstracts;
//! 3. the backend never produced a narrative and there is nothing to
//!    summarize: [`AppError::SynthesisBackend`].

use crate::llm::LLMClient;
use crate::research::text::truncate_chars;
use crate::types::{
    AppError, DegradeReason, RankedEntry, Result, SynthesisResult, SynthesisStatus,
};
use crate::utils::toml_config::PipelineConfig;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a careful research assistant. Follow instructions exactly. \
Do not fabricate citations. Keep the tone formal and academic.";

const SECTIONS: &[&str] = &[
    "Executive Summary",
    "Background & Related Work",
    "Key Findings & Themes",
    "Cross-Disciplinary Insights",
    "Limitations & Risks",
    "Open Questions",
    "Future Directions",
];

static MARKER: OnceLock<Regex> = OnceLock::new();

/// `[3]`, `[1, 4]`, `[2-4]`, `[1, 3–5]`
fn marker_pattern() -> &'static Regex {
    MARKER.get_or_init(|| {
        Regex::new(r"\[(\d+(?:\s*[-–]\s*\d+)?(?:\s*,\s*\d+(?:\s*[-–]\s*\d+)?)*)\]")
            .expect("citation marker pattern is valid")
    })
}

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Retries after the first model call
    pub max_retries: u32,
    pub abstract_snippet_chars: usize,
    /// Pause before retrying a backend failure
    pub retry_pause: Duration,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            abstract_snippet_chars: 600,
            retry_pause: Duration::from_millis(500),
        }
    }
}

impl From<&PipelineConfig> for SynthesizerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.model_retry_limit,
            abstract_snippet_chars: config.abstract_snippet_chars,
            retry_pause: Duration::from_millis(config.retry_pause_ms),
        }
    }
}

/// One comma-separated part of a marker, as an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CitedRange {
    start: usize,
    end: usize,
}

impl CitedRange {
    fn is_valid(&self, max: usize) -> bool {
        self.start >= 1 && self.end <= max && self.start <= self.end
    }

    fn render(&self) -> String {
        if self.start == self.end {
            self.start.to_string()
        } else {
            format!("{}-{}", self.start, self.end)
        }
    }
}

fn parse_number(raw: &str) -> usize {
    raw.trim().parse().unwrap_or(usize::MAX)
}

fn parse_marker(inner: &str) -> Vec<CitedRange> {
    inner
        .split(',')
        .map(|part| match part.split_once(['-', '–']) {
            Some((a, b)) => {
                let (a, b) = (parse_number(a), parse_number(b));
                CitedRange {
                    start: a.min(b),
                    end: a.max(b),
                }
            }
            None => {
                let n = parse_number(part);
                CitedRange { start: n, end: n }
            }
        })
        .collect()
}

/// Citation numbers outside `[1, max]`, sorted and distinct.
pub fn invalid_citations(text: &str, max: usize) -> Vec<usize> {
    let mut invalid = BTreeSet::new();
    for caps in marker_pattern().captures_iter(text) {
        for range in parse_marker(&caps[1]) {
            for endpoint in [range.start, range.end] {
                if endpoint == 0 || endpoint > max {
                    invalid.insert(endpoint);
                }
            }
        }
    }
    invalid.into_iter().collect()
}

/// Citation numbers within `[1, max]` that the text references.
pub fn cited_indices(text: &str, max: usize) -> BTreeSet<usize> {
    let mut used = BTreeSet::new();
    for caps in marker_pattern().captures_iter(text) {
        for range in parse_marker(&caps[1]) {
            if range.is_valid(max) {
                used.extend(range.start..=range.end);
            }
        }
    }
    used
}

/// Remove out-of-range numbers from every marker, dropping markers that end
/// up empty along with the space before them.
pub fn strip_invalid_citations(text: &str, max: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in marker_pattern().captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        let kept: Vec<String> = parse_marker(&caps[1])
            .into_iter()
            .filter(|r| r.is_valid(max))
            .map(|r| r.render())
            .collect();
        if kept.is_empty() {
            while out.ends_with(' ') {
                out.pop();
            }
        } else {
            out.push('[');
            out.push_str(&kept.join(", "));
            out.push(']');
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

pub struct Synthesizer {
    llm: Arc<dyn LLMClient>,
    config: SynthesizerConfig,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LLMClient>, config: SynthesizerConfig) -> Self {
        Self { llm, config }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Produce a narrative whose every citation points into `ranked`.
    pub async fn synthesize(&self, query: &str, ranked: Vec<RankedEntry>) -> Result<SynthesisResult> {
        let max = ranked.len();
        let total_attempts = self.config.max_retries + 1;
        let mut feedback: Option<String> = None;
        let mut last_invalid: Option<String> = None;
        let mut last_backend_error: Option<String> = None;
        let mut attempts = 0;

        while attempts < total_attempts {
            attempts += 1;
            tracing::debug!(state = "prompting", attempt = attempts, "Synthesis");
            let prompt = self.build_prompt(query, &ranked, feedback.as_deref());

            tracing::info!(state = "model_call", attempt = attempts, model = self.llm.model_name(), "Synthesis");
            let text = match self.llm.generate_with_system(SYSTEM_PROMPT, &prompt).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    self.backend_failed(&mut last_backend_error, "model returned empty output", attempts, total_attempts)
                        .await;
                    continue;
                }
                Err(e) => {
                    self.backend_failed(&mut last_backend_error, &e.to_string(), attempts, total_attempts)
                        .await;
                    continue;
                }
            };

            tracing::debug!(state = "validating", attempt = attempts, "Synthesis");
            let invalid = invalid_citations(&text, max);
            if invalid.is_empty() {
                tracing::info!(state = "accepted", attempt = attempts, "Synthesis");
                return Ok(self.finish(text, ranked, SynthesisStatus::Accepted, attempts, true));
            }

            tracing::warn!(state = "retry", attempt = attempts, ?invalid, "Narrative cites unknown sources");
            feedback = Some(format!(
                "Your previous answer cited {}, which do not exist. Only cite numbers between 1 and {}. \
                 Rewrite the complete report.",
                invalid
                    .iter()
                    .map(|n| format!("[{}]", n))
                    .collect::<Vec<_>>()
                    .join(", "),
                max
            ));
            last_invalid = Some(text);
        }

        if let Some(text) = last_invalid {
            let stripped = invalid_citations(&text, max);
            tracing::warn!(state = "degraded", ?stripped, "Stripping invalid citations");
            let narrative = strip_invalid_citations(&text, max);
            let status = SynthesisStatus::Degraded {
                reason: DegradeReason::InvalidCitations { stripped },
            };
            return Ok(self.finish(narrative, ranked, status, attempts, true));
        }

        let message = last_backend_error.unwrap_or_else(|| "no model output".to_string());
        if ranked.is_empty() {
            tracing::error!(state = "failed", %message, "Synthesis backend unavailable and nothing to summarize");
            return Err(AppError::SynthesisBackend {
                message,
                bibliography: ranked,
                errors: Vec::new(),
            });
        }

        tracing::warn!(state = "degraded", %message, "Using abstract-based fallback summary");
        let narrative = fallback_summary(query, &ranked, self.config.abstract_snippet_chars);
        let status = SynthesisStatus::Degraded {
            reason: DegradeReason::BackendUnavailable { message },
        };
        Ok(self.finish(narrative, ranked, status, attempts, false))
    }

    async fn backend_failed(&self, last: &mut Option<String>, message: &str, attempt: u32, total: u32) {
        tracing::warn!(state = "retry", attempt, error = message, "Synthesis backend call failed");
        *last = Some(message.to_string());
        if attempt < total {
            tokio::time::sleep(self.config.retry_pause).await;
        }
    }

    fn finish(
        &self,
        narrative: String,
        bibliography: Vec<RankedEntry>,
        status: SynthesisStatus,
        attempts: u32,
        from_model: bool,
    ) -> SynthesisResult {
        let max = bibliography.len();
        let used_indices = cited_indices(&narrative, max);
        let uncited_indices: BTreeSet<usize> = (1..=max).filter(|i| !used_indices.contains(i)).collect();
        if !uncited_indices.is_empty() {
            tracing::info!(uncited = ?uncited_indices, "Bibliography entries not cited in narrative");
        }
        SynthesisResult {
            narrative,
            used_indices,
            uncited_indices,
            bibliography,
            status,
            attempts,
            model: from_model.then(|| self.llm.model_name().to_string()),
        }
    }

    fn build_prompt(&self, query: &str, ranked: &[RankedEntry], feedback: Option<&str>) -> String {
        let sources = if ranked.is_empty() {
            "(no sources were retrieved)".to_string()
        } else {
            ranked
                .iter()
                .map(|r| self.source_block(r))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut prompt = format!(
            "Research question: {query}\n\n\
             Sources:\n{sources}\n\n\
             Write a rigorous, well-structured academic report that synthesizes findings across these sources. \
             Use inline numeric citations like [1] or [2, 3] whenever you state a claim or refer to a paper. \
             Only cite numbers from the source list above (1 to {max}); never invent sources. \
             If evidence is limited, say so explicitly.\n\
             Required sections: {sections}.\n\
             Do not add a reference list; it is appended automatically. Write 800-1200 words.",
            query = query,
            sources = sources,
            max = ranked.len(),
            sections = SECTIONS.join("; "),
        );
        if let Some(feedback) = feedback {
            prompt.push_str("\n\nIMPORTANT: ");
            prompt.push_str(feedback);
        }
        prompt
    }

    fn source_block(&self, ranked: &RankedEntry) -> String {
        let entry = &ranked.entry;
        let mut block = format!(
            "[{}] {} — {} ({}); DOI: {}; Venue: {}",
            ranked.citation_index,
            entry.title,
            entry.author_line(),
            entry.year_label(),
            entry.doi().unwrap_or("n/a"),
            entry.venue.as_deref().unwrap_or("n/a"),
        );
        if let Some(abstract_text) = entry.abstract_text.as_deref() {
            block.push_str("\n    Abstract: ");
            block.push_str(&truncate_chars(abstract_text, self.config.abstract_snippet_chars));
        }
        block
    }
}

/// Report assembled from metadata and abstracts alone. Cites only indices
/// present in `ranked`.
pub fn fallback_summary(query: &str, ranked: &[RankedEntry], snippet_chars: usize) -> String {
    let mut out = format!("# {}\n\n", unbracket(query.trim()));

    out.push_str("## Executive Summary\n\n");
    let span = match ranked.len() {
        1 => "[1]".to_string(),
        n => format!("[1-{}]", n),
    };
    out.push_str(&format!(
        "This summary was assembled directly from the metadata and abstracts of the {} highest-ranked sources {} \
         because the language model was unavailable. It lists the evidence without interpreting it.\n\n",
        ranked.len(),
        span
    ));

    out.push_str("## Background & Related Work\n\n");
    for r in ranked {
        let e = &r.entry;
        let snippet = e
            .abstract_text
            .as_deref()
            .map(|a| unbracket(&truncate_chars(a.trim(), snippet_chars)))
            .unwrap_or_else(|| "No abstract available.".to_string());
        out.push_str(&format!(
            "- **{}** ({}, {}) [{}]: {}\n",
            unbracket(&e.title),
            unbracket(&e.author_line()),
            e.year_label(),
            r.citation_index,
            snippet
        ));
    }

    out.push_str("\n## Key Findings & Themes\n\n");
    for r in ranked.iter().take(5) {
        let sources = r
            .entry
            .contributing_sources
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "- {} [{}], reported by {}.\n",
            unbracket(&r.entry.title),
            r.citation_index,
            sources
        ));
    }

    out.push_str("\n## Limitations & Risks\n\n");
    out.push_str(
        "- Generated without a language model; methodological nuance in the full texts is not reflected.\n",
    );
    strip_invalid_citations(&out, ranked.len())
}

/// Source text quoted into a narrative must not read as a citation marker.
fn unbracket(text: &str) -> String {
    text.replace('[', "(").replace(']', ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::MockLLMClient;
    use crate::types::CanonicalEntry;
    use mockall::Sequence;
    use std::collections::BTreeMap;

    fn ranked(n: usize) -> Vec<RankedEntry> {
        (1..=n)
            .map(|i| RankedEntry {
                citation_index: i,
                score: 1.0 / i as f64,
                entry: CanonicalEntry {
                    title: format!("Paper {}", i),
                    authors: vec![format!("Author {}", i)],
                    abstract_text: Some(format!("Abstract of paper {}.", i)),
                    published_at: None,
                    external_ids: BTreeMap::new(),
                    url: None,
                    venue: None,
                    source_count: 1,
                    contributing_sources: ["arxiv".to_string()].into_iter().collect(),
                },
            })
            .collect()
    }

    fn fast_config() -> SynthesizerConfig {
        SynthesizerConfig {
            retry_pause: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn mock_with(replies: Vec<Result<String>>) -> MockLLMClient {
        let mut mock = MockLLMClient::new();
        let mut seq = Sequence::new();
        for reply in replies {
            let mut reply = Some(reply);
            mock.expect_generate_with_system()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, _| reply.take().unwrap_or_else(|| Ok(String::new())));
        }
        mock.expect_model_name().return_const("mock-model".to_string());
        mock
    }

    #[test]
    fn test_marker_parsing() {
        let text = "A [1]. B [2, 4]. C [3-5]. D [10]. E [0]. Year 2020 and [x].";
        assert_eq!(invalid_citations(text, 5), vec![0, 10]);
        assert_eq!(
            cited_indices(text, 5).into_iter().collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn test_strip_invalid_citations() {
        let text = "Claim one [1, 9]. Claim two [7]. Claim three [2-3].";
        assert_eq!(
            strip_invalid_citations(text, 3),
            "Claim one [1]. Claim two. Claim three [2-3]."
        );
    }

    #[tokio::test]
    async fn test_accepts_valid_narrative() {
        let llm = mock_with(vec![Ok("Findings [1] and [2, 3].".to_string())]);
        let synth = Synthesizer::new(Arc::new(llm), fast_config());
        let result = synth.synthesize("q", ranked(4)).await.unwrap();

        assert_eq!(result.status, SynthesisStatus::Accepted);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.used_indices.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(result.uncited_indices.into_iter().collect::<Vec<_>>(), vec![4]);
        assert_eq!(result.model.as_deref(), Some("mock-model"));
    }

    #[tokio::test]
    async fn test_retries_after_invalid_citation() {
        let llm = mock_with(vec![
            Ok("Bad [9].".to_string()),
            Ok("Good [1].".to_string()),
        ]);
        let synth = Synthesizer::new(Arc::new(llm), fast_config());
        let result = synth.synthesize("q", ranked(2)).await.unwrap();
        assert_eq!(result.status, SynthesisStatus::Accepted);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.narrative, "Good [1].");
    }

    #[tokio::test]
    async fn test_retry_prompt_carries_feedback() {
        let mut mock = MockLLMClient::new();
        let mut seq = Sequence::new();
        mock.expect_generate_with_system()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("Bad [7].".to_string()));
        mock.expect_generate_with_system()
            .withf(|_, prompt| prompt.contains("cited [7], which do not exist"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("Good [2].".to_string()));
        mock.expect_model_name().return_const("m".to_string());

        let synth = Synthesizer::new(Arc::new(mock), fast_config());
        let result = synth.synthesize("q", ranked(3)).await.unwrap();
        assert_eq!(result.narrative, "Good [2].");
    }

    #[tokio::test]
    async fn test_degrades_by_stripping_after_retry_limit() {
        let llm = mock_with(vec![
            Ok("One [1] [8].".to_string()),
            Ok("Two [2] [9].".to_string()),
            Ok("Three [1, 6] end.".to_string()),
        ]);
        let synth = Synthesizer::new(Arc::new(llm), fast_config());
        let result = synth.synthesize("q", ranked(2)).await.unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(result.narrative, "Three [1] end.");
        assert_eq!(
            result.status,
            SynthesisStatus::Degraded {
                reason: DegradeReason::InvalidCitations { stripped: vec![6] }
            }
        );
        assert!(invalid_citations(&result.narrative, 2).is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_uses_fallback() {
        let llm = mock_with(vec![
            Err(AppError::LLM("connection refused".into())),
            Ok("   ".to_string()),
            Err(AppError::LLM("connection refused".into())),
        ]);
        let synth = Synthesizer::new(Arc::new(llm), fast_config());
        let result = synth.synthesize("graph learning", ranked(3)).await.unwrap();

        assert!(result.status.is_degraded());
        assert!(matches!(
            result.status,
            SynthesisStatus::Degraded {
                reason: DegradeReason::BackendUnavailable { .. }
            }
        ));
        assert!(result.model.is_none());
        assert!(result.narrative.starts_with("# graph learning"));
        assert!(invalid_citations(&result.narrative, 3).is_empty());
        assert!(result.uncited_indices.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_without_entries_is_error() {
        let llm = mock_with(vec![
            Err(AppError::LLM("down".into())),
            Err(AppError::LLM("down".into())),
            Err(AppError::LLM("down".into())),
        ]);
        let synth = Synthesizer::new(Arc::new(llm), fast_config());
        let err = synth.synthesize("q", vec![]).await.unwrap_err();
        match err {
            AppError::SynthesisBackend {
                message,
                bibliography,
                errors,
            } => {
                assert!(message.contains("down"));
                assert!(bibliography.is_empty());
                assert!(errors.is_empty());
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_prompt_lists_sources() {
        let synth = Synthesizer::new(Arc::new(MockLLMClient::new()), fast_config());
        let prompt = synth.build_prompt("graph learning", &ranked(2), None);
        assert!(prompt.contains("[1] Paper 1 — Author 1 (n.d.); DOI: n/a; Venue: n/a"));
        assert!(prompt.contains("Abstract: Abstract of paper 2."));
        assert!(prompt.contains("Executive Summary"));
        assert!(prompt.contains("1 to 2"));
    }

    #[tokio::test]
    async fn test_fallback_neutralizes_bracketed_abstract_references() {
        let mut entries = ranked(3);
        for r in &mut entries {
            r.entry.abstract_text = Some("Building on prior work [42], we extend [7-9] and [2].".into());
        }
        entries[0].entry.title = "Revisiting [1] baselines".into();
        let llm = mock_with(vec![
            Err(AppError::LLM("down".into())),
            Err(AppError::LLM("down".into())),
            Err(AppError::LLM("down".into())),
        ]);
        let synth = Synthesizer::new(Arc::new(llm), fast_config());
        let result = synth.synthesize("q", entries).await.unwrap();

        assert!(invalid_citations(&result.narrative, 3).is_empty());
        assert!(result.narrative.contains("prior work (42), we extend (7-9) and (2)."));
        assert!(result.narrative.contains("Revisiting (1) baselines"));
        assert_eq!(result.used_indices.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_fallback_single_entry_span() {
        let text = fallback_summary("q", &ranked(1), 50);
        assert!(text.contains("sources [1]"));
        assert!(invalid_citations(&text, 1).is_empty());
    }
}

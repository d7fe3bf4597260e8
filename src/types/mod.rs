use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Well-known external identifier schemes.
pub mod id_scheme {
    /// Digital Object Identifier.
    pub const DOI: &str = "doi";
    /// arXiv identifier (without version suffix).
    pub const ARXIV: &str = "arxiv";
}

// ============= Dates =============

/// Publication date with partial precision.
///
/// Ordering compares year, then month, then day, with a missing component
/// sorting before any present one, so `2020` < `2020-01` < `2020-01-05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartialDate {
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u8>,
}

impl PartialDate {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            month: None,
            day: None,
        }
    }

    /// Year-month precision. Returns `None` for an out-of-range month.
    pub fn year_month(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Self {
            year,
            month: Some(month as u8),
            day: None,
        })
    }

    /// Full date. Returns `None` unless it names a real calendar day.
    pub fn ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?;
        let mut date = Self::year_month(year, month)?;
        date.day = Some(day as u8);
        Some(date)
    }

    /// Parse `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or an RFC 3339 timestamp.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
        let mut parts = date_part.split('-');

        let year_str = parts.next()?;
        if year_str.len() != 4 {
            return None;
        }
        let year: i32 = year_str.parse().ok()?;

        match (parts.next(), parts.next()) {
            (None, _) => Some(Self::year(year)),
            (Some(m), None) => Self::year_month(year, m.parse().ok()?),
            (Some(m), Some(d)) => Self::ymd(year, m.parse().ok()?, d.parse().ok()?),
        }
    }

    /// Year with the month folded in as a fraction, used for recency scoring.
    pub fn fractional_year(&self) -> f64 {
        let month_offset = self.month.map(|m| (m as f64 - 1.0) / 12.0).unwrap_or(0.0);
        self.year as f64 + month_offset
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.month, self.day) {
            (Some(m), Some(d)) => write!(f, "{:04}-{:02}-{:02}", self.year, m, d),
            (Some(m), None) => write!(f, "{:04}-{:02}", self.year, m),
            _ => write!(f, "{:04}", self.year),
        }
    }
}

// ============= Pipeline Records =============

/// One hit from one source for one expanded query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<PartialDate>,
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
}

impl RawRecord {
    pub fn new(source_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: title.into(),
            authors: Vec::new(),
            abstract_text: None,
            published_at: None,
            external_ids: BTreeMap::new(),
            url: None,
            venue: None,
        }
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn with_date(mut self, date: PartialDate) -> Self {
        self.published_at = Some(date);
        self
    }

    pub fn with_id(mut self, scheme: &str, value: impl Into<String>) -> Self {
        self.external_ids.insert(scheme.to_string(), value.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    /// True when the record carries a title or at least one external id.
    pub fn is_identifiable(&self) -> bool {
        !self.title.trim().is_empty() || self.external_ids.values().any(|v| !v.trim().is_empty())
    }
}

/// A deduplicated work, merged from one or more [`RawRecord`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<PartialDate>,
    pub external_ids: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    pub source_count: usize,
    pub contributing_sources: BTreeSet<String>,
}

impl CanonicalEntry {
    pub fn doi(&self) -> Option<&str> {
        self.external_ids.get(id_scheme::DOI).map(String::as_str)
    }

    /// Short author string: up to three names, then "et al.".
    pub fn author_line(&self) -> String {
        match self.authors.len() {
            0 => "Unknown".to_string(),
            1..=3 => self.authors.join(", "),
            _ => format!("{} et al.", self.authors[..3].join(", ")),
        }
    }

    /// Publication year or "n.d.".
    pub fn year_label(&self) -> String {
        self.published_at
            .map(|d| d.year.to_string())
            .unwrap_or_else(|| "n.d.".to_string())
    }

    /// Best link for the work: explicit URL, else a DOI resolver link.
    pub fn link(&self) -> Option<String> {
        self.url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| self.doi().map(|doi| format!("https://doi.org/{}", doi)))
    }
}

/// A canonical entry with its score and stable citation index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// 1-based, assigned in final rank order.
    pub citation_index: usize,
    pub score: f64,
    pub entry: CanonicalEntry,
}

// ============= Synthesis =============

/// Why a synthesis fell back from the model's first-choice output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradeReason {
    /// The model kept citing indices outside the bibliography; they were removed.
    InvalidCitations { stripped: Vec<usize> },
    /// The model backend failed; an abstract-based summary was produced instead.
    BackendUnavailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisStatus {
    Accepted,
    Degraded { reason: DegradeReason },
}

impl SynthesisStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SynthesisStatus::Degraded { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub narrative: String,
    /// Citation indices referenced by markers in `narrative`.
    pub used_indices: BTreeSet<usize>,
    /// Bibliography indices the narrative never cites.
    pub uncited_indices: BTreeSet<usize>,
    pub bibliography: Vec<RankedEntry>,
    pub status: SynthesisStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// ============= Reports =============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub records_seen: usize,
    pub canonical_entries: usize,
    pub ranked: usize,
    pub cited: usize,
}

/// Final output of one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub id: Uuid,
    pub query: String,
    pub generated_at: DateTime<Utc>,
    pub expanded_queries: Vec<String>,
    pub synthesis: SynthesisResult,
    pub source_errors: Vec<SourceError>,
    pub counts: ReportCounts,
    pub duration_ms: u64,
}

impl ResearchReport {
    /// Render the narrative followed by a numbered reference list.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(self.synthesis.narrative.trim_end());
        out.push_str("\n\n## References\n\n");
        for ranked in &self.synthesis.bibliography {
            out.push_str(&reference_line(ranked));
            out.push('\n');
        }
        if !self.source_errors.is_empty() {
            out.push_str("\n## Retrieval Issues\n\n");
            for err in &self.source_errors {
                out.push_str(&format!("- {}\n", err));
            }
        }
        out
    }
}

/// `[i] Title — Authors (year); DOI: ...; URL: ...`
pub fn reference_line(ranked: &RankedEntry) -> String {
    let entry = &ranked.entry;
    format!(
        "[{}] {} — {} ({}); DOI: {}; URL: {}",
        ranked.citation_index,
        entry.title,
        entry.author_line(),
        entry.year_label(),
        entry.doi().unwrap_or("n/a"),
        entry.link().unwrap_or_default(),
    )
}

// ============= API Request Types =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fanout: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

// ============= Error Types =============

/// One provider call that failed. Always recoverable at the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{source_id} failed for '{query}': {cause}")]
pub struct SourceError {
    pub source_id: String,
    pub query: String,
    pub cause: String,
    pub retryable: bool,
}

impl SourceError {
    pub fn new(
        source_id: impl Into<String>,
        query: impl Into<String>,
        cause: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            query: query.into(),
            cause: cause.into(),
            retryable,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("All {} source calls failed", errors.len())]
    AggregationExhausted { errors: Vec<SourceError> },

    #[error("No usable records were retrieved ({} source errors)", errors.len())]
    NoUsableRecords { errors: Vec<SourceError> },

    #[error("Synthesis backend failed: {message}")]
    SynthesisBackend {
        message: String,
        bibliography: Vec<RankedEntry>,
        errors: Vec<SourceError>,
    },

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Source errors attached to a job-level failure, if any.
    pub fn source_errors(&self) -> &[SourceError] {
        match self {
            AppError::AggregationExhausted { errors }
            | AppError::NoUsableRecords { errors }
            | AppError::SynthesisBackend { errors, .. } => errors,
            _ => &[],
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::AggregationExhausted { .. } => StatusCode::BAD_GATEWAY,
            AppError::NoUsableRecords { .. } => StatusCode::NOT_FOUND,
            AppError::SynthesisBackend { .. } => StatusCode::BAD_GATEWAY,
            AppError::LLM(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = serde_json::json!({
            "error": self.to_string()
        });
        if !self.source_errors().is_empty() {
            body["source_errors"] = serde_json::json!(self.source_errors());
        }
        if let AppError::SynthesisBackend { bibliography, .. } = &self {
            body["bibliography"] = serde_json::json!(bibliography);
        }

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

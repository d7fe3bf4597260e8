//! Crossref REST API adapter.

use super::{build_http_client, check_status, transport_error, RequestThrottle, SourceAdapter};
use crate::research::text::{collapse_whitespace, decode_entities, strip_markup};
use crate::types::{id_scheme, PartialDate, RawRecord, Result, SourceError};
use crate::utils::toml_config::SourcesConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const SOURCE_ID: &str = "crossref";
pub const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

pub struct CrossrefSource {
    client: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
    throttle: RequestThrottle,
}

impl CrossrefSource {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        mailto: Option<String>,
        min_interval: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto: mailto.filter(|m| !m.trim().is_empty()),
            throttle: RequestThrottle::new(min_interval),
        }
    }

    pub fn from_config(config: &SourcesConfig) -> Result<Self> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(
            client,
            config.crossref.base_url.clone(),
            config.crossref.mailto.clone(),
            Duration::from_millis(config.crossref.min_interval_ms),
        ))
    }
}

#[async_trait]
impl SourceAdapter for CrossrefSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Vec<RawRecord>, SourceError> {
        self.throttle.wait().await;
        tracing::debug!(source = SOURCE_ID, query, max_results, "Searching Crossref");

        let mut params = vec![
            ("query", query.to_string()),
            ("rows", max_results.to_string()),
        ];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }

        let response = self
            .client
            .get(format!("{}/works", self.base_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| transport_error(SOURCE_ID, query, &e))?;

        check_status(&response, &self.throttle, SOURCE_ID, query).await?;

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(SOURCE_ID, query, &e))?;

        parse_works(&body).map_err(|cause| SourceError::new(SOURCE_ID, query, cause, false))
    }
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: WorksMessage,
}

#[derive(Debug, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<Author>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    issued: Option<DateParts>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    publisher: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateParts {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<serde_json::Value>>,
}

impl Author {
    fn display_name(&self) -> Option<String> {
        let joined = [self.given.as_deref(), self.family.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return Some(joined);
        }
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

impl DateParts {
    /// First date-parts row as year, year-month or full date.
    fn to_date(&self) -> Option<PartialDate> {
        let row = self.date_parts.first()?;
        let part = |i: usize| -> Option<i64> {
            row.get(i).and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            })
        };
        let year = i32::try_from(part(0)?).ok()?;
        match (part(1), part(2)) {
            (Some(m), Some(d)) => PartialDate::ymd(year, m as u32, d as u32)
                .or_else(|| PartialDate::year_month(year, m as u32))
                .or(Some(PartialDate::year(year))),
            (Some(m), None) => {
                PartialDate::year_month(year, m as u32).or(Some(PartialDate::year(year)))
            }
            _ => Some(PartialDate::year(year)),
        }
    }
}

/// Parse a `/works` response body into records.
pub fn parse_works(body: &str) -> std::result::Result<Vec<RawRecord>, String> {
    let response: WorksResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {}", e))?;

    Ok(response
        .message
        .items
        .into_iter()
        .map(work_to_record)
        .collect())
}

fn work_to_record(work: Work) -> RawRecord {
    let title = work
        .title
        .first()
        .map(|t| collapse_whitespace(&decode_entities(t)))
        .unwrap_or_default();
    let mut record = RawRecord::new(SOURCE_ID, title);

    record.authors = work.author.iter().filter_map(Author::display_name).collect();

    record.abstract_text = work
        .abstract_text
        .as_deref()
        .map(strip_markup)
        .filter(|a| !a.is_empty());

    record.published_at = work.issued.as_ref().and_then(DateParts::to_date);

    if let Some(doi) = work.doi.filter(|d| !d.trim().is_empty()) {
        record = record.with_id(id_scheme::DOI, doi.trim());
    }

    record.url = work.url.filter(|u| !u.is_empty());

    record.venue = work
        .container_title
        .into_iter()
        .find(|c| !c.trim().is_empty())
        .or(work.publisher)
        .filter(|v| !v.trim().is_empty());

    record
}

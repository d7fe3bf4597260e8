//! arXiv Atom API adapter.

use super::{build_http_client, check_status, transport_error, RequestThrottle, SourceAdapter};
use crate::research::text::{collapse_whitespace, decode_entities, strip_arxiv_version};
use crate::types::{id_scheme, PartialDate, RawRecord, Result, SourceError};
use crate::utils::toml_config::SourcesConfig;
use async_trait::async_trait;
use std::time::Duration;

pub const SOURCE_ID: &str = "arxiv";
pub const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";

pub struct ArxivSource {
    client: reqwest::Client,
    base_url: String,
    throttle: RequestThrottle,
}

impl ArxivSource {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        min_interval: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
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
            config.arxiv.base_url.clone(),
            Duration::from_millis(config.arxiv.min_interval_ms),
        ))
    }
}

#[async_trait]
impl SourceAdapter for ArxivSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Vec<RawRecord>, SourceError> {
        self.throttle.wait().await;
        tracing::debug!(source = SOURCE_ID, query, max_results, "Searching arXiv");

        let max = max_results.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", query),
                ("start", "0"),
                ("max_results", max.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(SOURCE_ID, query, &e))?;

        check_status(&response, &self.throttle, SOURCE_ID, query).await?;

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(SOURCE_ID, query, &e))?;

        parse_feed(&body).map_err(|cause| SourceError::new(SOURCE_ID, query, cause, false))
    }
}

/// Parse an Atom feed into records. Entries without a title are skipped.
pub fn parse_feed(xml: &str) -> std::result::Result<Vec<RawRecord>, String> {
    if !xml.contains("<feed") {
        return Err("malformed response: not an Atom feed".to_string());
    }
    Ok(blocks(xml, "entry")
        .into_iter()
        .filter_map(parse_entry)
        .collect())
}

fn parse_entry(entry: &str) -> Option<RawRecord> {
    let title = tag_text(entry, "title").map(|t| clean(&t))?;
    if title.is_empty() {
        return None;
    }
    let mut record = RawRecord::new(SOURCE_ID, title);

    record.authors = blocks(entry, "author")
        .into_iter()
        .filter_map(|author| tag_text(author, "name"))
        .map(|name| clean(&name))
        .filter(|name| !name.is_empty())
        .collect();

    if let Some(summary) = tag_text(entry, "summary").map(|s| clean(&s)) {
        if !summary.is_empty() {
            record.abstract_text = Some(summary);
        }
    }

    record.published_at = tag_text(entry, "published").and_then(|p| PartialDate::parse(&p));

    if let Some(id_url) = tag_text(entry, "id") {
        let id_url = id_url.trim().to_string();
        let arxiv_id = id_url
            .rsplit_once("/abs/")
            .map(|(_, id)| id)
            .unwrap_or(id_url.as_str());
        if !arxiv_id.is_empty() {
            record = record.with_id(id_scheme::ARXIV, strip_arxiv_version(arxiv_id));
        }
        record.url = Some(id_url);
    }

    if let Some(doi) = tag_text(entry, "arxiv:doi").map(|d| clean(&d)) {
        if !doi.is_empty() {
            record = record.with_id(id_scheme::DOI, doi);
        }
    }

    if let Some(journal) = tag_text(entry, "arxiv:journal_ref").map(|j| clean(&j)) {
        if !journal.is_empty() {
            record.venue = Some(journal);
        }
    }

    Some(record)
}

fn clean(text: &str) -> String {
    collapse_whitespace(&decode_entities(text))
}

/// Position of `<tag` followed by `>`, whitespace or `/`.
fn find_open(xml: &str, tag: &str) -> Option<usize> {
    let open = format!("<{}", tag);
    let mut from = 0;
    while let Some(pos) = xml[from..].find(&open) {
        let start = from + pos;
        let after = start + open.len();
        match xml[after..].chars().next() {
            Some('>') | Some('/') => return Some(start),
            Some(c) if c.is_whitespace() => return Some(start),
            _ => from = after,
        }
    }
    None
}

/// Text of the first `<tag ...>text</tag>`.
fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let start = find_open(xml, tag)?;
    let content_start = start + xml[start..].find('>')? + 1;
    if xml[..content_start].ends_with("/>") {
        return Some(String::new());
    }
    let close = format!("</{}>", tag);
    let content_end = content_start + xml[content_start..].find(&close)?;
    Some(xml[content_start..content_end].trim().to_string())
}

/// All `<tag ...>...</tag>` blocks, in document order.
fn blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let close = format!("</{}>", tag);
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(pos) = find_open(&xml[from..], tag) {
        let start = from + pos;
        let Some(end_pos) = xml[start..].find(&close) else {
            break;
        };
        let end = start + end_pos + close.len();
        out.push(&xml[start..end]);
        from = end;
    }
    out
}

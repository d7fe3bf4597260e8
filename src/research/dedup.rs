//! Cross-source deduplication.
//!
//! Records are grouped with a union-find over three kinds of evidence:
//! a shared external id, an identical normalized title, or a similar title
//! together with shared author surnames. Grouping is transitive, so A~B and
//! B~C put A, B and C in one entry even when A and C share nothing directly.

use crate::research::text::{
    author_key, jaccard, normalize_external_id, normalize_title, surname_key, tokenize,
};
use crate::types::{CanonicalEntry, RawRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Minimum title-token Jaccard similarity for a fuzzy match
    #[serde(default = "default_title_similarity")]
    pub title_similarity_threshold: f64,

    /// Shared author surnames a fuzzy title match also needs
    #[serde(default = "default_min_author_overlap")]
    pub min_author_overlap: usize,
}

fn default_title_similarity() -> f64 {
    0.8
}

fn default_min_author_overlap() -> usize {
    1
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_similarity_threshold: default_title_similarity(),
            min_author_overlap: default_min_author_overlap(),
        }
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// The smaller index becomes the root so roots stay first-seen.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Merge records describing the same work. Output is in first-seen order.
    pub fn deduplicate(&self, records: Vec<RawRecord>) -> Vec<CanonicalEntry> {
        let total = records.len();
        let records: Vec<RawRecord> = records.into_iter().filter(RawRecord::is_identifiable).collect();
        if records.len() < total {
            tracing::warn!(
                dropped = total - records.len(),
                "Dropped records with neither a title nor an external id"
            );
        }

        let n = records.len();
        let mut uf = UnionFind::new(n);

        let mut by_id: HashMap<(String, String), usize> = HashMap::new();
        let mut by_title: HashMap<String, usize> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            for (scheme, value) in &record.external_ids {
                let value = normalize_external_id(scheme, value);
                if value.is_empty() {
                    continue;
                }
                match by_id.get(&(scheme.clone(), value.clone())) {
                    Some(&first) => uf.union(first, i),
                    None => {
                        by_id.insert((scheme.clone(), value), i);
                    }
                }
            }

            let title = normalize_title(&record.title);
            if !title.is_empty() {
                match by_title.get(&title) {
                    Some(&first) => uf.union(first, i),
                    None => {
                        by_title.insert(title, i);
                    }
                }
            }
        }

        let tokens: Vec<BTreeSet<String>> = records.iter().map(|r| tokenize(&r.title)).collect();
        let surnames: Vec<HashSet<String>> = records
            .iter()
            .map(|r| r.authors.iter().filter_map(|a| surname_key(a)).collect())
            .collect();
        for i in 0..n {
            if tokens[i].is_empty() {
                continue;
            }
            for j in (i + 1)..n {
                if tokens[j].is_empty() || uf.find(i) == uf.find(j) {
                    continue;
                }
                if self.fuzzy_match(&tokens[i], &tokens[j], &surnames[i], &surnames[j]) {
                    uf.union(i, j);
                }
            }
        }

        let mut group_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<&RawRecord>> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let root = uf.find(i);
            let g = *group_of_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push(record);
        }

        let entries: Vec<CanonicalEntry> = groups.into_iter().map(merge).collect();
        tracing::info!(
            records = n,
            entries = entries.len(),
            "Deduplication finished"
        );
        entries
    }

    fn fuzzy_match(
        &self,
        a_tokens: &BTreeSet<String>,
        b_tokens: &BTreeSet<String>,
        a_authors: &HashSet<String>,
        b_authors: &HashSet<String>,
    ) -> bool {
        if jaccard(a_tokens, b_tokens) < self.config.title_similarity_threshold {
            return false;
        }
        a_authors.intersection(b_authors).count() >= self.config.min_author_overlap
    }
}

/// Combine a group of records into one entry.
fn merge(group: Vec<&RawRecord>) -> CanonicalEntry {
    let title = group
        .iter()
        .map(|r| r.title.trim())
        .find(|t| !t.is_empty())
        .unwrap_or_default()
        .to_string();

    let mut abstract_text: Option<&str> = None;
    for candidate in group.iter().filter_map(|r| r.abstract_text.as_deref()) {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        if abstract_text.map_or(true, |best| candidate.chars().count() > best.chars().count()) {
            abstract_text = Some(candidate);
        }
    }

    let mut external_ids = BTreeMap::new();
    for record in &group {
        for (scheme, value) in &record.external_ids {
            if !value.trim().is_empty() {
                external_ids
                    .entry(scheme.clone())
                    .or_insert_with(|| value.trim().to_string());
            }
        }
    }

    let mut authors = Vec::new();
    let mut seen_authors = HashSet::new();
    for author in group.iter().flat_map(|r| r.authors.iter()) {
        let Some(key) = author_key(author) else {
            continue;
        };
        if seen_authors.insert(key) {
            authors.push(author.trim().to_string());
        }
    }

    let first_non_empty = |field: fn(&RawRecord) -> Option<&String>| {
        group
            .iter()
            .filter_map(|r| field(*r))
            .find(|v| !v.trim().is_empty())
            .cloned()
    };

    CanonicalEntry {
        title,
        authors,
        abstract_text: abstract_text.map(str::to_string),
        published_at: group.iter().filter_map(|r| r.published_at).min(),
        external_ids,
        url: first_non_empty(|r| r.url.as_ref()),
        venue: first_non_empty(|r| r.venue.as_ref()),
        source_count: group.len(),
        contributing_sources: group.iter().map(|r| r.source_id.clone()).collect(),
    }
}

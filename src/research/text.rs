//! Text normalization shared by the expander, deduplicator and ranker.

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "into", "is", "it", "its", "of", "on", "or", "over", "that", "the", "their", "this", "to",
    "towards", "using", "versus", "via", "vs", "what", "when", "which", "why", "with", "within",
];

/// Lowercase, replace non-alphanumerics with spaces and collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let mapped: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distinct normalized tokens.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    normalize_title(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Query terms with stopwords removed. Falls back to all tokens when every
/// token is a stopword.
pub fn content_terms(text: &str) -> BTreeSet<String> {
    let all = tokenize(text);
    let content: BTreeSet<String> = all.iter().filter(|t| !is_stopword(t)).cloned().collect();
    if content.is_empty() {
        all
    } else {
        content
    }
}

/// Jaccard similarity of two token sets; two empty sets are dissimilar.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Comparison key for an author: the normalized surname.
///
/// Handles both "Given Family" and "Family, Given".
pub fn surname_key(author: &str) -> Option<String> {
    let surname = match author.split_once(',') {
        Some((family, _)) => family.to_string(),
        None => author.split_whitespace().last().unwrap_or_default().to_string(),
    };
    let key = normalize_title(&surname);
    (!key.is_empty()).then_some(key)
}

/// Identity key for an author name, insensitive to "Given Family" versus
/// "Family, Given" ordering: the sorted set of name tokens.
pub fn author_key(author: &str) -> Option<String> {
    let tokens = tokenize(author);
    (!tokens.is_empty()).then(|| tokens.into_iter().collect::<Vec<_>>().join(" "))
}

/// Canonical form of an external id value for the given scheme.
pub fn normalize_external_id(scheme: &str, value: &str) -> String {
    let value = value.trim();
    match scheme {
        "doi" => {
            let lower = value.to_lowercase();
            let stripped = [
                "https://doi.org/",
                "http://doi.org/",
                "https://dx.doi.org/",
                "http://dx.doi.org/",
                "doi:",
            ]
            .iter()
            .find_map(|prefix| lower.strip_prefix(prefix))
            .unwrap_or(&lower);
            stripped.trim().to_string()
        }
        "arxiv" => strip_arxiv_version(&value.to_lowercase()).to_string(),
        _ => value.to_lowercase(),
    }
}

/// `2101.00001v3` -> `2101.00001`
pub fn strip_arxiv_version(id: &str) -> &str {
    if let Some(pos) = id.rfind('v') {
        let (head, tail) = id.split_at(pos);
        if !head.is_empty() && tail.len() > 1 && tail[1..].chars().all(|c| c.is_ascii_digit()) {
            return head;
        }
    }
    id
}

/// Remove `<...>` markup and collapse whitespace.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    collapse_whitespace(&decode_entities(&out))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the XML predefined entities and numeric character references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find(';').filter(|&e| e <= 10) else {
            out.push('&');
            rest = &after[1..];
            continue;
        };
        let entity = &after[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

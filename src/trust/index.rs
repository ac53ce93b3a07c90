// src/trust/index.rs

// --- Imports ---
use std::cmp::Reverse;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::trust::models::{CandidateLink, FileKind};
use crate::utils::error::DiscoverError;

// --- CSS Selectors (Lazy Static) ---
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href]").expect("Failed to compile ANCHOR_SELECTOR")
});

// URL fragments that mark a link as a document download even without a
// file extension (CMS download endpoints, attachment routes).
const DOC_URL_KEYWORDS: [&str; 6] = [
    "download",
    "document",
    "/file",
    "attachment",
    "board-paper",
    "agenda",
];

// Anchor-text conventions for board packs. A year on its own counts; index
// pages routinely label packs as just "January 2026".
static BOARD_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(board\s+papers?|board\s+pack|agenda|minutes|papers)\b|\b20\d{2}\b")
        .expect("Failed to compile BOARD_TEXT_RE")
});

const MAX_ANCHOR_TEXT: usize = 120;

/// Parses an index page's HTML into candidate download links.
///
/// A candidate matches on its href extension (.pdf/.zip), an href download
/// keyword, or board-pack anchor-text conventions. Candidates are
/// deduplicated by resolved URL, first occurrence wins, so document order
/// is preserved for the recency tie-break.
pub fn discover_links(html: &str, base_url: &str) -> Result<Vec<CandidateLink>, DiscoverError> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_href(href, base.as_ref()) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }

        let mut text = element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            text = href.to_string();
        }
        if text.len() > MAX_ANCHOR_TEXT {
            let mut end = MAX_ANCHOR_TEXT;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }

        let url_string = resolved.to_string();
        let kind = FileKind::from_url(&url_string);

        // Keyword check uses the raw href; the resolved URL inherits the
        // index page's own path.
        let raw_href = href.to_ascii_lowercase();
        let is_doc = kind.is_some()
            || DOC_URL_KEYWORDS.iter().any(|kw| raw_href.contains(kw))
            || BOARD_TEXT_RE.is_match(&text);
        if !is_doc {
            continue;
        }

        if !seen.insert(url_string.clone()) {
            continue;
        }

        tracing::debug!("Candidate link: '{}' -> {}", text, url_string);
        // Keyword-matched links without an extension are assumed PDF; the
        // fetcher re-resolves the real kind from response content.
        candidates.push(CandidateLink::new(
            url_string,
            text,
            kind.unwrap_or(FileKind::Pdf),
        ));
    }

    if candidates.is_empty() {
        return Err(DiscoverError::NoDownloadLinkFound(base_url.to_string()));
    }
    tracing::info!("Found {} candidate link(s) on {}", candidates.len(), base_url);
    Ok(candidates)
}

/// Selects the most recent candidate: inferred date descending, dated
/// candidates before undated ones, document order breaking ties (stable,
/// first wins).
pub fn most_recent(candidates: &[CandidateLink]) -> Option<&CandidateLink> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(position, link)| (link.date.is_none(), Reverse(link.date), *position))
        .map(|(_, link)| link)
}

fn resolve_href(href: &str, base: Option<&Url>) -> Option<Url> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute);
    }
    base?.join(href).ok()
}

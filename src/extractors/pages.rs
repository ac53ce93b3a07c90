// src/extractors/pages.rs

// --- Imports ---
use std::collections::HashSet;

use lopdf::Document;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::ExtractError;

// --- Regex Patterns for Agenda Matching (Lazy Static) ---
// Section titles as they appear in board pack agendas, each capturing a
// nearby page number. References below page 3 are front-matter noise and
// are rejected at locate time.
static SECTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("ceo_report", r"chief executive[^\n]{0,60}?(\d{1,3})\b"),
        ("finance", r"finance report[^\n]{0,60}?(\d{1,3})\b"),
        (
            "performance",
            r"(?:integrated performance|ipr|performance report)[^\n]{0,60}?(\d{1,3})\b",
        ),
        ("quality", r"quality[^\n]{0,60}?(\d{1,3})\b"),
        ("workforce", r"(?:people committee|workforce)[^\n]{0,60}?(\d{1,3})\b"),
        ("risk_register", r"risk register[^\n]{0,60}?(\d{1,3})\b"),
    ]
    .iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (*name, re)))
    .collect()
});

// Financial content markers for the fallback scan.
static FINANCIAL_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)£|\bdeficit\b|\bsurplus\b|\bforecast\b|\bvariance\b|\bytd\b|\brun rate\b|\bcapital programme\b")
        .expect("Failed to compile FINANCIAL_HINT_RE")
});

// --- Data Structures ---

/// Where an extracted page came from, for citation in the final output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionTag {
    Agenda,
    KeySection(String),
    Other,
}

impl SectionTag {
    pub fn label(&self) -> &str {
        match self {
            SectionTag::Agenda => "agenda",
            SectionTag::KeySection(name) => name,
            SectionTag::Other => "other",
        }
    }
}

/// One page of extracted text. Page numbers are 1-based and cite back into
/// the named source document.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub source: String,
    pub page_number: u32,
    pub tag: SectionTag,
    pub text: String,
}

/// A key-section start page located in agenda text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHit {
    pub name: String,
    pub start_page: u32,
}

/// Page and character limits for a single extraction run. The character
/// budget is shared across all documents in the run.
#[derive(Debug, Clone)]
pub struct ExtractBudget {
    /// Pages scanned at the front of each document for the agenda.
    pub agenda_pages: u32,
    /// Pages pulled per located key section.
    pub section_span: u32,
    /// Plain front pages taken when no agenda references are found.
    pub fallback_pages: u32,
    /// Hard cap on total extracted pages.
    pub page_budget: usize,
    /// Per-page character cap.
    pub chars_per_page: usize,
    /// Hard cap on total extracted characters.
    pub char_budget: usize,
}

impl Default for ExtractBudget {
    fn default() -> Self {
        Self {
            agenda_pages: 6,
            section_span: 30,
            fallback_pages: 20,
            page_budget: 100,
            chars_per_page: 3_000,
            char_budget: 400_000,
        }
    }
}

// --- Section Location Strategy ---

/// Maps agenda text to key-section start pages. The default implementation
/// is a keyword match; layout-aware strategies can be substituted without
/// touching the orchestrator.
pub trait SectionLocator: Send + Sync {
    fn locate(&self, agenda_text: &str, page_count: u32) -> Vec<SectionHit>;
}

/// Keyword-driven locator over the standing items of NHS board agendas.
pub struct KeywordSectionLocator;

impl SectionLocator for KeywordSectionLocator {
    fn locate(&self, agenda_text: &str, page_count: u32) -> Vec<SectionHit> {
        let lowered = agenda_text.to_lowercase();
        let mut hits = Vec::new();
        for (name, pattern) in SECTION_PATTERNS.iter() {
            let Some(caps) = pattern.captures(&lowered) else {
                continue;
            };
            let Ok(page) = caps[1].parse::<u32>() else {
                continue;
            };
            if (3..=page_count).contains(&page) {
                hits.push(SectionHit {
                    name: (*name).to_string(),
                    start_page: page,
                });
            } else {
                tracing::debug!("Rejected '{}' page reference {} of {}", name, page, page_count);
            }
        }
        hits
    }
}

// --- Budget Tracking ---

struct BudgetTracker {
    pages_left: usize,
    chars_left: usize,
}

impl BudgetTracker {
    fn new(budget: &ExtractBudget) -> Self {
        Self {
            pages_left: budget.page_budget,
            chars_left: budget.char_budget,
        }
    }

    fn exhausted(&self) -> bool {
        self.pages_left == 0 || self.chars_left == 0
    }

    /// Admits a page of `chars` characters, or refuses it. Admission order
    /// is the caller's priority order, so agenda and key-section pages are
    /// preserved over the rest when the budget runs short.
    fn admit(&mut self, chars: usize) -> bool {
        if self.pages_left == 0 || chars > self.chars_left {
            return false;
        }
        self.pages_left -= 1;
        self.chars_left -= chars;
        true
    }
}

// --- Main Extractor Structure ---

pub struct PageExtractor {
    budget: ExtractBudget,
    locator: Box<dyn SectionLocator>,
}

impl PageExtractor {
    pub fn new(budget: ExtractBudget, locator: Box<dyn SectionLocator>) -> Self {
        Self { budget, locator }
    }

    /// Extracts a budgeted page set from one or more PDFs, in the given
    /// order, under one shared budget.
    ///
    /// Guarantees: output never exceeds the page or character budget, and a
    /// run over non-empty PDFs only errors when every document is
    /// unopenable or image-only.
    pub fn extract_all(
        &self,
        documents: &[(String, Vec<u8>)],
    ) -> Result<Vec<ExtractedPage>, ExtractError> {
        let mut tracker = BudgetTracker::new(&self.budget);
        let mut pages: Vec<ExtractedPage> = Vec::new();
        let mut first_open_error: Option<ExtractError> = None;
        let mut textless: Option<String> = None;
        let mut opened = 0usize;

        for (label, bytes) in documents {
            if tracker.exhausted() {
                tracing::info!("Budget exhausted, skipping remaining document(s)");
                break;
            }
            let document = match Document::load_mem(bytes) {
                Ok(document) => document,
                Err(e) => {
                    tracing::warn!("Could not open PDF '{}': {}", label, e);
                    first_open_error.get_or_insert(ExtractError::PdfOpen {
                        name: label.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if document.is_encrypted() {
                tracing::warn!("PDF '{}' is encrypted, skipping", label);
                first_open_error.get_or_insert(ExtractError::PdfOpen {
                    name: label.clone(),
                    reason: "document is encrypted".to_string(),
                });
                continue;
            }
            opened += 1;

            let emitted_before = pages.len();
            self.extract_document(label, &document, &mut tracker, &mut pages);
            if pages.len() == emitted_before {
                textless.get_or_insert_with(|| label.clone());
            }
        }

        if pages.is_empty() {
            if opened == 0 {
                return Err(first_open_error.unwrap_or(ExtractError::EmptyExtraction));
            }
            if let Some(name) = textless {
                return Err(ExtractError::NoExtractableText(name));
            }
            return Err(ExtractError::EmptyExtraction);
        }
        Ok(pages)
    }

    fn extract_document(
        &self,
        label: &str,
        document: &Document,
        tracker: &mut BudgetTracker,
        out: &mut Vec<ExtractedPage>,
    ) {
        let page_count = document.get_pages().len() as u32;
        tracing::info!("Reading '{}': {} page(s)", label, page_count);

        let mut taken: HashSet<u32> = HashSet::new();

        // Agenda pass: the front of the pack lists items and page references.
        let agenda_end = self.budget.agenda_pages.min(page_count);
        let mut agenda_text = String::new();
        for page in 1..=agenda_end {
            let text = self.page_text(document, page);
            if text.trim().is_empty() {
                continue;
            }
            agenda_text.push_str(&text);
            agenda_text.push('\n');
            self.push_page(out, tracker, &mut taken, label, page, SectionTag::Agenda, text);
        }

        let hits = self.locator.locate(&agenda_text, page_count);
        if !hits.is_empty() {
            tracing::info!(
                "Sections found in agenda of '{}': {:?}",
                label,
                hits.iter().map(|hit| hit.name.as_str()).collect::<Vec<_>>()
            );
            for hit in &hits {
                let end = (hit.start_page + self.budget.section_span).min(page_count + 1);
                for page in hit.start_page..end {
                    if tracker.exhausted() {
                        return;
                    }
                    if taken.contains(&page) {
                        continue;
                    }
                    let text = self.page_text(document, page);
                    if text.trim().is_empty() {
                        continue;
                    }
                    self.push_page(
                        out,
                        tracker,
                        &mut taken,
                        label,
                        page,
                        SectionTag::KeySection(hit.name.clone()),
                        text,
                    );
                }
            }
        } else {
            // Fallback: unstructured front matter. Take the first pages
            // beyond the agenda window, then sweep the rest for pages that
            // read like financial tables.
            tracing::info!("No agenda page references found in '{}', using fallback scan", label);
            let plain_end = (agenda_end + self.budget.fallback_pages).min(page_count);
            for page in (agenda_end + 1)..=plain_end {
                if tracker.exhausted() {
                    return;
                }
                let text = self.page_text(document, page);
                if text.trim().is_empty() {
                    continue;
                }
                self.push_page(out, tracker, &mut taken, label, page, SectionTag::Other, text);
            }
            for page in (plain_end + 1)..=page_count {
                if tracker.exhausted() {
                    return;
                }
                let text = self.page_text(document, page);
                if text.trim().is_empty() || !looks_financial(&text) {
                    continue;
                }
                self.push_page(out, tracker, &mut taken, label, page, SectionTag::Other, text);
            }
        }

        // A document that still produced nothing gets one sweep for any
        // text at all, so image-only packs are the only ones reported as
        // textless.
        if !taken.is_empty() || tracker.exhausted() {
            return;
        }
        let mut rescued = 0u32;
        for page in 1..=page_count {
            if tracker.exhausted() || rescued >= self.budget.fallback_pages {
                break;
            }
            let text = self.page_text(document, page);
            if text.trim().is_empty() {
                continue;
            }
            self.push_page(out, tracker, &mut taken, label, page, SectionTag::Other, text);
            rescued += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_page(
        &self,
        out: &mut Vec<ExtractedPage>,
        tracker: &mut BudgetTracker,
        taken: &mut HashSet<u32>,
        label: &str,
        page: u32,
        tag: SectionTag,
        text: String,
    ) {
        if !tracker.admit(text.len()) {
            tracing::debug!("Budget refused page {} of '{}'", page, label);
            return;
        }
        taken.insert(page);
        out.push(ExtractedPage {
            source: label.to_string(),
            page_number: page,
            tag,
            text,
        });
    }

    /// Extracts a single page's text, capped at the per-page character
    /// limit. Pages lopdf cannot decode read as empty.
    fn page_text(&self, document: &Document, page: u32) -> String {
        let text = match document.extract_text(&[page]) {
            Ok(text) => text,
            Err(e) => {
                tracing::trace!("Page {} text extraction failed: {}", page, e);
                return String::new();
            }
        };
        if text.len() <= self.budget.chars_per_page {
            return text;
        }
        let mut end = self.budget.chars_per_page;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

fn looks_financial(text: &str) -> bool {
    if FINANCIAL_HINT_RE.is_match(text) {
        return true;
    }
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    digits > 20 && digits * 8 >= text.len()
}

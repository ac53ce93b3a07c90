// src/trust/models.rs
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

// --- Date-hint patterns (Lazy Static) ---
// Trust sites and pack filenames carry dates in several shapes; checked in
// order of decreasing precision.
static DATE_YMD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})[-_/.](\d{1,2})[-_/.](\d{1,2})")
        .expect("Failed to compile DATE_YMD_RE")
});

static DATE_DMY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})[-_/.](\d{1,2})[-_/.](\d{4})")
        .expect("Failed to compile DATE_DMY_RE")
});

static DATE_MONTH_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(\d{1,2})(?:st|nd|rd|th)?[\s._-]+)?(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*[\s._-]+(\d{4})\b")
        .expect("Failed to compile DATE_MONTH_NAME_RE")
});

static BARE_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(20\d{2})\b").expect("Failed to compile BARE_YEAR_RE")
});

/// File kinds the pipeline can retrieve and process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Zip,
}

impl FileKind {
    /// Infers the kind from a URL's path extension, ignoring any query
    /// string or fragment.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();
        if path.ends_with(".pdf") {
            Some(FileKind::Pdf)
        } else if path.ends_with(".zip") {
            Some(FileKind::Zip)
        } else {
            None
        }
    }

    /// Resolves the kind from response content. Magic bytes win over the
    /// Content-Type header; trust sites frequently mislabel documents.
    pub fn from_content(bytes: &[u8], content_type: &str) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(FileKind::Pdf);
        }
        // ZIP local file header magic
        if bytes.starts_with(b"PK") {
            return Some(FileKind::Zip);
        }
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("application/pdf") {
            Some(FileKind::Pdf)
        } else if content_type.contains("zip") {
            Some(FileKind::Zip)
        } else {
            None
        }
    }
}

/// A candidate download link found on a board-papers index page.
/// Immutable once created.
#[derive(Debug, Clone)]
pub struct CandidateLink {
    pub url: String,
    pub text: String,
    pub date: Option<NaiveDate>,
    pub kind: FileKind,
}

impl CandidateLink {
    /// Builds a candidate, inferring a date from the anchor text first and
    /// the URL second.
    pub fn new(url: String, text: String, kind: FileKind) -> Self {
        let date = date_hint(&text).or_else(|| date_hint(&url));
        Self {
            url,
            text,
            date,
            kind,
        }
    }
}

/// The single document a run retrieves, with its kind resolved from the
/// actual response content.
#[derive(Debug, Clone)]
pub struct SelectedDocument {
    pub url: String,
    pub kind: FileKind,
    pub bytes: Vec<u8>,
}

impl SelectedDocument {
    /// A short display label: the last path segment of the source URL.
    pub fn label(&self) -> String {
        let path = self
            .url
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or(&self.url);
        path.rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("board_papers.pdf")
            .to_string()
    }
}

/// Parses a date hint out of free text (anchor text, URLs, ZIP entry
/// names). Bare years resolve to 1 January and rank below anything more
/// precise only by virtue of the date itself.
pub fn date_hint(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = DATE_YMD_RE.captures(text) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }
    if let Some(caps) = DATE_DMY_RE.captures(text) {
        if let Some(date) = ymd(&caps[3], &caps[2], &caps[1]) {
            return Some(date);
        }
    }
    if let Some(caps) = DATE_MONTH_NAME_RE.captures(text) {
        let day = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(1);
        let month = month_number(&caps[2]);
        let year = caps[3].parse::<i32>().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }
    if let Some(caps) = BARE_YEAR_RE.captures(text) {
        let year = caps[1].parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    None
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    let year = year.parse::<i32>().ok()?;
    let month = month.parse::<u32>().ok()?;
    let day = day.parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> u32 {
    match name.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => 1,
    }
}

// src/pipeline/mod.rs
use std::path::{Path, PathBuf};

use crate::archive;
use crate::extractors::pages::{
    ExtractBudget, ExtractedPage, KeywordSectionLocator, PageExtractor, SectionLocator,
};
use crate::trust::client::{FetchConfig, TrustClient};
use crate::trust::index::{discover_links, most_recent};
use crate::trust::models::{FileKind, SelectedDocument};
use crate::utils::error::{AppError, DiscoverError, FetchError};
use crate::utils::html_debug;

// Highlight patterns for --debug index dumps, mirroring what link
// discovery matches on.
const LINK_DEBUG_PATTERNS: [(&str, &str); 3] = [
    (r#"(?i)href="[^"]*\.pdf[^"]*""#, "pdf"),
    (r#"(?i)href="[^"]*\.zip[^"]*""#, "zip"),
    (
        r#"(?i)href="[^"]*(?:download|attachment|board-paper|agenda)[^"]*""#,
        "doclink",
    ),
];

/// Everything the pipeline needs for one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub trust_name: String,
    /// Board-papers index page, as produced by the (external) search step.
    pub index_url: Option<String>,
    /// Direct document URL; bypasses discovery and ranking.
    pub document_url: Option<String>,
    /// Already-downloaded PDF or ZIP; bypasses the network entirely.
    pub local_file: Option<PathBuf>,
    /// Persist the raw downloaded bytes here before extraction.
    pub save_raw: Option<PathBuf>,
    /// Save the index HTML with candidate links annotated.
    pub debug_html: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub budget: ExtractBudget,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            budget: ExtractBudget::default(),
        }
    }
}

/// Success payload handed to the analysis stage: the budgeted page set and
/// a renderer for the combined, citation-bearing text.
#[derive(Debug)]
pub struct AnalysisInput {
    pub trust_name: String,
    pub source_url: String,
    pub pages: Vec<ExtractedPage>,
}

impl AnalysisInput {
    /// Renders the extracted pages as one text block, grouped under
    /// section headers with per-page citations.
    pub fn combined_text(&self) -> String {
        let mut out = String::new();
        let mut current_header: Option<String> = None;
        for page in &self.pages {
            let stem = Path::new(&page.source)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(&page.source);
            let header = format!("{} {}", stem, page.tag.label())
                .to_uppercase()
                .replace('_', " ");
            if current_header.as_deref() != Some(header.as_str()) {
                out.push_str("\n\n=== ");
                out.push_str(&header);
                out.push_str(" ===\n");
                current_header = Some(header);
            }
            out.push_str(&format!("-- Page {} --\n", page.page_number));
            out.push_str(page.text.trim_end());
            out.push('\n');
        }
        out.trim_start().to_string()
    }

    pub fn character_count(&self) -> usize {
        self.pages.iter().map(|page| page.text.len()).sum()
    }
}

/// Terminal pipeline states: ready for analysis, or manual intervention.
#[derive(Debug)]
pub enum PipelineOutcome {
    Ready(AnalysisInput),
    ManualUploadRequired { reason: String },
}

/// Sequences Discover -> Resolve -> Fetch -> (Unpack) -> Extract. Every
/// recoverable failure collapses into ManualUploadRequired with a reason;
/// anything else propagates as a fatal error carrying stage and URL.
pub struct Pipeline {
    client: TrustClient,
    extractor: PageExtractor,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, AppError> {
        Self::with_locator(config, Box::new(KeywordSectionLocator))
    }

    /// Builds a pipeline with a substitute section-location strategy.
    pub fn with_locator(
        config: PipelineConfig,
        locator: Box<dyn SectionLocator>,
    ) -> Result<Self, AppError> {
        let client = TrustClient::new(config.fetch.clone())
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        let extractor = PageExtractor::new(config.budget, locator);
        Ok(Self { client, extractor })
    }

    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome, AppError> {
        // Local file entry point: straight to Unpack/Extract.
        if let Some(path) = &request.local_file {
            tracing::info!("Using local file: {}", path.display());
            let bytes = tokio::fs::read(path).await?;
            let kind = FileKind::from_content(&bytes, "").unwrap_or(FileKind::Pdf);
            let document = SelectedDocument {
                url: path.display().to_string(),
                kind,
                bytes,
            };
            return self.unpack_and_extract(request, document);
        }

        let (document_url, referer) = match &request.document_url {
            Some(url) => {
                tracing::info!("Using supplied document URL: {}", url);
                // Best-effort warm-up so the download carries session
                // cookies when an index page is known.
                if let Some(index_url) = &request.index_url {
                    if let Err(e) = self.client.fetch_index(index_url).await {
                        tracing::debug!("Warm-up index visit failed: {}", e);
                    }
                }
                let referer = request.index_url.clone().unwrap_or_else(|| url.clone());
                (url.clone(), referer)
            }
            None => {
                let index_url = request.index_url.as_deref().ok_or_else(|| {
                    AppError::Config(
                        "supply an index URL, a document URL, or a local file".to_string(),
                    )
                })?;

                let html = match self.client.fetch_index(index_url).await {
                    Ok(html) => html,
                    Err(e @ FetchError::Blocked { .. }) => {
                        return Ok(manual_upload(e.to_string()));
                    }
                    Err(e) => {
                        return Err(AppError::Fetch {
                            stage: "discover",
                            url: index_url.to_string(),
                            source: e,
                        })
                    }
                };

                if let Some(path) = &request.debug_html {
                    if let Err(e) = html_debug::create_debug_html(&html, path, &LINK_DEBUG_PATTERNS)
                    {
                        tracing::warn!("Failed to create debug HTML: {}", e);
                    }
                }

                let candidates = match discover_links(&html, index_url) {
                    Ok(candidates) => candidates,
                    Err(e @ DiscoverError::NoDownloadLinkFound(_)) => {
                        return Ok(manual_upload(e.to_string()));
                    }
                };
                let best = match most_recent(&candidates) {
                    Some(best) => best,
                    None => {
                        return Ok(manual_upload(
                            DiscoverError::NoDownloadLinkFound(index_url.to_string()).to_string(),
                        ));
                    }
                };
                tracing::info!("Selected candidate: '{}' -> {}", best.text, best.url);
                (best.url.clone(), index_url.to_string())
            }
        };

        let document = match self.client.download(&document_url, &referer).await {
            Ok(document) => document,
            Err(e @ FetchError::Blocked { .. }) => return Ok(manual_upload(e.to_string())),
            Err(e) => {
                return Err(AppError::Fetch {
                    stage: "fetch",
                    url: document_url,
                    source: e,
                })
            }
        };

        self.unpack_and_extract(request, document)
    }

    fn unpack_and_extract(
        &self,
        request: &PipelineRequest,
        document: SelectedDocument,
    ) -> Result<PipelineOutcome, AppError> {
        if let Some(path) = &request.save_raw {
            std::fs::write(path, &document.bytes)?;
            tracing::info!(
                "Saved raw download to {} ({} bytes)",
                path.display(),
                document.bytes.len()
            );
        }

        let documents: Vec<(String, Vec<u8>)> = match document.kind {
            FileKind::Pdf => vec![(document.label(), document.bytes)],
            FileKind::Zip => match archive::unpack_pdfs(&document.bytes) {
                Ok(members) => members
                    .into_iter()
                    .map(|member| (member.name, member.bytes))
                    .collect(),
                // Both corrupt archives and PDF-free archives end the same
                // way: a human has to source the pack.
                Err(e) => return Ok(manual_upload(e.to_string())),
            },
        };

        match self.extractor.extract_all(&documents) {
            Ok(pages) => {
                tracing::info!("Extracted {} page(s) from {}", pages.len(), document.url);
                Ok(PipelineOutcome::Ready(AnalysisInput {
                    trust_name: request.trust_name.clone(),
                    source_url: document.url,
                    pages,
                }))
            }
            Err(e) => Ok(manual_upload(format!(
                "extraction failed, consider a manual source check: {e}"
            ))),
        }
    }
}

fn manual_upload(reason: String) -> PipelineOutcome {
    tracing::warn!("Manual upload required: {}", reason);
    PipelineOutcome::ManualUploadRequired { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::zip_of;
    use crate::extractors::pages::testutil::pdf_with_pages;
    use std::time::Duration;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            fetch: FetchConfig {
                timeout: Duration::from_secs(5),
                min_document_bytes: 32,
            },
            budget: ExtractBudget::default(),
        }
    }

    fn board_pdf() -> Vec<u8> {
        pdf_with_pages(&[
            "Trust Board Meeting\nAgenda\nApologies for absence",
            "Minutes of the previous meeting",
            "Matters arising and action log",
        ])
    }

    fn index_html(server_url: &str) -> String {
        format!(
            r#"<html><body>
            <a href="{server_url}/packs/board-papers-2024-01-01.pdf">Board papers 1 January 2024</a>
            <a href="{server_url}/packs/board-papers-2024-06-01.pdf">Board papers 1 June 2024</a>
            </body></html>"#
        )
    }

    #[tokio::test]
    async fn pipeline_selects_the_most_recent_dated_link() {
        let mut server = mockito::Server::new_async().await;
        let html = index_html(&server.url());
        server
            .mock("GET", "/papers")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(html)
            .create_async()
            .await;
        let january = server
            .mock("GET", "/packs/board-papers-2024-01-01.pdf")
            .expect(0)
            .create_async()
            .await;
        let june = server
            .mock("GET", "/packs/board-papers-2024-06-01.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(board_pdf())
            .create_async()
            .await;

        let pipeline = Pipeline::new(test_config()).unwrap();
        let request = PipelineRequest {
            trust_name: "Example Trust".to_string(),
            index_url: Some(format!("{}/papers", server.url())),
            ..PipelineRequest::default()
        };
        let outcome = pipeline.run(&request).await.unwrap();

        match outcome {
            PipelineOutcome::Ready(input) => {
                assert!(input.source_url.ends_with("board-papers-2024-06-01.pdf"));
                assert!(!input.pages.is_empty());
            }
            other => panic!("expected Ready, got {other:?}"),
        }
        january.assert_async().await;
        june.assert_async().await;
    }

    #[tokio::test]
    async fn html_response_ends_in_manual_upload_with_content_type_reason() {
        let mut server = mockito::Server::new_async().await;
        let html = index_html(&server.url());
        server
            .mock("GET", "/papers")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(html)
            .create_async()
            .await;
        server
            .mock("GET", "/packs/board-papers-2024-06-01.pdf")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body>Your download is being prepared, please wait.</body></html>")
            .create_async()
            .await;

        let pipeline = Pipeline::new(test_config()).unwrap();
        let request = PipelineRequest {
            trust_name: "Example Trust".to_string(),
            index_url: Some(format!("{}/papers", server.url())),
            ..PipelineRequest::default()
        };
        let outcome = pipeline.run(&request).await.unwrap();

        match outcome {
            PipelineOutcome::ManualUploadRequired { reason } => {
                assert!(reason.contains("text/html"), "reason was: {reason}");
            }
            other => panic!("expected ManualUploadRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zip_without_pdfs_ends_in_manual_upload() {
        let mut server = mockito::Server::new_async().await;
        let zip_bytes = zip_of(&[("notes.txt", b"minutes in the wrong format".as_ref())]);
        server
            .mock("GET", "/pack.zip")
            .with_status(200)
            .with_header("content-type", "application/zip")
            .with_body(zip_bytes)
            .create_async()
            .await;

        let pipeline = Pipeline::new(test_config()).unwrap();
        let request = PipelineRequest {
            trust_name: "Example Trust".to_string(),
            document_url: Some(format!("{}/pack.zip", server.url())),
            ..PipelineRequest::default()
        };
        let outcome = pipeline.run(&request).await.unwrap();

        match outcome {
            PipelineOutcome::ManualUploadRequired { reason } => {
                assert!(reason.contains("no usable PDF"), "reason was: {reason}");
            }
            other => panic!("expected ManualUploadRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zipped_packs_are_unpacked_and_extracted() {
        let mut server = mockito::Server::new_async().await;
        let inner = board_pdf();
        let zip_bytes = zip_of(&[("board-pack-june-2024.pdf", inner.as_slice())]);
        server
            .mock("GET", "/pack.zip")
            .with_status(200)
            .with_header("content-type", "application/zip")
            .with_body(zip_bytes)
            .create_async()
            .await;

        let pipeline = Pipeline::new(test_config()).unwrap();
        let request = PipelineRequest {
            trust_name: "Example Trust".to_string(),
            document_url: Some(format!("{}/pack.zip", server.url())),
            ..PipelineRequest::default()
        };
        let outcome = pipeline.run(&request).await.unwrap();

        match outcome {
            PipelineOutcome::Ready(input) => {
                assert!(input.pages.iter().all(|p| p.source == "board-pack-june-2024.pdf"));
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_file_skips_the_network() {
        let path = std::env::temp_dir().join(format!(
            "boardpack_extractor_test_{}.pdf",
            std::process::id()
        ));
        std::fs::write(&path, board_pdf()).unwrap();

        let pipeline = Pipeline::new(test_config()).unwrap();
        let request = PipelineRequest {
            trust_name: "Example Trust".to_string(),
            local_file: Some(path.clone()),
            ..PipelineRequest::default()
        };
        let outcome = pipeline.run(&request).await.unwrap();
        std::fs::remove_file(&path).ok();

        match outcome {
            PipelineOutcome::Ready(input) => assert!(!input.pages.is_empty()),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_entry_point_is_a_config_error() {
        let pipeline = Pipeline::new(test_config()).unwrap();
        let request = PipelineRequest {
            trust_name: "Example Trust".to_string(),
            ..PipelineRequest::default()
        };
        let err = pipeline.run(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn combined_text_carries_page_citations() {
        let input = AnalysisInput {
            trust_name: "Example Trust".to_string(),
            source_url: "https://x.nhs.uk/pack.pdf".to_string(),
            pages: vec![
                ExtractedPage {
                    source: "pack.pdf".to_string(),
                    page_number: 1,
                    tag: crate::extractors::pages::SectionTag::Agenda,
                    text: "Agenda listing".to_string(),
                },
                ExtractedPage {
                    source: "pack.pdf".to_string(),
                    page_number: 45,
                    tag: crate::extractors::pages::SectionTag::KeySection("finance".to_string()),
                    text: "Finance detail".to_string(),
                },
            ],
        };
        let text = input.combined_text();
        assert!(text.contains("=== PACK AGENDA ==="));
        assert!(text.contains("=== PACK FINANCE ==="));
        assert!(text.contains("-- Page 45 --"));
        assert_eq!(input.character_count(), "Agenda listing".len() + "Finance detail".len());
    }
}

// src/trust/client.rs
use std::time::Duration;

use reqwest::header;

use crate::trust::models::{FileKind, SelectedDocument};
use crate::utils::error::FetchError;

// Browser User-Agent rotation. Trust sites commonly refuse requests that
// identify as scripts; the first entry is the client default, the second is
// the single-retry alternate.
pub(crate) const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_DOCUMENT: &str = "application/pdf,application/zip,application/octet-stream,*/*";
const ACCEPT_LANGUAGE: &str = "en-GB,en;q=0.9";

/// Network configuration for the fetch stage.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Bodies smaller than this are treated as blocked responses; trust
    /// sites serve short interstitial pages in place of real documents.
    pub min_document_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            min_document_bytes: 10_000,
        }
    }
}

/// HTTP client for a trust website, holding the session cookie jar so the
/// index-page visit seeds cookies for the download that follows.
pub struct TrustClient {
    client: reqwest::Client,
    config: FetchConfig,
}

impl TrustClient {
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENTS[0])
            .cookie_store(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetches the board-papers index page as HTML.
    ///
    /// Non-2xx responses classify as `Blocked` rather than failing hard:
    /// the operator recourse for an unreachable index is the same manual
    /// upload as for a blocked download.
    pub async fn fetch_index(&self, url: &str) -> Result<String, FetchError> {
        tracing::info!("Fetching index page: {}", url);
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, ACCEPT_HTML)
            .header(header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let content_type = content_type_of(&response);
            tracing::warn!("Index page returned HTTP {} for {}", status, url);
            return Err(FetchError::Blocked {
                url: url.to_string(),
                status: status.as_u16(),
                content_type,
                bytes: 0,
            });
        }

        let body = response.text().await?;
        tracing::debug!("Index page: {} bytes from {}", body.len(), url);
        Ok(body)
    }

    /// Downloads a candidate document, classifying the response as a
    /// usable document or a blocked download.
    ///
    /// At most one retry, with the alternate User-Agent; repeated identical
    /// requests against a blocking server are wasted cost. Transport
    /// errors (DNS, timeouts) are never classified as blocked and
    /// propagate to the caller.
    pub async fn download(&self, url: &str, referer: &str) -> Result<SelectedDocument, FetchError> {
        match self.try_download(url, referer, USER_AGENTS[0]).await {
            Ok(document) => Ok(document),
            Err(FetchError::Blocked {
                status,
                content_type,
                bytes,
                ..
            }) => {
                tracing::warn!(
                    "Download blocked (HTTP {}, content-type '{}', {} bytes), retrying with alternate User-Agent",
                    status,
                    content_type,
                    bytes
                );
                self.try_download(url, referer, USER_AGENTS[1]).await
            }
            Err(other) => Err(other),
        }
    }

    async fn try_download(
        &self,
        url: &str,
        referer: &str,
        user_agent: &str,
    ) -> Result<SelectedDocument, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(header::USER_AGENT, user_agent)
            .header(header::ACCEPT, ACCEPT_DOCUMENT)
            .header(header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE);
        if !referer.is_empty() {
            request = request.header(header::REFERER, referer);
        }

        let response = request.send().await?;
        let status = response.status();
        let content_type = content_type_of(&response);
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(FetchError::Blocked {
                url: url.to_string(),
                status: status.as_u16(),
                content_type,
                bytes: bytes.len(),
            });
        }
        if bytes.len() < self.config.min_document_bytes {
            tracing::warn!(
                "Response body too small to be a board pack: {} bytes from {}",
                bytes.len(),
                url
            );
            return Err(FetchError::Blocked {
                url: url.to_string(),
                status: status.as_u16(),
                content_type,
                bytes: bytes.len(),
            });
        }

        match FileKind::from_content(&bytes, &content_type) {
            Some(kind) => {
                tracing::info!(
                    "Downloaded {:?} document: {} bytes from {}",
                    kind,
                    bytes.len(),
                    url
                );
                Ok(SelectedDocument {
                    url: url.to_string(),
                    kind,
                    bytes: bytes.to_vec(),
                })
            }
            // An HTML page where a document was expected is the classic
            // anti-automation interstitial.
            None => Err(FetchError::Blocked {
                url: url.to_string(),
                status: status.as_u16(),
                content_type,
                bytes: bytes.len(),
            }),
        }
    }
}

fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(5),
            min_document_bytes: 16,
        }
    }

    fn pdf_body() -> Vec<u8> {
        let mut body = b"%PDF-1.4\n".to_vec();
        body.extend(std::iter::repeat(b' ').take(64));
        body
    }

    #[tokio::test]
    async fn forbidden_download_is_blocked_after_one_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/papers/pack.pdf")
            .with_status(403)
            .with_body("denied, but padded to pass nothing")
            .expect(2)
            .create_async()
            .await;

        let client = TrustClient::new(test_config()).unwrap();
        let url = format!("{}/papers/pack.pdf", server.url());
        let err = client.download(&url, &server.url()).await.unwrap_err();

        match err {
            FetchError::Blocked { status, .. } => assert_eq!(status, 403),
            other => panic!("expected Blocked, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn html_in_place_of_pdf_is_blocked() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pack.pdf")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body>Please enable JavaScript to download this file.</body></html>")
            .expect(2)
            .create_async()
            .await;

        let client = TrustClient::new(test_config()).unwrap();
        let url = format!("{}/pack.pdf", server.url());
        let err = client.download(&url, "").await.unwrap_err();

        match err {
            FetchError::Blocked {
                status,
                content_type,
                ..
            } => {
                assert_eq!(status, 200);
                assert!(content_type.contains("text/html"));
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn undersized_body_is_blocked() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pack.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF")
            .expect(2)
            .create_async()
            .await;

        let client = TrustClient::new(test_config()).unwrap();
        let url = format!("{}/pack.pdf", server.url());
        let err = client.download(&url, "").await.unwrap_err();

        match err {
            FetchError::Blocked { bytes, .. } => assert_eq!(bytes, 4),
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_pdf_download_returns_bytes() {
        let body = pdf_body();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pack.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(&body)
            .create_async()
            .await;

        let client = TrustClient::new(test_config()).unwrap();
        let url = format!("{}/pack.pdf", server.url());
        let document = client.download(&url, &server.url()).await.unwrap();

        assert_eq!(document.kind, FileKind::Pdf);
        assert_eq!(document.bytes, body);
        assert_eq!(document.url, url);
    }

    #[tokio::test]
    async fn alternate_user_agent_retry_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let blocked = server
            .mock("GET", "/pack.pdf")
            .match_header("user-agent", USER_AGENTS[0])
            .with_status(403)
            .create_async()
            .await;
        let allowed = server
            .mock("GET", "/pack.pdf")
            .match_header("user-agent", USER_AGENTS[1])
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(pdf_body())
            .create_async()
            .await;

        let client = TrustClient::new(test_config()).unwrap();
        let url = format!("{}/pack.pdf", server.url());
        let document = client.download(&url, "").await.unwrap();

        assert_eq!(document.kind, FileKind::Pdf);
        blocked.assert_async().await;
        allowed.assert_async().await;
    }

    #[tokio::test]
    async fn session_cookies_persist_from_index_to_download() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/board-papers")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_header("set-cookie", "trust_session=abc123; Path=/")
            .with_body("<html><body>index</body></html>")
            .create_async()
            .await;
        let download = server
            .mock("GET", "/pack.pdf")
            .match_header("cookie", mockito::Matcher::Regex("trust_session=abc123".into()))
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(pdf_body())
            .create_async()
            .await;

        let client = TrustClient::new(test_config()).unwrap();
        let index_url = format!("{}/board-papers", server.url());
        client.fetch_index(&index_url).await.unwrap();

        let url = format!("{}/pack.pdf", server.url());
        client.download(&url, &index_url).await.unwrap();
        download.assert_async().await;
    }

    #[test]
    fn blocked_index_page_is_recoverable() {
        tokio_test::block_on(async {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/board-papers")
                .with_status(403)
                .create_async()
                .await;

            let client = TrustClient::new(test_config()).unwrap();
            let url = format!("{}/board-papers", server.url());
            let err = client.fetch_index(&url).await.unwrap_err();
            assert!(matches!(err, FetchError::Blocked { status: 403, .. }));
        });
    }
}

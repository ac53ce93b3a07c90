// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the pipeline
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("Download blocked: HTTP {status}, content-type '{content_type}', {bytes} bytes from {url}")]
    Blocked {
        url: String,
        status: u16,
        content_type: String,
        bytes: usize,
    },
}

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("No download links found on index page {0}")]
    NoDownloadLinkFound(String),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive is corrupt or unreadable: {0}")]
    Corrupt(String),

    #[error("Archive contains no usable PDF entries")]
    NoPdfEntries,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Could not open PDF '{name}': {reason}")]
    PdfOpen { name: String, reason: String },

    #[error("No extractable text in '{0}' (likely a scanned, image-only document)")]
    NoExtractableText(String),

    #[error("Extraction produced no usable pages")]
    EmptyExtraction,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Fetch failed at stage '{stage}' for {url}: {source}")]
    Fetch {
        stage: &'static str,
        url: String,
        source: FetchError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

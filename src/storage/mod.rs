// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::pipeline::AnalysisInput;
use crate::utils::error::StorageError;

#[derive(Serialize)]
struct PageMapEntry<'a> {
    source: &'a str,
    page: u32,
    section: &'a str,
}

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    /// Saves the combined, citation-bearing text for the analysis stage
    pub fn save_combined_text(&self, input: &AnalysisInput) -> Result<PathBuf, StorageError> {
        let filename = format!("{}_extract.txt", slug(&input.trust_name));
        let file_path = self.base_dir.join(filename);

        fs::write(&file_path, input.combined_text()).map_err(StorageError::IoError)?;

        tracing::info!("Saved extracted text to {}", file_path.display());
        Ok(file_path)
    }

    /// Saves the page map and run metadata in JSON format
    pub fn save_page_map(&self, input: &AnalysisInput) -> Result<PathBuf, StorageError> {
        let filename = format!("{}_page_map.json", slug(&input.trust_name));
        let file_path = self.base_dir.join(filename);

        let entries: Vec<PageMapEntry> = input
            .pages
            .iter()
            .map(|page| PageMapEntry {
                source: &page.source,
                page: page.page_number,
                section: page.tag.label(),
            })
            .collect();

        let metadata = serde_json::json!({
            "trust_name": input.trust_name,
            "source_url": input.source_url,
            "page_count": input.pages.len(),
            "character_count": input.character_count(),
            "pages": entries,
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, metadata_str).map_err(StorageError::IoError)?;

        tracing::info!("Saved page map to {}", file_path.display());
        Ok(file_path)
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

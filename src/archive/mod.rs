// src/archive/mod.rs
use std::cmp::Reverse;
use std::io::{Cursor, Read};

use crate::trust::models::date_hint;
use crate::utils::error::ArchiveError;

/// A PDF extracted from a ZIP board pack.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Expands ZIP bytes into the contained PDFs, ordered most recent first by
/// filename date hints, else archive order (stable).
///
/// Directory entries and macOS `__MACOSX` resource forks are skipped. An
/// unreadable archive or entry is `Corrupt`; an archive with no PDF
/// entries at all is `NoPdfEntries`.
pub fn unpack_pdfs(data: &[u8]) -> Result<Vec<ArchiveMember>, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    tracing::info!("Archive contains {} entries", archive.len());

    let mut members = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.starts_with("__MACOSX") {
            continue;
        }
        if !name.to_ascii_lowercase().ends_with(".pdf") {
            tracing::debug!("Skipping non-PDF entry: {}", name);
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        tracing::info!("Unpacked {} ({} bytes)", name, bytes.len());
        members.push(ArchiveMember { name, bytes });
    }

    if members.is_empty() {
        return Err(ArchiveError::NoPdfEntries);
    }

    let mut ordered: Vec<(usize, ArchiveMember)> = members.into_iter().enumerate().collect();
    ordered.sort_by_key(|(position, member)| {
        let date = date_hint(&member.name);
        (date.is_none(), Reverse(date), *position)
    });
    Ok(ordered.into_iter().map(|(_, member)| member).collect())
}

#[cfg(test)]
pub(crate) fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{FORMAT_VERSION, Index, IndexHeader, PassageRecord};
use crate::{RagError, Result};

/// Tag identifying index artifacts written by this crate
pub const INDEX_FORMAT: &str = "dnd-books-index";

#[derive(Serialize)]
struct IndexFileRef<'a> {
    format: &'a str,
    header: &'a IndexHeader,
    records: &'a [PassageRecord],
    checksum: String,
}

#[derive(Deserialize)]
struct IndexFile {
    header: IndexHeader,
    records: Vec<PassageRecord>,
    checksum: String,
}

/// Just enough of the artifact to decide whether the rest can be parsed
#[derive(Deserialize)]
struct VersionProbe {
    format: String,
    header: HeaderProbe,
}

#[derive(Deserialize)]
struct HeaderProbe {
    format_version: u32,
}

impl Index {
    /// Persist the index atomically: the artifact is written to a sibling
    /// temporary file and renamed over `path`.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = IndexFileRef {
            format: INDEX_FORMAT,
            header: &self.header,
            records: &self.records,
            checksum: checksum(&self.header, &self.records)?,
        };
        let mut bytes = serde_json::to_vec(&file).map_err(serialization_error)?;
        bytes.push(b'\n');

        let temp_path = temp_path_for(path);
        let result = write_synced(&temp_path, &bytes).and_then(|()| fs::rename(&temp_path, path));
        if let Err(e) = result {
            // Best effort; the original error is what matters
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        info!(
            "Saved index with {} passages to {}",
            self.header.passage_count,
            path.display()
        );
        Ok(())
    }

    /// Load and fully validate a persisted index. Nothing is returned unless
    /// every check passes.
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());

        let probe: VersionProbe = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::IndexCorrupt(format!("{}: {e}", path.display())))?;
        if probe.format != INDEX_FORMAT {
            return Err(RagError::IndexCorrupt(format!(
                "{}: unexpected format tag '{}'",
                path.display(),
                probe.format
            )));
        }
        if probe.header.format_version != FORMAT_VERSION {
            return Err(RagError::IndexVersionMismatch {
                expected: format!("format version {FORMAT_VERSION}"),
                found: format!("format version {}", probe.header.format_version),
            });
        }

        let file: IndexFile = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::IndexCorrupt(format!("{}: {e}", path.display())))?;

        if checksum(&file.header, &file.records)? != file.checksum {
            return Err(RagError::IndexCorrupt(format!(
                "{}: checksum mismatch",
                path.display()
            )));
        }
        if file.records.len() != file.header.passage_count {
            return Err(RagError::IndexCorrupt(format!(
                "{}: header lists {} passages but {} records are present",
                path.display(),
                file.header.passage_count,
                file.records.len()
            )));
        }
        if let Some(record) = file
            .records
            .iter()
            .find(|r| r.vector.len() != file.header.dimension)
        {
            return Err(RagError::IndexCorrupt(format!(
                "{}: passage {} has {} dimensions, header says {}",
                path.display(),
                record.id,
                record.vector.len(),
                file.header.dimension
            )));
        }

        info!(
            "Loaded index with {} passages ({} model, {} dimensions) from {}",
            file.header.passage_count,
            file.header.model,
            file.header.dimension,
            path.display()
        );

        Ok(Self {
            header: file.header,
            records: file.records,
        })
    }
}

fn checksum(header: &IndexHeader, records: &[PassageRecord]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(header).map_err(serialization_error)?);
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(records).map_err(serialization_error)?);
    Ok(format!("{:x}", hasher.finalize()))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn serialization_error(e: serde_json::Error) -> RagError {
    RagError::Other(anyhow::Error::new(e).context("Failed to serialize index"))
}

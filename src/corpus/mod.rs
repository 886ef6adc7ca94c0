//! Source documents: loading extracted rulebook text from disk and cleaning it
//! up before chunking.


use fancy_regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::{RagError, Result};

/// Page separator emitted by PDF text extractors
pub const PAGE_SEPARATOR: char = '\x0c';

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\n\s*){3,}").expect("valid regex"));
static HYPHENATED_LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=\w)-\n(?=\w)").expect("valid regex"));
static SPACE_BEFORE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([.,!?])").expect("valid regex"));
static REPEATED_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

/// A source book, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Unique identifier, the file stem of the source (e.g. `PHB`)
    pub id: String,
    /// Cleaned text, pages joined by a newline
    pub text: String,
    /// Character offsets at which pages 2, 3, ... begin
    pub page_breaks: Vec<usize>,
}

impl Document {
    /// Build a document from raw extracted text, splitting pages on form feeds
    /// and cleaning each page independently.
    #[inline]
    pub fn new(id: impl Into<String>, raw_text: &str) -> Self {
        let mut text = String::with_capacity(raw_text.len());
        let mut page_breaks = Vec::new();
        let mut char_count = 0;

        for (i, page) in raw_text.split(PAGE_SEPARATOR).enumerate() {
            if i > 0 {
                text.push('\n');
                char_count += 1;
                page_breaks.push(char_count);
            }
            let cleaned = clean_text(page);
            char_count += cleaned.chars().count();
            text.push_str(&cleaned);
        }

        Self {
            id: id.into(),
            text,
            page_breaks,
        }
    }

    /// Build a document from text that is already clean and has no page information
    #[inline]
    pub fn from_plain_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            page_breaks: Vec::new(),
        }
    }

    /// 1-based page containing the given character offset, if pages are known
    #[inline]
    pub fn page_at(&self, char_offset: usize) -> Option<u32> {
        if self.page_breaks.is_empty() {
            return None;
        }
        let preceding = self.page_breaks.partition_point(|&b| b <= char_offset);
        u32::try_from(preceding + 1).ok()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Normalise text extracted from a PDF page.
///
/// Collapses runs of blank lines, rejoins words hyphenated across a line
/// break, removes whitespace before punctuation and collapses repeated spaces.
#[inline]
pub fn clean_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = EXCESS_BLANK_LINES.replace_all(&text, "\n\n");
    let text = HYPHENATED_LINE_BREAK.replace_all(&text, "");
    let text = SPACE_BEFORE_PUNCTUATION.replace_all(&text, "$1");
    REPEATED_SPACES.replace_all(&text, " ").into_owned()
}

/// Load every `.txt` file below `dir` as a [`Document`].
///
/// Files are visited in sorted path order so that repeated loads of an
/// unchanged directory produce identical document sequences. Unreadable files
/// are skipped with a warning; two files sharing a stem are rejected.
#[inline]
pub fn load_corpus(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(RagError::Configuration(format!(
            "Corpus directory does not exist: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    collect_text_files(dir, &mut files)?;
    files.sort();

    info!("Found {} text files in {}", files.len(), dir.display());

    let mut documents: Vec<Document> = Vec::with_capacity(files.len());
    for path in files {
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!("Skipping file with non UTF-8 name: {}", path.display());
            continue;
        };

        match fs::read_to_string(&path) {
            Ok(raw) => {
                if documents.iter().any(|d| d.id == id) {
                    return Err(RagError::Configuration(format!(
                        "Duplicate document id '{}' ({})",
                        id,
                        path.display()
                    )));
                }

                let document = Document::new(id, &raw);
                debug!(
                    "Loaded document '{}' ({} characters, {} pages)",
                    document.id,
                    document.text.chars().count(),
                    document.page_breaks.len() + 1
                );
                documents.push(document);
            }
            Err(e) => {
                warn!("Could not read file {}: {}", path.display(), e);
            }
        }
    }

    Ok(documents)
}

fn collect_text_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_text_files(&path, files)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        {
            files.push(path);
        }
    }
    Ok(())
}

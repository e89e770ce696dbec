//! Turns files on disk into [`Document`]s.
//!
//! Loading is best effort: a missing, unsupported or unreadable path is logged
//! and contributes no documents, so one bad file never aborts a batch.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::knowledge::KnowledgeError;

const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Word,
}

impl DocumentFormat {
    /// Format implied by the file extension, compared case-insensitively
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "txt" => Some(Self::Text),
            "docx" => Some(Self::Word),
            _ => None,
        }
    }

    fn read(self, path: &Path) -> Result<String, KnowledgeError> {
        match self {
            Self::Text => fs::read_to_string(path).map_err(|e| load_error(path, e)),
            Self::Word => read_docx(path),
        }
    }
}

fn load_error(path: &Path, reason: impl ToString) -> KnowledgeError {
    KnowledgeError::Load {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

pub fn is_supported(path: &Path) -> bool {
    DocumentFormat::from_path(path).is_some()
}

/// Load one path. Never fails; problems are logged and yield no documents.
pub fn load(path: &Path) -> Vec<Document> {
    if !path.exists() {
        warn!(path = %path.display(), "File does not exist, skipping");
        return Vec::new();
    }

    let Some(format) = DocumentFormat::from_path(path) else {
        warn!(path = %path.display(), "Unsupported file format, skipping");
        return Vec::new();
    };

    match format.read(path) {
        Ok(text) if text.trim().is_empty() => {
            warn!(path = %path.display(), "Document contains no text");
            Vec::new()
        }
        Ok(text) => {
            debug!(path = %path.display(), chars = text.chars().count(), "Loaded document");
            vec![Document::new(text, path.display().to_string())]
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to load document");
            Vec::new()
        }
    }
}

pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Vec<Document> {
    paths.iter().flat_map(|p| load(p.as_ref())).collect()
}

/// Expand a directory into the supported files beneath it, sorted.
/// Any other path is returned unchanged.
pub fn collect_paths(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_supported(p))
        .collect();
    files.sort();
    files
}

/// Extract the visible text of a `.docx` file
pub fn read_docx(path: &Path) -> Result<String, KnowledgeError> {
    let file = File::open(path).map_err(|e| load_error(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| load_error(path, e))?;
    let mut body = archive
        .by_name(DOCX_BODY)
        .map_err(|e| load_error(path, format!("{}: {}", DOCX_BODY, e)))?;

    let mut xml = String::new();
    body.read_to_string(&mut xml).map_err(|e| load_error(path, e))?;

    docx_text(&xml).map_err(|reason| load_error(path, reason))
}

fn docx_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;
    // <w:tab> inside <w:tabs> is a tab stop definition, not content
    let mut in_tab_stops = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = true,
                b"w:tabs" => in_tab_stops = true,
                b"w:tab" if !in_tab_stops => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" if !in_tab_stops => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:tabs" => in_tab_stops = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_run_text => {
                let unescaped = e.unescape().map_err(|e| e.to_string())?;
                text.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "Malformed document XML at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }

    Ok(text.trim_end().to_string())
}

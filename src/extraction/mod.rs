// Text extraction module
// Turns uploaded document bytes into normalized plain text for chunking

#[cfg(test)]
mod tests;

pub mod office;

use fancy_regex::Regex;
use itertools::Itertools;
use std::borrow::Cow;
use std::panic;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

pub use office::{PowerPointExtractor, WordExtractor};

static LOWER_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=[a-z])(?=[A-Z])").expect("case pattern is valid"));
static LETTER_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=[a-zA-Z])(?=[0-9])").expect("letter pattern is valid"));
static DIGIT_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=[0-9])(?=[a-zA-Z])").expect("digit pattern is valid"));

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("Invalid office archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Malformed document XML: {0}")]
    Xml(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported document type: {0}")]
    Unsupported(String),
    #[error("Normalization failed: {0}")]
    Normalize(#[from] fancy_regex::Error),
}

/// Document families recognized by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Word,
    PowerPoint,
    /// Pre-2007 binary `.doc` / `.ppt`
    LegacyOffice,
    PlainText,
}

impl FileKind {
    #[inline]
    pub fn from_filename(filename: &str) -> Self {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Word,
            "pptx" => Self::PowerPoint,
            "doc" | "ppt" => Self::LegacyOffice,
            _ => Self::PlainText,
        }
    }
}

/// Produces raw text from document bytes of one type
pub trait DocumentExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl DocumentExtractor for PdfExtractor {
    #[inline]
    fn name(&self) -> &'static str {
        "pdf"
    }

    #[inline]
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        // pdf-extract panics on some malformed inputs
        match panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ExtractionError::Pdf(e.to_string())),
            Err(_) => Err(ExtractionError::Pdf("parser panicked".to_string())),
        }
    }
}

/// Best-effort UTF-8 decoding; undecodable bytes are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    #[inline]
    fn name(&self) -> &'static str {
        "text"
    }

    #[inline]
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        Ok(match String::from_utf8_lossy(bytes) {
            Cow::Borrowed(text) => text.to_string(),
            Cow::Owned(text) => text.replace(char::REPLACEMENT_CHARACTER, ""),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyOfficeExtractor;

impl DocumentExtractor for LegacyOfficeExtractor {
    #[inline]
    fn name(&self) -> &'static str {
        "legacy-office"
    }

    #[inline]
    fn extract(&self, _bytes: &[u8]) -> Result<String, ExtractionError> {
        Err(ExtractionError::Unsupported(
            "binary .doc/.ppt documents".to_string(),
        ))
    }
}

/// Pick the extractor for a filename
#[inline]
pub fn extractor_for(filename: &str) -> Box<dyn DocumentExtractor> {
    match FileKind::from_filename(filename) {
        FileKind::Pdf => Box::new(PdfExtractor),
        FileKind::Word => Box::new(WordExtractor),
        FileKind::PowerPoint => Box::new(PowerPointExtractor),
        FileKind::LegacyOffice => Box::new(LegacyOfficeExtractor),
        FileKind::PlainText => Box::new(PlainTextExtractor),
    }
}

/// Extract raw text, or an empty string when the document can't be read
#[inline]
pub fn extract_text(bytes: &[u8], filename: &str) -> String {
    let extractor = extractor_for(filename);
    match extractor.extract(bytes) {
        Ok(text) => {
            debug!(
                "Extracted {} chars from {} using {} extractor",
                text.len(),
                filename,
                extractor.name()
            );
            text
        }
        Err(e) => {
            warn!("Skipping content of {}: {}", filename, e);
            String::new()
        }
    }
}

/// Collapse whitespace and split words that extraction glued together.
/// Text the boundary patterns fail on normalizes to an empty string.
#[inline]
pub fn normalize_text(text: &str) -> String {
    try_normalize_text(text).unwrap_or_else(|e| {
        warn!("Discarding {} chars of text: {}", text.len(), e);
        String::new()
    })
}

fn try_normalize_text(text: &str) -> Result<String, ExtractionError> {
    let mut text = text.split_whitespace().join(" ");
    for boundary in [&LOWER_UPPER, &LETTER_DIGIT, &DIGIT_LETTER] {
        text = space_at_matches(boundary, &text)?;
    }
    Ok(text)
}

/// Insert a space at the start of every match of `boundary`
fn space_at_matches(boundary: &Regex, text: &str) -> Result<String, fancy_regex::Error> {
    let mut spaced = String::with_capacity(text.len());
    let mut last = 0;
    for found in boundary.find_iter(text) {
        let at = found?.start();
        spaced.push_str(&text[last..at]);
        spaced.push(' ');
        last = at;
    }
    spaced.push_str(&text[last..]);
    Ok(spaced)
}

/// [`extract_text`] followed by [`normalize_text`]
#[inline]
pub fn extract_normalized(bytes: &[u8], filename: &str) -> String {
    normalize_text(&extract_text(bytes, filename))
}

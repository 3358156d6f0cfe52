use fancy_regex::Regex;
use std::io::{Cursor, Read};
use std::sync::LazyLock;
use zip::ZipArchive;

use super::{DocumentExtractor, ExtractionError};

/// Either a paragraph end (group 1 absent) or a text run (group 1)
static TEXT_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</[wa]:p>|<[wa]:t(?:\s[^>]*)?>([^<]*)</[wa]:t>").expect("run pattern is valid")
});
static SLIDE_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ppt/slides/slide([0-9]+)\.xml$").expect("slide pattern is valid")
});

const WORD_DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, Default)]
pub struct WordExtractor;

impl DocumentExtractor for WordExtractor {
    #[inline]
    fn name(&self) -> &'static str {
        "docx"
    }

    #[inline]
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let xml = read_part(&mut archive, WORD_DOCUMENT_PART)?;
        xml_text(&xml)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PowerPointExtractor;

impl DocumentExtractor for PowerPointExtractor {
    #[inline]
    fn name(&self) -> &'static str {
        "pptx"
    }

    #[inline]
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let mut slides: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|name| {
                let captures = SLIDE_PART.captures(name).ok()??;
                let number = captures.get(1)?.as_str().parse().ok()?;
                Some((number, name.to_string()))
            })
            .collect();
        // slide10.xml must follow slide9.xml
        slides.sort_by_key(|(number, _)| *number);

        let mut texts = Vec::with_capacity(slides.len());
        for (_, part) in slides {
            let xml = read_part(&mut archive, &part)?;
            let text = xml_text(&xml)?;
            if !text.trim().is_empty() {
                texts.push(text);
            }
        }

        Ok(texts.join("\n"))
    }
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String, ExtractionError> {
    let mut part = archive.by_name(name)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Concatenate `w:t` / `a:t` runs, one line per paragraph
fn xml_text(xml: &str) -> Result<String, ExtractionError> {
    let mut text = String::with_capacity(xml.len() / 4);

    for captures in TEXT_RUN.captures_iter(xml) {
        let captures = captures.map_err(|e| ExtractionError::Xml(e.to_string()))?;
        match captures.get(1) {
            Some(run) => text.push_str(&unescape_xml(run.as_str())),
            None => text.push('\n'),
        }
    }

    Ok(text)
}

fn unescape_xml(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

use super::*;
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn office_archive(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("should start zip entry");
        writer
            .write_all(body.as_bytes())
            .expect("should write zip entry");
    }
    writer.finish().expect("should finish archive").into_inner()
}

fn slide_xml(text: &str) -> String {
    format!(
        r#"<p:sld><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
        text
    )
}

#[test]
fn file_kind_dispatch() {
    assert_eq!(FileKind::from_filename("notes.PDF"), FileKind::Pdf);
    assert_eq!(FileKind::from_filename("essay.docx"), FileKind::Word);
    assert_eq!(FileKind::from_filename("deck.Pptx"), FileKind::PowerPoint);
    assert_eq!(FileKind::from_filename("old.doc"), FileKind::LegacyOffice);
    assert_eq!(FileKind::from_filename("old.ppt"), FileKind::LegacyOffice);
    assert_eq!(FileKind::from_filename("readme.md"), FileKind::PlainText);
    assert_eq!(FileKind::from_filename("no_extension"), FileKind::PlainText);
}

#[test]
fn normalize_collapses_whitespace() {
    assert_eq!(
        normalize_text("  Coral   reefs\n\n\tare  alive  "),
        "Coral reefs are alive"
    );
}

#[test]
fn normalize_splits_glued_words() {
    assert_eq!(normalize_text("coralReefs"), "coral Reefs");
    assert_eq!(normalize_text("chapter3begins"), "chapter 3 begins");
    assert_eq!(normalize_text("Page12of40"), "Page 12 of 40");
    // Upper followed by lower is a normal word start
    assert_eq!(normalize_text("Coral"), "Coral");
}

#[test]
fn boundary_match_failure_is_an_error() {
    let runaway = fancy_regex::RegexBuilder::new(r"(?<=a)(?=(a+)+b)")
        .backtrack_limit(100)
        .build()
        .expect("pattern should compile");
    let text = "a".repeat(40);

    assert!(space_at_matches(&runaway, &text).is_err());
    assert_eq!(
        space_at_matches(&LOWER_UPPER, "coralReef").expect("should match"),
        "coral Reef"
    );
}

#[test]
fn normalize_empty() {
    assert_eq!(normalize_text(""), "");
    assert_eq!(normalize_text(" \n\t "), "");
}

#[test]
fn plain_text_passthrough() {
    let text = extract_text("Sea anemones host clownfish.".as_bytes(), "notes.txt");
    assert_eq!(text, "Sea anemones host clownfish.");
}

#[test]
fn plain_text_drops_invalid_bytes() {
    let bytes = [b'c', b'o', 0xff, b'r', b'a', b'l'];
    assert_eq!(extract_text(&bytes, "notes.txt"), "coral");
}

#[test]
fn corrupt_pdf_yields_empty_string() {
    let text = extract_text(b"%PDF-1.4 definitely not a pdf body", "broken.pdf");
    assert_eq!(text, "");
}

#[test]
fn corrupt_docx_yields_empty_string() {
    assert_eq!(extract_text(b"not a zip archive", "broken.docx"), "");
}

#[test]
fn legacy_office_is_unsupported() {
    assert_eq!(extract_text(b"\xd0\xcf\x11\xe0", "old.doc"), "");
    assert!(matches!(
        LegacyOfficeExtractor.extract(b""),
        Err(ExtractionError::Unsupported(_))
    ));
}

#[test]
fn docx_paragraphs_and_entities() {
    let xml = r#"<w:document><w:body><w:p><w:r><w:t>Reef</w:t></w:r><w:r><w:t xml:space="preserve"> health &amp; bleaching</w:t></w:r></w:p><w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p></w:body></w:document>"#;
    let bytes = office_archive(&[("word/document.xml", xml)]);

    let text = extract_text(&bytes, "lecture.docx");
    assert_eq!(text, "Reef health & bleaching\nSecond paragraph\n");
    assert_eq!(
        extract_normalized(&bytes, "lecture.docx"),
        "Reef health & bleaching Second paragraph"
    );
}

#[test]
fn docx_without_document_part_is_empty() {
    let bytes = office_archive(&[("word/styles.xml", "<w:styles/>")]);
    assert_eq!(extract_text(&bytes, "lecture.docx"), "");
}

#[test]
fn pptx_slides_in_numeric_order() {
    let slide1 = slide_xml("First slide");
    let slide2 = slide_xml("Second slide");
    let slide10 = slide_xml("Tenth slide");
    let bytes = office_archive(&[
        ("ppt/slides/slide10.xml", slide10.as_str()),
        ("ppt/slides/slide2.xml", slide2.as_str()),
        ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>"),
        ("ppt/slides/slide1.xml", slide1.as_str()),
    ]);

    let text = extract_normalized(&bytes, "deck.pptx");
    assert_eq!(text, "First slide Second slide Tenth slide");
}

#[test]
fn extractor_names() {
    assert_eq!(extractor_for("a.pdf").name(), "pdf");
    assert_eq!(extractor_for("a.docx").name(), "docx");
    assert_eq!(extractor_for("a.pptx").name(), "pptx");
    assert_eq!(extractor_for("a.ppt").name(), "legacy-office");
    assert_eq!(extractor_for("a.txt").name(), "text");
}

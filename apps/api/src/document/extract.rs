//! Format detection and format-specific extractors.
//!
//! ## Supported formats
//! - PDF via `pdf-extract`
//! - Word (.docx) via `docx-rs`
//! - Markdown (syntax stripped)
//! - Plain text
//!
//! Each extractor returns raw text plus extractor-specific notes. The caller runs the
//! shared cleaning stage afterwards.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::document::models::{DocumentFormat, ParseError};

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// OLE2 compound file: legacy .doc, or an encrypted OOXML package.
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const MIME_PDF: &str = "application/pdf";
const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const MIME_DOC: &str = "application/msword";

/// A PDF page with fewer words than this is likely a scanned image.
const MIN_WORDS_PER_PDF_PAGE: usize = 25;

pub const NOTE_PDF_IMAGE_ONLY: &str =
    "This PDF contains very little selectable text; it may be a scanned image. Results may be incomplete.";
pub const NOTE_DOCX_TABLES: &str =
    "Complex formatting (tables) detected; some layout may not have been preserved.";
pub const NOTE_DOCX_IMAGES: &str =
    "Images detected; text inside images cannot be read.";

/// Raw extractor output, before the shared cleaning stage.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: String,
    pub notes: Vec<String>,
}

/// Picks the extractor. The declared MIME type wins; a missing or generic one falls back to the
/// filename extension.
pub fn detect_format(
    mime: Option<&str>,
    filename: Option<&str>,
) -> Result<DocumentFormat, ParseError> {
    let declared = mime
        .map(|m| m.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty() && m != "application/octet-stream");

    if let Some(m) = declared.as_deref() {
        if let Some(format) = format_for_mime(m)? {
            return Ok(format);
        }
    }

    if let Some(name) = filename {
        if let Some(guessed) = mime_guess::from_path(name).first_raw() {
            if let Some(format) = format_for_mime(guessed)? {
                return Ok(format);
            }
        }
        let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md") | Some("markdown") => return Ok(DocumentFormat::Markdown),
            Some("txt") | Some("text") => return Ok(DocumentFormat::PlainText),
            _ => {}
        }
    }

    Err(ParseError::UnsupportedFormat(
        declared
            .or_else(|| filename.map(String::from))
            .unwrap_or_else(|| "unknown".to_string()),
    ))
}

fn format_for_mime(mime: &str) -> Result<Option<DocumentFormat>, ParseError> {
    Ok(match mime {
        MIME_PDF => Some(DocumentFormat::Pdf),
        MIME_DOCX => Some(DocumentFormat::Docx),
        "text/markdown" | "text/x-markdown" => Some(DocumentFormat::Markdown),
        "text/plain" => Some(DocumentFormat::PlainText),
        MIME_DOC => return Err(ParseError::LegacyFormat("Word 97-2003 (.doc)".to_string())),
        _ => None,
    })
}

pub fn extract(format: DocumentFormat, bytes: &[u8]) -> Result<Extraction, ParseError> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::Markdown => Ok(Extraction {
            text: strip_markdown(&decode_text(bytes)),
            notes: vec![],
        }),
        DocumentFormat::PlainText => Ok(Extraction {
            text: decode_text(bytes),
            notes: vec![],
        }),
    }
}

/// UTF-8 with the BOM removed. Invalid sequences become U+FFFD, which the quality check flags.
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ────────────────────────────────────────────────────────────────────────────
// PDF
// ────────────────────────────────────────────────────────────────────────────

fn extract_pdf(bytes: &[u8]) -> Result<Extraction, ParseError> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ParseError::Corrupted(
            "file does not start with a PDF header".to_string(),
        ));
    }
    if contains(bytes, b"/Encrypt") {
        return Err(ParseError::Encrypted);
    }

    // pdf-extract can panic on malformed fonts/glyphs
    let pages = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    })) {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            warn!("PDF extraction failed: {e}");
            return Err(ParseError::Corrupted(format!("PDF could not be read: {e}")));
        }
        Err(_) => {
            warn!("PDF extraction panicked");
            return Err(ParseError::Corrupted(
                "PDF structure could not be parsed".to_string(),
            ));
        }
    };
    if pages.is_empty() {
        return Err(ParseError::Corrupted("PDF has no readable pages".to_string()));
    }

    let mut notes = Vec::new();
    let sparse = pages
        .iter()
        .filter(|page| page.split_whitespace().count() < MIN_WORDS_PER_PDF_PAGE)
        .count();
    if sparse * 2 > pages.len() {
        debug!("PDF looks image-only: {sparse} of {} pages have almost no text", pages.len());
        notes.push(NOTE_PDF_IMAGE_ONLY.to_string());
    }

    Ok(Extraction {
        text: pages.join("\n\n"),
        notes,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// DOCX
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct DocxStats {
    tables: usize,
    drawings: usize,
}

fn extract_docx(bytes: &[u8]) -> Result<Extraction, ParseError> {
    if bytes.starts_with(OLE_MAGIC) {
        return Err(if contains(bytes, &utf16le("EncryptedPackage")) {
            ParseError::Encrypted
        } else {
            ParseError::LegacyFormat("Word 97-2003 (.doc)".to_string())
        });
    }
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(ParseError::Corrupted(
            "file is not a valid .docx archive".to_string(),
        ));
    }

    let doc = docx_rs::read_docx(bytes)
        .map_err(|e| ParseError::Corrupted(format!("Word document could not be read: {e}")))?;

    let mut text = String::new();
    let mut stats = DocxStats::default();
    for child in &doc.document.children {
        push_docx_child(child, &mut text, &mut stats);
    }

    let mut notes = Vec::new();
    if stats.tables > 0 {
        notes.push(NOTE_DOCX_TABLES.to_string());
    }
    if stats.drawings > 0 {
        notes.push(NOTE_DOCX_IMAGES.to_string());
    }

    Ok(Extraction { text, notes })
}

fn push_docx_child(element: &docx_rs::DocumentChild, out: &mut String, stats: &mut DocxStats) {
    match element {
        docx_rs::DocumentChild::Paragraph(para) => {
            push_paragraph(&para.children, out, stats);
            out.push('\n');
        }
        docx_rs::DocumentChild::Table(table) => {
            stats.tables += 1;
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(tr) = row;
                for cell in &tr.cells {
                    let docx_rs::TableRowChild::TableCell(tc) = cell;
                    for content in &tc.children {
                        if let docx_rs::TableCellContent::Paragraph(para) = content {
                            push_paragraph(&para.children, out, stats);
                            out.push(' ');
                        }
                    }
                }
                out.push('\n');
            }
        }
        _ => {}
    }
}

fn push_paragraph(children: &[docx_rs::ParagraphChild], out: &mut String, stats: &mut DocxStats) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => push_run(run, out, stats),
            docx_rs::ParagraphChild::Hyperlink(link) => {
                for inner in &link.children {
                    if let docx_rs::ParagraphChild::Run(run) = inner {
                        push_run(run, out, stats);
                    }
                }
            }
            _ => {}
        }
    }
}

fn push_run(run: &docx_rs::Run, out: &mut String, stats: &mut DocxStats) {
    for child in &run.children {
        match child {
            docx_rs::RunChild::Text(t) => out.push_str(&t.text),
            docx_rs::RunChild::Tab(_) => out.push(' '),
            docx_rs::RunChild::Break(_) => out.push('\n'),
            docx_rs::RunChild::Drawing(_) => stats.drawings += 1,
            _ => {}
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Markdown
// ────────────────────────────────────────────────────────────────────────────

static MD_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(```|~~~).*$").expect("valid regex"));
static MD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+").expect("valid regex"));
static MD_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]{0,3}>[ \t]?").expect("valid regex"));
static MD_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]{0,3}([-*_][ \t]*){3,}$").expect("valid regex"));
static MD_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^([ \t]*)[-*+][ \t]+").expect("valid regex"));
static MD_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("valid regex"));
static MD_BOLD_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"));
static MD_BOLD_UNDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_]+)__").expect("valid regex"));
static MD_ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").expect("valid regex"));
static MD_ITALIC_UNDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b_([^_\n]+)_\b").expect("valid regex"));
static MD_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));

/// Removes Markdown syntax while keeping the readable text. Order matters: rules and list markers
/// go before emphasis so a leading `*` is not mistaken for italics.
fn strip_markdown(md: &str) -> String {
    let text = MD_FENCE.replace_all(md, "");
    let text = MD_RULE.replace_all(&text, "");
    let text = MD_HEADING.replace_all(&text, "");
    let text = MD_QUOTE.replace_all(&text, "");
    let text = MD_LIST.replace_all(&text, "${1}- ");
    let text = MD_IMAGE.replace_all(&text, "${1}");
    let text = MD_LINK.replace_all(&text, "${1}");
    let text = MD_BOLD_STAR.replace_all(&text, "${1}");
    let text = MD_BOLD_UNDER.replace_all(&text, "${1}");
    let text = MD_ITALIC_STAR.replace_all(&text, "${1}");
    let text = MD_ITALIC_UNDER.replace_all(&text, "${1}");
    MD_CODE.replace_all(&text, "${1}").into_owned()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_prefers_declared_mime() {
        let f = detect_format(Some("application/pdf"), Some("resume.docx")).unwrap();
        assert_eq!(f, DocumentFormat::Pdf);
    }

    #[test]
    fn test_detect_mime_with_parameters() {
        let f = detect_format(Some("text/plain; charset=utf-8"), None).unwrap();
        assert_eq!(f, DocumentFormat::PlainText);
    }

    #[test]
    fn test_detect_falls_back_to_extension() {
        assert_eq!(
            detect_format(None, Some("Resume.DOCX")).unwrap(),
            DocumentFormat::Docx
        );
        assert_eq!(
            detect_format(Some("application/octet-stream"), Some("cv.pdf")).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            detect_format(Some(""), Some("cv.md")).unwrap(),
            DocumentFormat::Markdown
        );
        assert_eq!(
            detect_format(None, Some("cv.txt")).unwrap(),
            DocumentFormat::PlainText
        );
    }

    #[test]
    fn test_detect_unknown_mime_uses_extension() {
        let f = detect_format(Some("application/x-unknown"), Some("cv.pdf")).unwrap();
        assert_eq!(f, DocumentFormat::Pdf);
    }

    #[test]
    fn test_detect_unsupported() {
        let err = detect_format(Some("image/png"), Some("photo.png")).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
        assert!(matches!(
            detect_format(None, None),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_detect_legacy_doc() {
        assert!(matches!(
            detect_format(Some("application/msword"), None),
            Err(ParseError::LegacyFormat(_))
        ));
        assert!(matches!(
            detect_format(None, Some("old.doc")),
            Err(ParseError::LegacyFormat(_))
        ));
    }

    #[test]
    fn test_pdf_without_header_is_corrupted() {
        let err = extract(DocumentFormat::Pdf, b"this is not a pdf at all").unwrap_err();
        assert!(matches!(err, ParseError::Corrupted(_)));
    }

    #[test]
    fn test_encrypted_pdf_detected() {
        let bytes = b"%PDF-1.7\n1 0 obj\n<< /Filter /Standard >>\ntrailer\n<< /Encrypt 1 0 R >>\n%%EOF";
        assert_eq!(
            extract(DocumentFormat::Pdf, bytes).unwrap_err(),
            ParseError::Encrypted
        );
    }

    #[test]
    fn test_truncated_pdf_is_corrupted() {
        let bytes = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog";
        assert!(matches!(
            extract(DocumentFormat::Pdf, bytes),
            Err(ParseError::Corrupted(_))
        ));
    }

    /// Single-page PDF, one Helvetica line per entry, with correct xref offsets. `padding` bytes
    /// of comment stand in for embedded images.
    fn pdf_with_lines(lines: &[&str], padding: usize) -> Vec<u8> {
        let mut content = String::from("BT\n/F1 12 Tf\n72 720 Td\n");
        for line in lines {
            content.push_str(&format!("({line}) Tj\n0 -14 Td\n"));
        }
        content.push_str("ET\n");

        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!("<< /Length {} >>\nstream\n{content}endstream", content.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        if padding > 0 {
            pdf.push(b'%');
            pdf.extend(std::iter::repeat(b'x').take(padding));
            pdf.push(b'\n');
        }
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
        }
        let xref = pdf.len();
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            tail.push_str(&format!("{offset:010} 00000 n \n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        ));
        pdf.extend_from_slice(tail.as_bytes());
        pdf
    }

    const RESUME_LINES: &[&str] = &[
        "Jane Doe - Senior Backend Engineer",
        "Seattle WA - jane at example dot com",
        "Experience",
        "Acme Corp - Staff Engineer - 2019 to 2024",
        "Led the migration of billing services to Rust and tokio",
        "Cut p99 latency by forty percent across the payments API",
        "Rebuilt the deployment infra-",
        "structure on Kubernetes with zero downtime",
        "Mentored six engineers and ran the on-call rotation",
        "Skills",
        "Rust Go PostgreSQL Kafka Terraform AWS",
    ];

    #[test]
    fn test_pdf_text_is_extracted_and_normalized() {
        use crate::document::models::RawDocument;
        use crate::document::normalize;

        let bytes = pdf_with_lines(RESUME_LINES, 0);
        let extraction = extract(DocumentFormat::Pdf, &bytes).unwrap();
        assert!(extraction.text.contains("Jane Doe"));
        assert!(extraction.notes.is_empty());

        let raw = RawDocument::new(
            bytes,
            Some("application/pdf".to_string()),
            Some("resume.pdf".to_string()),
        );
        let doc = normalize(raw.into()).unwrap();
        // the split word counts once after repair
        let expected: usize =
            RESUME_LINES.iter().map(|l| l.split_whitespace().count()).sum::<usize>() - 1;
        assert_eq!(doc.word_count, expected);
        assert_eq!(doc.page_count, 1);
        assert_eq!(doc.format, DocumentFormat::Pdf);
        assert!(doc.text.contains("deployment infrastructure on Kubernetes"));
        assert!(!doc.text.contains("infra-"));
    }

    #[test]
    fn test_pdf_large_file_with_real_text_is_not_image_only() {
        let bytes = pdf_with_lines(RESUME_LINES, 900_000);
        let extraction = extract(DocumentFormat::Pdf, &bytes).unwrap();
        assert!(!extraction.notes.contains(&NOTE_PDF_IMAGE_ONLY.to_string()));
    }

    #[test]
    fn test_pdf_with_almost_no_text_is_image_only() {
        let bytes = pdf_with_lines(&["Scanned resume"], 0);
        let extraction = extract(DocumentFormat::Pdf, &bytes).unwrap();
        assert_eq!(extraction.notes, vec![NOTE_PDF_IMAGE_ONLY.to_string()]);
    }

    #[test]
    fn test_docx_not_zip_is_corrupted() {
        let err = extract(DocumentFormat::Docx, b"plain bytes pretending to be docx").unwrap_err();
        assert!(matches!(err, ParseError::Corrupted(_)));
    }

    #[test]
    fn test_ole_container_is_legacy_doc() {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            extract(DocumentFormat::Docx, &bytes),
            Err(ParseError::LegacyFormat(_))
        ));
    }

    #[test]
    fn test_ole_with_encrypted_package_is_encrypted() {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        bytes.extend_from_slice(&utf16le("EncryptedPackage"));
        assert_eq!(
            extract(DocumentFormat::Docx, &bytes).unwrap_err(),
            ParseError::Encrypted
        );
    }

    #[test]
    fn test_docx_round_trip_text() {
        use docx_rs::{Docx, Paragraph, Run};

        let mut buf = std::io::Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Jane Doe")))
            .add_paragraph(
                Paragraph::new().add_run(Run::new().add_text("Senior Backend Engineer")),
            )
            .build()
            .pack(&mut buf)
            .unwrap();

        let extraction = extract(DocumentFormat::Docx, buf.get_ref()).unwrap();
        assert!(extraction.text.contains("Jane Doe"));
        assert!(extraction.text.contains("Senior Backend Engineer"));
        assert!(extraction.notes.is_empty());
    }

    #[test]
    fn test_docx_table_adds_note() {
        use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

        let table = Table::new(vec![TableRow::new(vec![
            TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text("Rust"))),
            TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text("Go"))),
        ])]);
        let mut buf = std::io::Cursor::new(Vec::new());
        Docx::new().add_table(table).build().pack(&mut buf).unwrap();

        let extraction = extract(DocumentFormat::Docx, buf.get_ref()).unwrap();
        assert!(extraction.text.contains("Rust"));
        assert!(extraction.notes.contains(&NOTE_DOCX_TABLES.to_string()));
    }

    #[test]
    fn test_strip_markdown() {
        let md = "# Jane Doe\n\n> Backend engineer\n\n* **Rust** and _Go_\n- Built [Acme API](https://acme.dev) with `tokio`\n\n---\n```\ncode\n```";
        let text = strip_markdown(md);
        assert!(text.contains("Jane Doe"));
        assert!(!text.contains('#'));
        assert!(text.contains("- Rust and Go"));
        assert!(text.contains("- Built Acme API with tokio"));
        assert!(!text.contains("https://"));
        assert!(!text.contains("```"));
        assert!(!text.contains("---"));
    }

    #[test]
    fn test_plain_text_bom_stripped() {
        let extraction = extract(DocumentFormat::PlainText, b"\xEF\xBB\xBFHello").unwrap();
        assert_eq!(extraction.text, "Hello");
    }

    #[test]
    fn test_invalid_utf8_becomes_replacement_char() {
        let extraction = extract(DocumentFormat::PlainText, b"Caf\xE9 owner").unwrap();
        assert!(extraction.text.contains('\u{FFFD}'));
    }
}

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceiling for any uploaded or pasted document.
pub const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

/// Anything smaller than this is treated as an empty upload.
pub const MIN_DOCUMENT_BYTES: usize = 50;

/// Words assumed to fit on one résumé page.
pub const WORDS_PER_PAGE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Markdown,
    PlainText,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::PlainText => "plain_text",
        }
    }
}

/// An uploaded file as received from the client. Only lives for the duration of one
/// normalization.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Bytes,
    pub mime: Option<String>,
    pub filename: Option<String>,
}

impl RawDocument {
    pub fn new(bytes: impl Into<Bytes>, mime: Option<String>, filename: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
            filename,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// What the normalizer accepts: a file, or text pasted straight into the form.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    File(RawDocument),
    Pasted(String),
}

impl From<RawDocument> for DocumentInput {
    fn from(raw: RawDocument) -> Self {
        DocumentInput::File(raw)
    }
}

/// The cleaned résumé text plus metrics. Exactly one of these is active per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDocument {
    pub text: String,
    pub word_count: usize,
    pub page_count: usize,
    pub warnings: Vec<String>,
    pub format: DocumentFormat,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Document is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("Document is empty or contains no readable text")]
    Empty,

    #[error("Unsupported document type: {0}")]
    UnsupportedFormat(String),

    #[error("Document appears to be corrupted: {0}")]
    Corrupted(String),

    #[error("Document is password-protected; remove the password and upload it again")]
    Encrypted,

    #[error("{0} files are not supported; save the document as .docx or .pdf and try again")]
    LegacyFormat(String),
}

impl ParseError {
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::TooLarge { .. } => "TOO_LARGE",
            ParseError::Empty => "EMPTY_DOCUMENT",
            ParseError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ParseError::Corrupted(_) => "CORRUPTED_DOCUMENT",
            ParseError::Encrypted => "ENCRYPTED_DOCUMENT",
            ParseError::LegacyFormat(_) => "LEGACY_FORMAT",
        }
    }
}

// Document Normalizer: raw upload or pasted text -> cleaned text, metrics and advisory warnings.
// Extraction is CPU-bound and must run inside tokio::task::spawn_blocking (see `normalize_async`).

pub mod clean;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod quality;

use tracing::info;

use crate::document::clean::clean_text;
use crate::document::extract::{detect_format, extract};
use crate::document::models::{
    DocumentFormat, DocumentInput, NormalizedDocument, ParseError, MAX_DOCUMENT_BYTES,
    MIN_DOCUMENT_BYTES, WORDS_PER_PAGE,
};
use crate::errors::AppError;

/// Normalizes one document. Pure: the same input always yields the same output.
///
/// Steps:
/// 1. size gate (too large / too small) before any parsing
/// 2. format dispatch (declared MIME, then extension)
/// 3. format-specific extraction
/// 4. shared cleaning stage
/// 5. metrics and advisory warnings
pub fn normalize(input: DocumentInput) -> Result<NormalizedDocument, ParseError> {
    let (format, filename, extraction) = match input {
        DocumentInput::File(raw) => {
            check_size(raw.size())?;
            let format = detect_format(raw.mime.as_deref(), raw.filename.as_deref())?;
            let extraction = extract(format, &raw.bytes)?;
            (format, raw.filename, extraction)
        }
        DocumentInput::Pasted(text) => {
            check_size(text.len())?;
            if text.trim().len() < MIN_DOCUMENT_BYTES {
                return Err(ParseError::Empty);
            }
            let extraction = extract(DocumentFormat::PlainText, text.as_bytes())?;
            (DocumentFormat::PlainText, None, extraction)
        }
    };

    let text = clean_text(&extraction.text, format);
    let word_count = text.split_whitespace().count();
    if word_count == 0 {
        return Err(ParseError::Empty);
    }
    let page_count = word_count.div_ceil(WORDS_PER_PAGE);

    let mut warnings = quality::assess(&text, word_count, page_count);
    warnings.extend(extraction.notes);

    info!(
        "Normalized {} document: {} words, ~{} pages, {} warnings",
        format.as_str(),
        word_count,
        page_count,
        warnings.len()
    );

    Ok(NormalizedDocument {
        text,
        word_count,
        page_count,
        warnings,
        format,
        filename,
    })
}

/// Runs `normalize` on the blocking pool so extraction never stalls the async executor.
pub async fn normalize_async(input: DocumentInput) -> Result<NormalizedDocument, AppError> {
    let result = tokio::task::spawn_blocking(move || normalize(input))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("normalization task failed: {e}")))?;
    Ok(result?)
}

fn check_size(size: usize) -> Result<(), ParseError> {
    if size > MAX_DOCUMENT_BYTES {
        return Err(ParseError::TooLarge {
            size,
            limit: MAX_DOCUMENT_BYTES,
        });
    }
    if size < MIN_DOCUMENT_BYTES {
        return Err(ParseError::Empty);
    }
    Ok(())
}

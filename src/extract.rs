//! PDF text extraction.
//!
//! Converts an uploaded PDF into `{raw_text, page_count}`. Extraction is an
//! external concern as far as the engine is concerned: a failure here marks
//! the document `Failed`, it is never an engine-internal error.

/// Extraction error. No panic; callers mark the document failed.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Empty,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Empty => write!(f, "PDF contained no extractable text"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Text and page count pulled out of a PDF.
#[derive(Debug, Clone)]
pub struct ExtractedPdf {
    pub raw_text: String,
    pub page_count: usize,
}

/// Extract plain text and a page count from PDF bytes.
///
/// The page count comes from the document catalog; if the catalog cannot be
/// parsed while text extraction still succeeds, pages are counted from the
/// form feeds the extractor emits between pages.
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedPdf, ExtractError> {
    let raw_text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    if raw_text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }

    let page_count = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc.get_pages().len(),
        Err(_) => raw_text.matches('\u{c}').count() + 1,
    };

    Ok(ExtractedPdf {
        raw_text,
        page_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}

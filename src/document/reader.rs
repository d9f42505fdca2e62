// src/document/reader.rs
use crate::utils::error::DocumentError;
use lopdf::Document;
use std::path::Path;

/// How the text of consecutive pages is joined into one document string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PageJoin {
    /// Insert a newline between pages
    #[default]
    Newline,
    /// Concatenate page text as-is
    None,
}

impl PageJoin {
    fn separator(self) -> &'static str {
        match self {
            PageJoin::Newline => "\n",
            PageJoin::None => "",
        }
    }
}

/// Reads a PDF from disk and returns its concatenated text.
pub fn read_pdf_text(path: &Path, join: PageJoin) -> Result<String, DocumentError> {
    tracing::info!("Reading PDF: {}", path.display());
    let bytes = std::fs::read(path)?;
    extract_text_from_bytes(&bytes, join)
}

/// Extracts the text of every page, in document order, from raw PDF bytes.
///
/// Empty input, non-PDF bytes and documents without pages are all reported as
/// `DocumentError::InvalidFormat`. A page that fails to decode aborts the whole
/// extraction.
pub fn extract_text_from_bytes(bytes: &[u8], join: PageJoin) -> Result<String, DocumentError> {
    if bytes.is_empty() {
        return Err(DocumentError::InvalidFormat("empty byte stream".to_string()));
    }

    let doc = Document::load_mem(bytes)
        .map_err(|e| DocumentError::InvalidFormat(e.to_string()))?;

    // BTreeMap keyed by page number, so iteration is already in document order
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(DocumentError::InvalidFormat("document has no pages".to_string()));
    }
    tracing::debug!("PDF loaded with {} page(s)", pages.len());

    let mut page_texts = Vec::with_capacity(pages.len());
    for page_num in pages.keys() {
        let text = doc
            .extract_text(&[*page_num])
            .map_err(|e| DocumentError::PageText {
                page: *page_num,
                reason: e.to_string(),
            })?;
        tracing::trace!("Page {}: {} chars", page_num, text.len());
        page_texts.push(text);
    }

    let text = page_texts.join(join.separator());
    tracing::info!("Extracted {} chars from {} page(s)", text.len(), page_texts.len());
    Ok(text)
}

//! PDF text extraction
//!
//! Turns an uploaded PDF into per-page plain text. Extraction quality is
//! whatever `lopdf` can recover; pages that yield no text are kept so page
//! numbers stay aligned with the source document.


use std::path::Path;

use lopdf::Document;
use tracing::{debug, warn};

use crate::{RagError, Result};

/// Text recovered from one page of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number
    pub number: u32,
    pub text: String,
}

/// Text recovered from a whole document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub pages: Vec<PageText>,
}

impl ExtractedDocument {
    /// Whether any page produced non-whitespace text
    #[inline]
    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|page| !page.text.trim().is_empty())
    }

    #[inline]
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|page| page.text.chars().count()).sum()
    }
}

/// Extract the text of every page of the PDF at `path`
#[inline]
pub fn extract_pdf(path: &Path) -> Result<ExtractedDocument> {
    let document = Document::load(path).map_err(|e| {
        RagError::Extraction(format!("Failed to parse PDF {}: {}", path.display(), e))
    })?;
    extract_document(&document)
}

/// Extract the text of every page of an in-memory PDF
#[inline]
pub fn extract_pdf_bytes(bytes: &[u8]) -> Result<ExtractedDocument> {
    let document = Document::load_mem(bytes)
        .map_err(|e| RagError::Extraction(format!("Failed to parse PDF: {}", e)))?;
    extract_document(&document)
}

fn extract_document(document: &Document) -> Result<ExtractedDocument> {
    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(RagError::Extraction("PDF has no pages".to_string()));
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        let text = match document.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not extract text from page {}: {}", number, e);
                String::new()
            }
        };
        pages.push(PageText { number, text });
    }

    let extracted = ExtractedDocument { pages };
    debug!(
        "Extracted {} chars from {} pages",
        extracted.char_count(),
        extracted.pages.len()
    );

    Ok(extracted)
}

//! services/api/src/adapters/extract.rs
//!
//! Page extraction for the supported upload formats. Implements the `PageExtractor`
//! port by dispatching on the declared content type.

use async_trait::async_trait;
use study_core::ports::{PageExtractor, PortError, PortResult};
use tracing::warn;

pub const CONTENT_TYPE_PDF: &str = "application/pdf";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Content types that can be uploaded and turned into pages.
pub const SUPPORTED_CONTENT_TYPES: [&str; 2] = [CONTENT_TYPE_PDF, CONTENT_TYPE_TEXT];

/// Strips parameters such as `; charset=utf-8` and normalizes case.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Extracts pages from PDF and plain-text documents.
#[derive(Clone, Default)]
pub struct FormatExtractor;

impl FormatExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PageExtractor for FormatExtractor {
    async fn extract(&self, content: &[u8], content_type: &str) -> PortResult<Vec<String>> {
        match essence(content_type).as_str() {
            CONTENT_TYPE_TEXT => extract_text_pages(content),
            CONTENT_TYPE_PDF => {
                let bytes = content.to_vec();
                // PDF parsing is CPU-bound; keep it off the async workers.
                tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes))
                    .await
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
            }
            other => Err(PortError::UnsupportedFormat(other.to_string())),
        }
    }

    fn supports(&self, content_type: &str) -> bool {
        SUPPORTED_CONTENT_TYPES.contains(&essence(content_type).as_str())
    }
}

/// A plain-text file is a single page; an all-blank file is one empty page.
fn extract_text_pages(content: &[u8]) -> PortResult<Vec<String>> {
    let text = std::str::from_utf8(content)
        .map_err(|e| PortError::ExtractionFailed(format!("text is not valid UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        Ok(vec![String::new()])
    } else {
        Ok(vec![text.to_string()])
    }
}

fn extract_pdf_pages(content: &[u8]) -> PortResult<Vec<String>> {
    let document = lopdf::Document::load_mem(content)
        .map_err(|e| PortError::ExtractionFailed(format!("unreadable PDF: {}", e)))?;

    // `get_pages` is keyed by 1-based page number, in order.
    let pages = document.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => texts.push(text.trim().to_string()),
            Err(e) => {
                // Keep the slot so later page numbers stay aligned.
                warn!("No text layer on PDF page {}: {}", page_number, e);
                texts.push(String::new());
            }
        }
    }
    Ok(texts)
}

//! Source document loading.
//!
//! PDFs are split into one [`Document`] per page; plain-text files become a
//! single document.

use std::path::Path;

use tracing::{debug, info};

use crate::document::{Document, Metadata};
use crate::error::{Error, Result};

/// File name of `path`, used as the `source` of every document it yields.
#[must_use]
pub fn source_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Load a PDF, one document per page.
///
/// Extraction runs on the blocking pool. A panic inside the PDF parser is
/// reported as [`Error::Pdf`] like any other extraction failure.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its text extracted.
pub async fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    info!("Loading PDF: {}", path.display());
    let bytes = tokio::fs::read(path).await?;

    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| Error::pdf(path, format!("extraction aborted: {e}")))?
        .map_err(|e| Error::pdf(path, e.to_string()))?;

    let documents = pages_to_documents(&source_name(path), pages);
    info!("Loaded {} pages from {}", documents.len(), path.display());
    Ok(documents)
}

/// Load a UTF-8 text file as a single document.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn load_text(path: &Path) -> Result<Vec<Document>> {
    let content = tokio::fs::read_to_string(path).await?;
    debug!("Loaded {} bytes of text from {}", content.len(), path.display());
    Ok(vec![Document::new(
        content,
        Metadata::from_source(source_name(path)),
    )])
}

/// Load any supported source, choosing the loader by extension.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn load(path: &Path) -> Result<Vec<Document>> {
    let is_text = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md"));

    if is_text {
        load_text(path).await
    } else {
        load_pdf(path).await
    }
}

fn pages_to_documents(source: &str, pages: Vec<String>) -> Vec<Document> {
    pages
        .into_iter()
        .zip(1u32..)
        .map(|(text, page)| {
            let mut metadata = Metadata::from_source(source);
            metadata.page = Some(page);
            Document::new(text, metadata)
        })
        .collect()
}

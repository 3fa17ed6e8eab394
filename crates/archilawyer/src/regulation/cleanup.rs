//! Page-level cleanup of extracted regulation text.
//!
//! PDF extraction leaves running headers, the announcement line, footnote
//! blocks and hyphenated line breaks in the text. [`TextCleaner`] removes or
//! marks them before the text is restructured.

use tracing::{debug, info};

use super::patterns::{
    TextPattern, ANNOTATED_WORD, FOOTER_BLOCK, HYPHENATED_WORD, NUMBER_PAREN,
};
use crate::config::PreprocessConfig;
use crate::document::Document;
use crate::error::Result;

/// Applies the cleanup steps to page text.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    prefix: TextPattern,
    page_header: TextPattern,
    footer: TextPattern,
    annotation: TextPattern,
    number_paren: TextPattern,
    hyphenated: TextPattern,
}

impl TextCleaner {
    /// Build a cleaner using the configured prefix and header patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if either configured pattern is not a valid regex.
    pub fn from_config(config: &PreprocessConfig) -> Result<Self> {
        Ok(Self {
            prefix: TextPattern::try_new("document_prefix", &config.document_prefix_pattern)?,
            page_header: TextPattern::try_new("page_header", &config.page_header_pattern)?,
            footer: TextPattern::new("footer", FOOTER_BLOCK),
            annotation: TextPattern::new("annotation", ANNOTATED_WORD),
            number_paren: TextPattern::new("number_paren", NUMBER_PAREN),
            hyphenated: TextPattern::new("hyphenated", HYPHENATED_WORD),
        })
    }

    /// Replace every running page header with a single newline.
    #[must_use]
    pub fn remove_page_header(&self, text: &str) -> String {
        self.page_header.replace_all(text, "\n")
    }

    /// Drop the announcement line when the text starts with it.
    #[must_use]
    pub fn strip_document_prefix(&self, text: &str) -> String {
        match self.prefix.find(text) {
            Some(m) if m.start() == 0 => text[m.end()..].trim().to_string(),
            _ => text.to_string(),
        }
    }

    /// Wrap the footnote block at the end of a page in `<przypisy>` tags.
    #[must_use]
    pub fn wrap_footer(&self, text: &str) -> String {
        self.footer
            .replace_with(text, |caps| {
                format!("{}<przypisy>\n{}\n</przypisy>\n", &caps[1], &caps[2])
            })
    }

    /// Mark footnote references: `budynku1)` becomes
    /// `budynku <przypis>1</przypis>`.
    #[must_use]
    pub fn link_annotations(&self, text: &str) -> String {
        let linked = self
            .annotation
            .replace_all(text, "${1} <przypis>${2}</przypis>");
        self.number_paren.replace_all(&linked, "${1}")
    }

    /// Join words hyphenated across a line break.
    #[must_use]
    pub fn merge_hyphenated_words(&self, text: &str) -> String {
        self.hyphenated.replace_all(text, "${1}${2}")
    }

    /// Run every cleanup step in order and trim the result.
    #[must_use]
    pub fn preprocess_text(&self, text: &str) -> String {
        let text = self.remove_page_header(text);
        let text = self.strip_document_prefix(&text);
        let text = self.wrap_footer(&text);
        let text = self.link_annotations(&text);
        let text = self.merge_hyphenated_words(&text);
        text.trim().to_string()
    }

    /// Clean every page, keeping its metadata.
    #[must_use]
    pub fn preprocess_documents(&self, documents: &[Document]) -> Vec<Document> {
        info!("Preprocessing {} documents", documents.len());
        let cleaned: Vec<Document> = documents
            .iter()
            .map(|doc| doc.with_content(self.preprocess_text(&doc.content)))
            .collect();
        debug!("Completed preprocessing documents");
        cleaned
    }
}

impl Default for TextCleaner {
    fn default() -> Self {
        let config = PreprocessConfig::default();
        Self {
            prefix: TextPattern::new("document_prefix", &config.document_prefix_pattern),
            page_header: TextPattern::new("page_header", &config.page_header_pattern),
            footer: TextPattern::new("footer", FOOTER_BLOCK),
            annotation: TextPattern::new("annotation", ANNOTATED_WORD),
            number_paren: TextPattern::new("number_paren", NUMBER_PAREN),
            hyphenated: TextPattern::new("hyphenated", HYPHENATED_WORD),
        }
    }
}

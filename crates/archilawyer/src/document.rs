//! Core document types for archilawyer.
//!
//! A [`Document`] is any piece of regulation text moving through the
//! pipeline: a PDF page, a restructured section or paragraph, or a chunk
//! ready for embedding.

use serde::{Deserialize, Serialize};

/// Where a piece of text came from.
///
/// Serialized flat; absent fields are omitted so the same shape can be
/// stored as vector metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// File name of the source document (no directories).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// 1-based page number for page documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Section (`DZIAŁ`) ordinal; 0 is the introduction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<u32>,

    /// Paragraph ordinal across the whole document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraph_id: Option<u32>,

    /// Chunk ordinal within its parent document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<u32>,
}

impl Metadata {
    /// Metadata naming only the source file.
    #[must_use]
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }
}

/// A piece of regulation text with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// The text.
    pub content: String,

    /// Provenance.
    pub metadata: Metadata,
}

impl Document {
    /// Create a new document.
    #[must_use]
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// A document with the same metadata and different text.
    #[must_use]
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self::new(content, self.metadata.clone())
    }

    /// Stable identifier derived from the source name and text.
    ///
    /// Used as the vector id, so ingesting the same chunk twice overwrites
    /// the earlier vector.
    #[must_use]
    pub fn id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        if let Some(source) = &self.metadata.source {
            hasher.update(source.as_bytes());
        }
        hasher.update(&[0]);
        hasher.update(self.content.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Number of characters in the text.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Whether the text is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_stable() {
        let doc = Document::new("Rozdział 1", Metadata::from_source("D20191065.pdf"));
        assert_eq!(doc.id(), doc.clone().id());
        assert_eq!(doc.id().len(), 64);
    }

    #[test]
    fn test_document_id_depends_on_source_and_content() {
        let a = Document::new("text", Metadata::from_source("a.pdf"));
        let b = Document::new("text", Metadata::from_source("b.pdf"));
        let c = Document::new("other", Metadata::from_source("a.pdf"));
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_document_id_ignores_positions() {
        let mut a = Document::new("text", Metadata::from_source("a.pdf"));
        let b = a.clone();
        a.metadata.chunk = Some(3);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_with_content_keeps_metadata() {
        let mut metadata = Metadata::from_source("a.pdf");
        metadata.page = Some(7);
        let doc = Document::new("old", metadata);
        let updated = doc.with_content("new");
        assert_eq!(updated.content, "new");
        assert_eq!(updated.metadata.page, Some(7));
    }

    #[test]
    fn test_char_len_counts_characters() {
        let doc = Document::new("DZIAŁ", Metadata::default());
        assert_eq!(doc.char_len(), 5);
        assert!(!doc.is_blank());
        assert!(Document::new(" \n", Metadata::default()).is_blank());
    }

    #[test]
    fn test_metadata_serialization_omits_absent_fields() {
        let mut metadata = Metadata::from_source("a.pdf");
        metadata.section_id = Some(2);
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, serde_json::json!({"source": "a.pdf", "section_id": 2}));
    }
}

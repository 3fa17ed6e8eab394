//! Recursive character text splitting.
//!
//! Text is split on the coarsest separator it contains (paragraph, line,
//! word, character), pieces that are still too long are split again with the
//! finer separators, and the pieces are merged back into chunks of at most
//! `chunk_size` characters. Consecutive chunks share up to `chunk_overlap`
//! characters of trailing pieces so a sentence cut at a boundary still
//! appears whole in one of them.

use std::collections::VecDeque;

use tracing::debug;

use crate::document::Document;
use crate::error::{Error, Result};

/// Separators tried in order, coarsest first.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Splits text into overlapping chunks bounded by a character count.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Create a splitter with the default separators.
    ///
    /// # Errors
    ///
    /// Returns an error if `chunk_size` is zero or `chunk_overlap` is not
    /// smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid_config("chunk_size must be greater than 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::invalid_config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    /// Maximum chunk length in characters.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split a text into chunks.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every document, keeping its metadata and numbering the chunks.
    #[must_use]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let chunks: Vec<Document> = documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .zip(0u32..)
                    .map(|(text, ordinal)| {
                        let mut chunk = doc.with_content(text);
                        chunk.metadata.chunk = Some(ordinal);
                        chunk
                    })
            })
            .collect();

        debug!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator.as_str()).collect()
        };

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<&str> = Vec::new();

        for piece in pieces.into_iter().filter(|p| !p.is_empty()) {
            if char_len(piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }

            if !short_pieces.is_empty() {
                chunks.extend(self.merge(&short_pieces, &separator));
                short_pieces.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !short_pieces.is_empty() {
            chunks.extend(self.merge(&short_pieces, &separator));
        }

        chunks
    }

    /// Merge short pieces into chunks, carrying the overlap forward.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_joined(&mut chunks, &current, separator);

                // Drop leading pieces until what remains fits as overlap
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { separator_len }
                            > self.chunk_size)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(first) + if current.is_empty() { 0 } else { separator_len };
                }
            }

            let joiner = if current.is_empty() { 0 } else { separator_len };
            current.push_back(piece);
            total += len + joiner;
        }

        push_joined(&mut chunks, &current, separator);
        chunks
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (String, &'a [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator.as_str()) {
            return (separator.clone(), &separators[i + 1..]);
        }
    }
    (String::new(), &[])
}

fn push_joined(chunks: &mut Vec<String>, pieces: &VecDeque<&str>, separator: &str) {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    #[test]
    fn test_rejects_invalid_sizes() {
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = TextSplitter::new(1000, 100).unwrap();
        let chunks = splitter.split_text("  Rozdział 1\nPrzepisy ogólne  ");
        assert_eq!(chunks, vec!["Rozdział 1\nPrzepisy ogólne"]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("\n\n  \n").is_empty());
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = TextSplitter::new(50, 10).unwrap();
        let text = "Budynek powinien być zaprojektowany i wykonany w sposób \
                    zapewniający spełnienie wymagań podstawowych dotyczących \
                    bezpieczeństwa konstrukcji oraz bezpieczeństwa pożarowego.";
        let chunks = splitter.split_text(text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {chunk}");
        }
    }

    #[test]
    fn test_overlap_is_carried() {
        let splitter = TextSplitter::new(12, 6).unwrap();
        let chunks = splitter.split_text("aaa bbb ccc ddd eee");

        assert_eq!(chunks, vec!["aaa bbb ccc", "ccc ddd eee"]);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(30, 0).unwrap();
        let chunks = splitter.split_text("first paragraph here\n\nsecond paragraph here");
        assert_eq!(chunks, vec!["first paragraph here", "second paragraph here"]);
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let splitter = TextSplitter::new(4, 0).unwrap();
        let chunks = splitter.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_multibyte_characters() {
        let splitter = TextSplitter::new(3, 0).unwrap();
        let chunks = splitter.split_text("żółćęą");
        assert_eq!(chunks, vec!["żół", "ćęą"]);
    }

    #[test]
    fn test_split_documents_keeps_metadata() {
        let splitter = TextSplitter::new(12, 0).unwrap();
        let mut metadata = Metadata::from_source("a.pdf");
        metadata.page = Some(3);
        let docs = vec![Document::new("aaa bbb ccc ddd eee", metadata)];

        let chunks = splitter.split_documents(&docs);
        assert_eq!(chunks.len(), 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.source.as_deref(), Some("a.pdf"));
            assert_eq!(chunk.metadata.page, Some(3));
            assert_eq!(chunk.metadata.chunk, Some(u32::try_from(i).unwrap()));
        }
    }
}

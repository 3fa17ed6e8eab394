//! Regulation-aware preprocessing.
//!
//! The [`Profile::TechnicalConditions`] profile cleans and regroups the
//! Polish regulation on technical conditions for buildings so each document
//! names the `DZIAŁ` it belongs to. [`Profile::Plain`] passes pages through.

mod cleanup;
mod patterns;
mod structure;

pub use cleanup::TextCleaner;
pub use patterns::TextPattern;
pub use structure::{int_to_roman, section_header, Structurer, APPENDIX_HEADER, INTRO_HEADER};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PreprocessConfig;
use crate::document::Document;
use crate::error::Result;

/// How pages are turned into documents before splitting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Use the pages as extracted.
    #[default]
    Plain,

    /// Clean and restructure the Polish technical-conditions regulation.
    TechnicalConditions,
}

impl Profile {
    /// Turn loaded pages into documents.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured cleanup pattern is invalid.
    pub fn apply(self, pages: Vec<Document>, config: &PreprocessConfig) -> Result<Vec<Document>> {
        match self {
            Self::Plain => Ok(pages.into_iter().filter(|doc| !doc.is_blank()).collect()),
            Self::TechnicalConditions => {
                let structurer = Structurer::new(TextCleaner::from_config(config)?);
                Ok(structurer.process_documents(&pages))
            }
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::TechnicalConditions => write!(f, "technical-conditions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    #[test]
    fn test_plain_drops_blank_pages() {
        let pages = vec![
            Document::new("tekst", Metadata::from_source("a.pdf")),
            Document::new("  \n", Metadata::from_source("a.pdf")),
        ];
        let docs = Profile::Plain
            .apply(pages, &PreprocessConfig::default())
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "tekst");
    }

    #[test]
    fn test_technical_conditions_adds_headers() {
        let pages = vec![Document::new(
            "DZIAŁ I\nPrzepisy ogólne\n§ 1. Tekst",
            Metadata::from_source("a.pdf"),
        )];
        let docs = Profile::TechnicalConditions
            .apply(pages, &PreprocessConfig::default())
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.starts_with("<dział>\n  <nazwa>DZIAŁ I</nazwa>"));
    }

    #[test]
    fn test_profile_display_matches_serde() {
        for profile in [Profile::Plain, Profile::TechnicalConditions] {
            let json = serde_json::to_value(profile).unwrap();
            assert_eq!(json, serde_json::json!(profile.to_string()));
        }
    }
}

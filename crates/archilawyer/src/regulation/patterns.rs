//! Regex patterns recognising the layout of Polish regulation texts.
//!
//! The structural markers (`DZIAŁ`, `Rozdział`, `Załącznik`) tolerate the
//! stray spaces PDF extraction inserts between letters.

use regex::{Captures, Regex};

use crate::error::{Error, Result};

/// Section marker: `DZIAŁ` followed by a Roman numeral.
pub const SECTION_MARKER: &str = r"D\s*Z\s*I\s*A\s*Ł\s+[IVXLCDM]+";

/// Chapter marker: `Rozdział` followed by a number and optional letter.
pub const PARAGRAPH_MARKER: &str = r"R\s*o\s*z\s*d\s*z\s*i\s*ał\s+\d+[a-z]?";

/// Appendix marker: `Załącznik nr N` followed by an uppercase title.
pub const APPENDIX_MARKER: &str = r"Załącznik nr \d+\s*\n[\p{Lu}\s]+";

/// Footnote block: everything after the first blank line of a page.
pub const FOOTER_BLOCK: &str = r"(?m)(\n\s*\n)(\S[\s\S]*)$";

/// A word immediately followed by a footnote reference such as `budynku1)`.
pub const ANNOTATED_WORD: &str = r"(\b[a-zA-Z]+\w*)(\d+\))";

/// A number closed by a parenthesis, as left over by footnote references.
pub const NUMBER_PAREN: &str = r"(\d+)\)";

/// A word broken across lines with a hyphen.
pub const HYPHENATED_WORD: &str = r"(\w+)-\s*\n\s*(\w+)";

/// A compiled, named text pattern.
#[derive(Debug, Clone)]
pub struct TextPattern {
    /// Name of the pattern for identification.
    pub name: &'static str,

    /// The compiled regex.
    regex: Regex,
}

impl TextPattern {
    /// Create a new pattern from a known-good expression.
    ///
    /// # Panics
    ///
    /// Panics if the regex pattern is invalid.
    #[must_use]
    pub fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("Invalid regex pattern"),
        }
    }

    /// Create a pattern from user-supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the expression does not compile.
    pub fn try_new(name: &'static str, pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(|regex| Self { name, regex })
            .map_err(|e| Error::invalid_config(format!("invalid {name} pattern: {e}")))
    }

    /// Check if the text contains a match.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// First match in the text.
    #[must_use]
    pub fn find<'a>(&self, text: &'a str) -> Option<regex::Match<'a>> {
        self.regex.find(text)
    }

    /// Find all matches in the text.
    pub fn find_all<'a>(
        &self,
        text: &'a str,
    ) -> impl Iterator<Item = regex::Match<'a>> + use<'a, '_> {
        self.regex.find_iter(text)
    }

    /// Replace every match with `replacement` (`$1`-style groups allowed).
    #[must_use]
    pub fn replace_all(&self, text: &str, replacement: &str) -> String {
        self.regex.replace_all(text, replacement).into_owned()
    }

    /// Replace the first match using a closure over its captures.
    #[must_use]
    pub fn replace_with(&self, text: &str, f: impl FnMut(&Captures<'_>) -> String) -> String {
        self.regex.replace(text, f).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_marker_tolerates_spacing() {
        let pattern = TextPattern::new("section", SECTION_MARKER);
        assert!(pattern.matches("DZIAŁ I"));
        assert!(pattern.matches("D Z I A Ł  XII"));
        assert!(!pattern.matches("DZIAŁANIE"));
        assert!(!pattern.matches("Dział I"));
    }

    #[test]
    fn test_paragraph_marker() {
        let pattern = TextPattern::new("paragraph", PARAGRAPH_MARKER);
        assert!(pattern.matches("Rozdział 1"));
        assert!(pattern.matches("R o z d z i ał 3a"));
        assert!(!pattern.matches("Rozdziału"));
    }

    #[test]
    fn test_appendix_marker() {
        let pattern = TextPattern::new("appendix", APPENDIX_MARKER);
        assert!(pattern.matches("Załącznik nr 1 \nWYMAGANIA IZOLACYJNOŚCI\n"));
        assert!(!pattern.matches("Załącznik nr 1 do rozporządzenia"));
    }

    #[test]
    fn test_hyphenated_word() {
        let pattern = TextPattern::new("hyphen", HYPHENATED_WORD);
        assert!(pattern.matches("budy-\nnek"));
        assert!(!pattern.matches("biało-czerwony"));
    }

    #[test]
    fn test_try_new_rejects_invalid() {
        let err = TextPattern::try_new("header", "[broken").unwrap_err();
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_find_all() {
        let pattern = TextPattern::new("paragraph", PARAGRAPH_MARKER);
        let text = "Rozdział 1\ntekst\nRozdział 2\ntekst";
        let starts: Vec<_> = pattern.find_all(text).map(|m| m.start()).collect();
        assert_eq!(starts, vec![0, 18]);
    }
}

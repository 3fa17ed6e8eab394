//! Section, chapter and appendix restructuring.
//!
//! Cleaned pages are regrouped so every document carries a `<dział>` header
//! naming the part of the regulation it comes from. Retrieval then returns
//! passages that say where in the regulation they sit.

use tracing::{debug, info};

use super::cleanup::TextCleaner;
use super::patterns::{TextPattern, APPENDIX_MARKER, PARAGRAPH_MARKER, SECTION_MARKER};
use crate::document::{Document, Metadata};

/// Header of the text preceding the first `DZIAŁ`.
pub const INTRO_HEADER: &str = "<dział>\n  <nazwa>WSTĘP</nazwa>\n</dział>\n";

/// Header of every appendix document.
pub const APPENDIX_HEADER: &str = "<dział>\n  <nazwa>ZAŁĄCZNIKI</nazwa>\n</dział>\n";

const HEADER_OPEN: &str = "<dział>";
const HEADER_CLOSE: &str = "</dział>";

/// Convert a positive integer to Roman numerals. Zero yields an empty string.
#[must_use]
pub fn int_to_roman(mut num: u32) -> String {
    const NUMERALS: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut roman = String::new();
    for (value, symbol) in NUMERALS {
        while num >= value {
            roman.push_str(symbol);
            num -= value;
        }
    }
    roman
}

/// Header opening section `section_id`.
#[must_use]
pub fn section_header(section_id: u32, title: &str) -> String {
    format!(
        "<dział>\n  <nazwa>DZIAŁ {}</nazwa>\n  <tytuł>{title}</tytuł>\n</dział>\n",
        int_to_roman(section_id)
    )
}

/// The `<dział>…</dział>` header at the start of `text`, if any.
fn leading_header(text: &str) -> &str {
    if !text.starts_with(HEADER_OPEN) {
        return "";
    }
    text.find(HEADER_CLOSE)
        .map_or("", |end| &text[..end + HEADER_CLOSE.len()])
}

/// Whether `text` has anything besides its header.
fn has_body(text: &str) -> bool {
    !text[leading_header(text).len()..].trim().is_empty()
}

/// Regroups cleaned pages into sections, chapters and appendixes.
#[derive(Debug, Clone)]
pub struct Structurer {
    cleaner: TextCleaner,
    section: TextPattern,
    paragraph: TextPattern,
    appendix: TextPattern,
}

impl Structurer {
    /// Create a structurer that cleans pages with `cleaner`.
    #[must_use]
    pub fn new(cleaner: TextCleaner) -> Self {
        Self {
            cleaner,
            section: TextPattern::new("section", SECTION_MARKER),
            paragraph: TextPattern::new("paragraph", PARAGRAPH_MARKER),
            appendix: TextPattern::new("appendix", APPENDIX_MARKER),
        }
    }

    /// Whether the text opens a new `DZIAŁ`.
    #[must_use]
    pub fn contains_new_section(&self, text: &str) -> bool {
        self.section.matches(text)
    }

    /// Group pages into sections.
    ///
    /// Text before the first marker forms the introduction (section 0). A
    /// page with a marker closes the current section with the text before
    /// the marker and opens the next one, titled by the line after the
    /// marker. Only the first marker on a page is honoured.
    #[must_use]
    pub fn restructure_by_sections(&self, pages: &[Document]) -> Vec<Document> {
        let Some(first) = pages.first() else {
            return Vec::new();
        };

        let mut sections = Vec::new();
        let mut section_id = 0;
        let mut current = Document::new(
            INTRO_HEADER,
            Metadata {
                source: first.metadata.source.clone(),
                section_id: Some(section_id),
                ..Metadata::default()
            },
        );

        for page in pages {
            let text = page.content.as_str();
            let Some(marker) = self.section.find(text) else {
                current.content.push_str(text);
                current.content.push('\n');
                continue;
            };

            let before = &text[..marker.start()];
            if !before.trim().is_empty() {
                current.content.push_str(before);
            }
            if has_body(&current.content) {
                sections.push(current);
            }

            let (title, after) = split_title(&text[marker.end()..]);
            section_id += 1;
            debug!("Section {section_id}: {title}");

            let mut content = section_header(section_id, title);
            if !after.is_empty() {
                content.push_str(after);
                if !after.ends_with('\n') {
                    content.push('\n');
                }
            }
            current = Document::new(
                content,
                Metadata {
                    source: page.metadata.source.clone(),
                    section_id: Some(section_id),
                    ..Metadata::default()
                },
            );
        }

        sections.push(current);
        sections
    }

    /// Split sections at every `Rozdział` marker.
    ///
    /// Each piece is prefixed with its section header unless it already
    /// starts with it. Paragraph ids increase across all sections; a section
    /// without markers passes through whole with its own id.
    #[must_use]
    pub fn restructure_by_paragraphs(&self, sections: &[Document]) -> Vec<Document> {
        let mut paragraphs = Vec::new();
        let mut paragraph_id = 0;

        for section in sections {
            let text = section.content.as_str();
            let header = leading_header(text);
            let mut bounds: Vec<usize> = self.paragraph.find_all(text).map(|m| m.start()).collect();

            if bounds.is_empty() {
                let mut doc = section.clone();
                doc.metadata.paragraph_id = Some(paragraph_id);
                paragraphs.push(doc);
                paragraph_id += 1;
                continue;
            }

            bounds.insert(0, 0);
            bounds.push(text.len());

            for window in bounds.windows(2) {
                let segment = text[window[0]..window[1]].trim();
                if !has_body(segment) {
                    continue;
                }

                let content = if header.is_empty() || segment.starts_with(header) {
                    segment.to_string()
                } else {
                    format!("{header}\n{segment}")
                };

                let mut doc = section.with_content(content);
                doc.metadata.paragraph_id = Some(paragraph_id);
                paragraphs.push(doc);
                paragraph_id += 1;
            }
        }

        paragraphs
    }

    /// Split appendixes out of a document.
    ///
    /// Returns the text before the first appendix (or the whole document
    /// when it has none) and one document per appendix, headed with
    /// [`APPENDIX_HEADER`]. A preamble holding only a header is dropped.
    #[must_use]
    pub fn split_appendixes(&self, document: &Document) -> (Option<Document>, Vec<Document>) {
        let text = document.content.as_str();
        let mut bounds: Vec<usize> = self.appendix.find_all(text).map(|m| m.start()).collect();

        let Some(&first) = bounds.first() else {
            return (Some(document.clone()), Vec::new());
        };

        let preamble = text[..first].trim();
        let preamble = has_body(preamble).then(|| document.with_content(preamble));

        bounds.push(text.len());
        let appendixes = bounds
            .windows(2)
            .map(|window| {
                let appendix = text[window[0]..window[1]].trim();
                document.with_content(format!("{APPENDIX_HEADER}{appendix}"))
            })
            .collect();

        (preamble, appendixes)
    }

    /// Appendix documents only.
    #[must_use]
    pub fn extract_appendixes(&self, document: &Document) -> Vec<Document> {
        self.split_appendixes(document).1
    }

    /// Clean, group and split pages into retrieval-ready documents.
    ///
    /// Appendixes are looked for in the last document only, where the
    /// regulation places them.
    #[must_use]
    pub fn process_documents(&self, pages: &[Document]) -> Vec<Document> {
        let cleaned = self.cleaner.preprocess_documents(pages);

        info!("Restructuring documents by sections");
        let sections = self.restructure_by_sections(&cleaned);

        info!("Restructuring {} sections by paragraphs", sections.len());
        let mut documents = self.restructure_by_paragraphs(&sections);

        info!("Extracting appendixes");
        if let Some(last) = documents.pop() {
            let (preamble, appendixes) = self.split_appendixes(&last);
            debug!("Found {} appendixes", appendixes.len());
            documents.extend(preamble);
            documents.extend(appendixes);
        }

        info!("Completed processing into {} documents", documents.len());
        documents
    }
}

impl Default for Structurer {
    fn default() -> Self {
        Self::new(TextCleaner::default())
    }
}

/// Split the text following a section marker into its title line and body.
fn split_title(rest: &str) -> (&str, &str) {
    let Some(newline) = rest.find('\n') else {
        return ("", "");
    };
    let rest = &rest[newline + 1..];
    match rest.find('\n') {
        Some(end) => (rest[..end].trim(), &rest[end + 1..]),
        None => (rest.trim(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str, page: u32) -> Document {
        let mut metadata = Metadata::from_source("D20191065.pdf");
        metadata.page = Some(page);
        Document::new(text, metadata)
    }

    #[test]
    fn test_int_to_roman() {
        assert_eq!(int_to_roman(1), "I");
        assert_eq!(int_to_roman(4), "IV");
        assert_eq!(int_to_roman(9), "IX");
        assert_eq!(int_to_roman(14), "XIV");
        assert_eq!(int_to_roman(1994), "MCMXCIV");
        assert_eq!(int_to_roman(0), "");
    }

    #[test]
    fn test_contains_new_section() {
        let structurer = Structurer::default();
        assert!(structurer.contains_new_section("tekst\nDZIAŁ III\nBudynki"));
        assert!(!structurer.contains_new_section("w dziale III"));
    }

    #[test]
    fn test_restructure_by_sections() {
        let structurer = Structurer::default();
        let pages = vec![
            page("Przepisy wstępne", 1),
            page("ciąg dalszy\nDZIAŁ I\nPrzepisy ogólne\n§ 1. Rozporządzenie", 2),
            page("§ 2. Dalej", 3),
            page("DZIAŁ II\nZabudowa\n§ 3. Budynek", 4),
        ];

        let sections = structurer.restructure_by_sections(&pages);
        assert_eq!(sections.len(), 3);

        assert_eq!(
            sections[0].content,
            format!("{INTRO_HEADER}Przepisy wstępne\nciąg dalszy\n")
        );
        assert_eq!(sections[0].metadata.section_id, Some(0));

        assert_eq!(
            sections[1].content,
            "<dział>\n  <nazwa>DZIAŁ I</nazwa>\n  <tytuł>Przepisy ogólne</tytuł>\n</dział>\n\
             § 1. Rozporządzenie\n§ 2. Dalej\n"
        );
        assert_eq!(sections[1].metadata.section_id, Some(1));
        assert_eq!(sections[1].metadata.source.as_deref(), Some("D20191065.pdf"));
        assert_eq!(sections[1].metadata.page, None);

        assert!(sections[2].content.contains("<tytuł>Zabudowa</tytuł>"));
        assert!(sections[2].content.ends_with("§ 3. Budynek\n"));
    }

    #[test]
    fn test_section_opening_page_ends_with_newline() {
        let structurer = Structurer::default();
        let pages = vec![
            page("DZIAŁ I\nPrzepisy ogólne\nkoniec strony", 1),
            page("następna strona", 2),
        ];

        let sections = structurer.restructure_by_sections(&pages);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].content.contains("koniec strony\nnastępna strona\n"));
        assert!(!sections[0].content.contains("stronynastępna"));
    }

    #[test]
    fn test_empty_intro_is_dropped() {
        let structurer = Structurer::default();
        let pages = vec![page("DZIAŁ I\nPrzepisy ogólne\n§ 1. Tekst", 1)];

        let sections = structurer.restructure_by_sections(&pages);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].metadata.section_id, Some(1));
    }

    #[test]
    fn test_section_marker_without_title() {
        let structurer = Structurer::default();
        let pages = vec![page("DZIAŁ IV", 1)];

        let sections = structurer.restructure_by_sections(&pages);
        assert_eq!(sections[0].content, section_header(1, ""));
    }

    #[test]
    fn test_no_pages_no_sections() {
        assert!(Structurer::default().restructure_by_sections(&[]).is_empty());
    }

    #[test]
    fn test_restructure_by_paragraphs() {
        let structurer = Structurer::default();
        let header = section_header(1, "Przepisy ogólne");
        let mut metadata = Metadata::from_source("D20191065.pdf");
        metadata.section_id = Some(1);
        let sections = vec![
            Document::new(
                format!("{header}Rozdział 1\n§ 1. Pierwszy\nRozdział 2\n§ 2. Drugi"),
                metadata.clone(),
            ),
            Document::new(format!("{INTRO_HEADER}Bez rozdziałów"), metadata),
        ];

        let paragraphs = structurer.restructure_by_paragraphs(&sections);
        assert_eq!(paragraphs.len(), 3);

        let header = header.trim_end();
        assert_eq!(
            paragraphs[0].content,
            format!("{header}\nRozdział 1\n§ 1. Pierwszy")
        );
        assert_eq!(
            paragraphs[1].content,
            format!("{header}\nRozdział 2\n§ 2. Drugi")
        );
        assert_eq!(paragraphs[2].content, format!("{INTRO_HEADER}Bez rozdziałów"));

        let ids: Vec<_> = paragraphs.iter().map(|p| p.metadata.paragraph_id).collect();
        assert_eq!(ids, vec![Some(0), Some(1), Some(2)]);
        assert!(paragraphs.iter().all(|p| p.metadata.section_id == Some(1)));
    }

    #[test]
    fn test_paragraph_text_before_first_marker_kept() {
        let structurer = Structurer::default();
        let header = section_header(2, "Zabudowa");
        let sections = vec![Document::new(
            format!("{header}Wstęp do działu\nRozdział 1\nTreść"),
            Metadata::default(),
        )];

        let paragraphs = structurer.restructure_by_paragraphs(&sections);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].content, format!("{header}Wstęp do działu"));
    }

    #[test]
    fn test_split_appendixes() {
        let structurer = Structurer::default();
        let doc = Document::new(
            format!(
                "{}\n§ 330. Koniec\nZałącznik nr 1 \nWYMAGANIA IZOLACYJNOŚCI\nTabela\n\
                 Załącznik nr 2\nOKREŚLENIA\nDefinicje",
                section_header(10, "Przepisy końcowe").trim_end()
            ),
            Metadata::from_source("D20191065.pdf"),
        );

        let (preamble, appendixes) = structurer.split_appendixes(&doc);
        let preamble = preamble.unwrap();
        assert!(preamble.content.ends_with("§ 330. Koniec"));

        assert_eq!(appendixes.len(), 2);
        assert_eq!(
            appendixes[0].content,
            format!("{APPENDIX_HEADER}Załącznik nr 1 \nWYMAGANIA IZOLACYJNOŚCI\nTabela")
        );
        assert!(appendixes[1].content.ends_with("OKREŚLENIA\nDefinicje"));
        assert_eq!(appendixes[1].metadata.source.as_deref(), Some("D20191065.pdf"));
        assert_eq!(structurer.extract_appendixes(&doc).len(), 2);
    }

    #[test]
    fn test_split_appendixes_without_appendix() {
        let structurer = Structurer::default();
        let doc = Document::new("§ 1. Tekst", Metadata::default());

        let (preamble, appendixes) = structurer.split_appendixes(&doc);
        assert_eq!(preamble, Some(doc));
        assert!(appendixes.is_empty());
    }

    #[test]
    fn test_process_documents() {
        let structurer = Structurer::default();
        let pages = vec![
            page(
                "Załącznik do obwieszczenia Ministra Inwestycji i Rozwoju z dnia 8 kwietnia \
                 2019 r. (poz. 1065)\nROZPORZĄDZENIE",
                1,
            ),
            page(
                "Dziennik Ustaw – 2 – Poz. 1065\nDZIAŁ I\nPrzepisy ogólne\nRozdział 1\n§ 1. Budyn-\nki",
                2,
            ),
            page("Załącznik nr 1\nTABELA\nWartości", 3),
        ];

        let docs = structurer.process_documents(&pages);
        assert_eq!(docs.len(), 3);
        assert!(docs[0].content.starts_with(INTRO_HEADER));
        assert!(docs[0].content.contains("ROZPORZĄDZENIE"));
        assert!(docs[1].content.contains("<tytuł>Przepisy ogólne</tytuł>"));
        assert!(docs[1].content.contains("§ 1. Budynki"));
        assert!(docs[2].content.starts_with(APPENDIX_HEADER));
        assert!(docs[2].content.contains("TABELA\nWartości"));
    }
}

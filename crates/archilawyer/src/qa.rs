//! Retrieval-grounded question answering.
//!
//! The chain embeds the question (prefixed with [`INSTRUCTION_PROMPT`]),
//! fetches the closest passages from the index, stuffs them into a prompt
//! that asks for a `SOURCES` section, and splits the completion into the
//! answer and its cited sources.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::llm::CompletionModel;
use crate::logging::timed;
use crate::regulation::TextPattern;
use crate::vector_store::{Match, VectorIndex};

/// Preamble placed before every retrieval question.
pub const INSTRUCTION_PROMPT: &str = "\
You're a specialized chatbot tasked with assisting architects by providing precise information on
British building regulations, as detailed in the provided document.

Ensure your answers are:
- Directly derived from the document's contents.
- Clear and concise, facilitating quick comprehension.
- Free of personal opinions or external advice.

In instances where the document does not contain the necessary information, or if you're uncertain, clearly state
this to the user, indicating that the response is based on best judgment rather than document specifics.

Question: ";

/// Template for answering without retrieval; `{issue}` is the question.
pub const DIRECT_PROMPT: &str = "\
You're a helpful chatbot designed to assist architects by providing quick, accurate legal information \
related to architectural practices, regulations, contracts, zoning laws, and more.
Please provide assistance with the following issue: {issue}";

/// Instructions opening the prompt that carries the retrieved passages.
const SOURCES_INSTRUCTIONS: &str = "\
Given the following extracted parts of a long document and a question, create a final answer with \
references (\"SOURCES\").
If you don't know the answer, just say that you don't know. Don't try to make up an answer.
ALWAYS return a \"SOURCES\" part in your answer.";

static SOURCES_MARKER: LazyLock<TextPattern> =
    LazyLock::new(|| TextPattern::new("sources", r"(?i)\bSOURCES?\s*:"));

// Models sometimes continue with a made-up follow-up question.
static QUESTION_MARKER: LazyLock<TextPattern> =
    LazyLock::new(|| TextPattern::new("question", r"QUESTION:\s"));

/// Shown when the answer cites nothing.
pub const NO_SOURCE: &str = "No specific source cited.";

/// A retrieved piece of regulation text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Vector id.
    pub id: String,

    /// Similarity score.
    pub score: f32,

    /// The passage text.
    pub content: String,

    /// Source file name, if recorded.
    pub source: Option<String>,

    /// Remaining metadata stored with the vector.
    pub metadata: Map<String, Value>,
}

/// The answer to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResponse {
    /// The question as asked.
    pub question: String,

    /// The model's answer without the sources section.
    pub answer: String,

    /// Sources cited by the model, as written.
    pub sources: Option<String>,

    /// Passages the answer was grounded on.
    pub passages: Vec<Passage>,
}

/// Fetches the passages closest to a query.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    text_key: String,
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retriever")
            .field("top_k", &self.top_k)
            .field("text_key", &self.text_key)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Create a retriever reading passage text from the `text_key`
    /// metadata field.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        text_key: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            text_key: text_key.into(),
        }
    }

    /// Use a different number of passages.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// The passages closest to `query`, best first.
    ///
    /// Matches without text under the text key are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the index query fails.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        let vector = self.embedder.embed_query(query).await?;
        let matches = self.index.query(&vector, self.top_k).await?;
        debug!("Retrieved {} matches", matches.len());

        Ok(matches
            .into_iter()
            .filter_map(|m| self.to_passage(m))
            .collect())
    }

    fn to_passage(&self, m: Match) -> Option<Passage> {
        let mut metadata = m.metadata;
        let content = match metadata.remove(&self.text_key) {
            Some(Value::String(text)) => text,
            _ => {
                warn!(
                    "Match {} has no '{}' text in its metadata, skipping",
                    m.id, self.text_key
                );
                return None;
            }
        };
        let source = metadata
            .get("source")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Passage {
            id: m.id,
            score: m.score,
            content,
            source,
            metadata,
        })
    }
}

/// Stuff passages and the question into the sources prompt.
#[must_use]
pub fn build_prompt(question: &str, passages: &[Passage]) -> String {
    let summaries = passages
        .iter()
        .map(|p| {
            format!(
                "Content: {}\nSource: {}",
                p.content,
                p.source.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{SOURCES_INSTRUCTIONS}\n\nQUESTION: {question}\n=========\n{summaries}\n=========\nFINAL ANSWER:"
    )
}

/// The prompt for answering without retrieval.
#[must_use]
pub fn build_direct_prompt(question: &str) -> String {
    DIRECT_PROMPT.replace("{issue}", question)
}

/// Split a completion into the answer and the text after `SOURCES:`.
///
/// The sources end where a following `QUESTION:` begins.
#[must_use]
pub fn split_sources(output: &str) -> (String, Option<String>) {
    match SOURCES_MARKER.find(output) {
        Some(m) => {
            let rest = &output[m.end()..];
            let end = QUESTION_MARKER.find(rest).map_or(rest.len(), |q| q.start());
            let sources = rest[..end].trim();
            (
                output[..m.start()].trim().to_string(),
                (!sources.is_empty()).then(|| sources.to_string()),
            )
        }
        None => (output.trim().to_string(), None),
    }
}

/// File names of the comma-separated sources, or [`NO_SOURCE`].
#[must_use]
pub fn render_source(sources: Option<&str>) -> String {
    let names: Vec<String> = sources
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Path::new(s)
                .file_name()
                .map_or_else(|| s.to_string(), |name| name.to_string_lossy().into_owned())
        })
        .collect();

    if names.is_empty() {
        NO_SOURCE.to_string()
    } else {
        names.join(", ")
    }
}

/// Answers questions with a retriever and a completion model.
#[derive(Clone)]
pub struct QaChain {
    retriever: Retriever,
    model: Arc<dyn CompletionModel>,
}

impl fmt::Debug for QaChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QaChain")
            .field("retriever", &self.retriever)
            .field("model", &self.model.name())
            .finish()
    }
}

impl QaChain {
    /// Create a chain.
    #[must_use]
    pub fn new(retriever: Retriever, model: Arc<dyn CompletionModel>) -> Self {
        Self { retriever, model }
    }

    /// The retriever used by this chain.
    #[must_use]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer a question from the indexed regulations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyQuestion`] for a blank question, or any error
    /// from the embedding, index or completion calls.
    pub async fn ask(&self, question: &str) -> Result<QaResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuestion);
        }

        let query = format!("{INSTRUCTION_PROMPT}{question}");
        let passages = timed("Retrieval", self.retriever.retrieve(&query)).await?;
        let prompt = build_prompt(&query, &passages);
        let output = timed("Completion", self.model.complete(&prompt)).await?;
        let (answer, sources) = split_sources(&output);

        Ok(QaResponse {
            question: question.to_string(),
            answer,
            sources,
            passages,
        })
    }

    /// Answer a question with the model alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyQuestion`] for a blank question, or the
    /// completion error.
    pub async fn ask_direct(&self, question: &str) -> Result<QaResponse> {
        answer_direct(self.model.as_ref(), question).await
    }
}

/// Answer a question with `model` alone, without retrieval.
///
/// # Errors
///
/// Returns [`Error::EmptyQuestion`] for a blank question, or the completion
/// error.
pub async fn answer_direct(model: &dyn CompletionModel, question: &str) -> Result<QaResponse> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::EmptyQuestion);
    }

    let output = timed("Completion", model.complete(&build_direct_prompt(question))).await?;
    Ok(QaResponse {
        question: question.to_string(),
        answer: output.trim().to_string(),
        sources: None,
        passages: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::vector_store::{IndexStats, Vector};

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct FakeIndex {
        matches: Vec<Match>,
        top_k: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn upsert(&self, vectors: Vec<Vector>) -> Result<usize> {
            Ok(vectors.len())
        }

        async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
            *self.top_k.lock().unwrap() = Some(top_k);
            Ok(self.matches.clone())
        }

        async fn stats(&self) -> Result<IndexStats> {
            Ok(IndexStats::default())
        }
    }

    struct FakeModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionModel for FakeModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn regulation_match(id: &str, text: &str) -> Match {
        let metadata = json!({"context": text, "source": "D20191065.pdf", "page": 12});
        Match {
            id: id.to_string(),
            score: 0.9,
            metadata: metadata.as_object().cloned().unwrap(),
        }
    }

    fn index(matches: Vec<Match>) -> Arc<FakeIndex> {
        Arc::new(FakeIndex {
            matches,
            top_k: Mutex::new(None),
        })
    }

    #[test]
    fn test_split_sources() {
        let (answer, sources) =
            split_sources(" Minimum 2,5 m.\nSOURCES: data/D20191065.pdf\n");
        assert_eq!(answer, "Minimum 2,5 m.");
        assert_eq!(sources.as_deref(), Some("data/D20191065.pdf"));
    }

    #[test]
    fn test_split_sources_case_and_spacing() {
        let (answer, sources) = split_sources("Answer. Sources : a.pdf, b.pdf");
        assert_eq!(answer, "Answer.");
        assert_eq!(sources.as_deref(), Some("a.pdf, b.pdf"));
    }

    #[test]
    fn test_split_sources_missing_or_empty() {
        assert_eq!(split_sources("Just text"), ("Just text".to_string(), None));
        assert_eq!(split_sources("Text\nSOURCES:  "), ("Text".to_string(), None));
    }

    #[test]
    fn test_split_sources_stops_at_next_question() {
        let (answer, sources) = split_sources(
            "Minimum 2,5 m.\nSOURCES: data/D20191065.pdf\nQUESTION: A schody?\n=========\nFINAL ANSWER: 1,2 m",
        );
        assert_eq!(answer, "Minimum 2,5 m.");
        assert_eq!(sources.as_deref(), Some("data/D20191065.pdf"));
        assert_eq!(render_source(sources.as_deref()), "D20191065.pdf");
    }

    #[test]
    fn test_render_source() {
        assert_eq!(render_source(Some("/data/D20191065.pdf")), "D20191065.pdf");
        assert_eq!(
            render_source(Some("data/a.pdf, data/b.pdf")),
            "a.pdf, b.pdf"
        );
        assert_eq!(render_source(None), NO_SOURCE);
        assert_eq!(render_source(Some(" ")), NO_SOURCE);
    }

    #[test]
    fn test_build_prompt_stuffs_passages() {
        let passages = vec![
            Passage {
                id: "1".into(),
                score: 0.9,
                content: "§ 72. Wysokość pomieszczeń".into(),
                source: Some("D20191065.pdf".into()),
                metadata: Map::new(),
            },
            Passage {
                id: "2".into(),
                score: 0.8,
                content: "§ 73. Antresola".into(),
                source: None,
                metadata: Map::new(),
            },
        ];

        let prompt = build_prompt("Jaka wysokość?", &passages);
        assert!(prompt.contains("QUESTION: Jaka wysokość?"));
        assert!(prompt.contains(
            "Content: § 72. Wysokość pomieszczeń\nSource: D20191065.pdf\n\nContent: § 73. Antresola\nSource: "
        ));
        assert!(prompt.ends_with("FINAL ANSWER:"));
    }

    #[test]
    fn test_build_prompt_keeps_braces_in_question() {
        let passages = vec![Passage {
            id: "1".into(),
            score: 0.9,
            content: "§ 242. Schody".into(),
            source: Some("D20191065.pdf".into()),
            metadata: Map::new(),
        }];

        let prompt = build_prompt("Co oznacza {summaries} i {question}?", &passages);
        assert!(prompt.contains("QUESTION: Co oznacza {summaries} i {question}?\n"));
        assert_eq!(prompt.matches("§ 242. Schody").count(), 1);
    }

    #[test]
    fn test_direct_prompt() {
        let prompt = build_direct_prompt("What's the allowed corridor width?");
        assert!(prompt.ends_with("following issue: What's the allowed corridor width?"));
        assert!(!prompt.contains("{issue}"));
    }

    #[tokio::test]
    async fn test_ask_grounds_answer_in_passages() {
        let index = index(vec![regulation_match("a", "§ 72. Wysokość pomieszczeń 2,5 m")]);
        let model = Arc::new(FakeModel::new("Co najmniej 2,5 m.\nSOURCES: D20191065.pdf"));
        let chain = QaChain::new(
            Retriever::new(Arc::new(FakeEmbedder), index.clone(), 5, "context"),
            model.clone(),
        );

        let response = chain.ask("  Jaka jest minimalna wysokość pokoju?  ").await.unwrap();
        assert_eq!(response.question, "Jaka jest minimalna wysokość pokoju?");
        assert_eq!(response.answer, "Co najmniej 2,5 m.");
        assert_eq!(response.sources.as_deref(), Some("D20191065.pdf"));
        assert_eq!(response.passages.len(), 1);
        assert_eq!(response.passages[0].source.as_deref(), Some("D20191065.pdf"));
        assert!(!response.passages[0].metadata.contains_key("context"));
        assert_eq!(*index.top_k.lock().unwrap(), Some(5));

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains(INSTRUCTION_PROMPT));
        assert!(prompts[0].contains("Content: § 72. Wysokość pomieszczeń 2,5 m"));
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_question() {
        let chain = QaChain::new(
            Retriever::new(Arc::new(FakeEmbedder), index(Vec::new()), 5, "context"),
            Arc::new(FakeModel::new("x")),
        );
        assert!(matches!(chain.ask("   ").await, Err(Error::EmptyQuestion)));
        assert!(matches!(chain.ask_direct("").await, Err(Error::EmptyQuestion)));
    }

    #[tokio::test]
    async fn test_matches_without_text_are_skipped() {
        let mut bare = regulation_match("b", "");
        bare.metadata.remove("context");
        let retriever = Retriever::new(
            Arc::new(FakeEmbedder),
            index(vec![bare, regulation_match("a", "tekst")]),
            5,
            "context",
        )
        .with_top_k(2);

        let passages = retriever.retrieve("pytanie").await.unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].id, "a");
    }

    #[tokio::test]
    async fn test_ask_direct_skips_retrieval() {
        let index = index(Vec::new());
        let model = Arc::new(FakeModel::new("  General advice.  "));
        let chain = QaChain::new(
            Retriever::new(Arc::new(FakeEmbedder), index.clone(), 5, "context"),
            model.clone(),
        );

        let response = chain.ask_direct("Corridor width?").await.unwrap();
        assert_eq!(response.answer, "General advice.");
        assert!(response.sources.is_none());
        assert!(index.top_k.lock().unwrap().is_none());
        assert!(model.prompts.lock().unwrap()[0].contains("Corridor width?"));
    }
}

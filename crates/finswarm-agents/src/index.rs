//! Keyword-scored retrieval over a parsed markdown report.
//!
//! Tables are split one row per chunk, and every row chunk repeats the
//! nearest heading plus the table header so a row never loses its column
//! names. The best chunks are handed to a `ChatModel` which writes the answer.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use finswarm_models::{Message, RagConfig};
use tracing::{debug, info};

use crate::error::AgentError;
use crate::llm::ChatModel;
use crate::rag_adapter::{BackendFactory, RetrievalBackend, RetrievalResponse, SourceNode};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "by", "did", "do", "does", "for", "from", "how", "in",
    "is", "it", "its", "of", "on", "or", "the", "to", "was", "were", "what", "which", "with",
];

const ANSWER_INSTRUCTIONS: &str = "You answer questions about financial reports. \
     Use only the provided context. Quote figures exactly as they appear. \
     If the context does not contain the answer, say so.";

#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    terms: HashSet<String>,
}

impl Chunk {
    fn new(text: String) -> Self {
        let terms = terms(&text).into_iter().collect();
        Self { text, terms }
    }
}

/// Builds a `DocumentIndex` from the markdown file at `data_path`.
pub struct DocumentIndexFactory {
    data_path: PathBuf,
    top_k: usize,
    chunk_chars: usize,
    model: Arc<dyn ChatModel>,
}

impl DocumentIndexFactory {
    pub fn new(
        data_path: impl Into<PathBuf>,
        top_k: usize,
        chunk_chars: usize,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            top_k,
            chunk_chars,
            model,
        }
    }

    pub fn from_config(config: &RagConfig, model: Arc<dyn ChatModel>) -> Self {
        Self::new(&config.data_path, config.top_k, config.chunk_chars, model)
    }
}

impl BackendFactory for DocumentIndexFactory {
    fn build(&self) -> Result<Arc<dyn RetrievalBackend>, AgentError> {
        if !self.data_path.exists() {
            return Err(AgentError::BackendUnavailable(format!(
                "RAG data not found at {}",
                self.data_path.display()
            )));
        }

        let markdown = std::fs::read_to_string(&self.data_path).map_err(|e| {
            AgentError::BackendUnavailable(format!(
                "Failed to read {}: {e}",
                self.data_path.display()
            ))
        })?;

        let chunks = chunk_markdown(&markdown, self.chunk_chars);
        if chunks.is_empty() {
            return Err(AgentError::BackendUnavailable(format!(
                "No indexable content in {}",
                self.data_path.display()
            )));
        }

        info!(
            path = %self.data_path.display(),
            chunks = chunks.len(),
            "Document index built"
        );

        Ok(Arc::new(DocumentIndex {
            chunks,
            top_k: self.top_k.max(1),
            model: Arc::clone(&self.model),
        }))
    }
}

pub struct DocumentIndex {
    chunks: Vec<Chunk>,
    top_k: usize,
    model: Arc<dyn ChatModel>,
}

impl DocumentIndex {
    /// Chunks sharing the most distinct terms with `question`, best first.
    /// Ties keep document order; chunks with no shared term are dropped.
    pub fn retrieve(&self, question: &str) -> Vec<&Chunk> {
        let query: HashSet<String> = terms(question).into_iter().collect();

        let mut scored: Vec<(usize, usize)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, query.intersection(&chunk.terms).count()))
            .filter(|(_, score)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(self.top_k)
            .map(|(i, _)| &self.chunks[i])
            .collect()
    }
}

#[async_trait]
impl RetrievalBackend for DocumentIndex {
    async fn query(&self, question: &str) -> Result<RetrievalResponse, AgentError> {
        let hits = self.retrieve(question);
        debug!(question, hits = hits.len(), "Retrieved chunks");

        if hits.is_empty() {
            return Ok(RetrievalResponse {
                text: "No relevant information found in the indexed documents.".to_string(),
                source_nodes: Vec::new(),
            });
        }

        let context = hits
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("[{}]\n{}", i + 1, chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = [
            Message::system(ANSWER_INSTRUCTIONS),
            Message::user(format!("Context:\n{context}\n\nQuestion: {question}")),
        ];
        let reply = self
            .model
            .invoke(&messages)
            .await
            .map_err(|e| AgentError::BackendQuery(format!("answer synthesis failed: {e}")))?;

        Ok(RetrievalResponse {
            text: reply.text,
            source_nodes: hits
                .into_iter()
                .map(|chunk| SourceNode {
                    content: chunk.text.clone(),
                })
                .collect(),
        })
    }
}

/// Split markdown into retrieval chunks of at most roughly `max_chars`.
pub fn chunk_markdown(markdown: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut heading: Option<&str> = None;
    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('|') {
            flush_paragraph(heading, &mut paragraph, max_chars, &mut chunks);
            table.push(trimmed);
            continue;
        }
        flush_table(heading, &mut table, &mut chunks);

        if trimmed.starts_with('#') {
            flush_paragraph(heading, &mut paragraph, max_chars, &mut chunks);
            heading = Some(trimmed);
        } else if trimmed.is_empty() {
            flush_paragraph(heading, &mut paragraph, max_chars, &mut chunks);
        } else {
            paragraph.push(trimmed);
        }
    }
    flush_table(heading, &mut table, &mut chunks);
    flush_paragraph(heading, &mut paragraph, max_chars, &mut chunks);

    chunks
}

fn with_heading(heading: Option<&str>, body: &str) -> String {
    match heading {
        Some(h) => format!("{h}\n{body}"),
        None => body.to_string(),
    }
}

fn flush_paragraph(
    heading: Option<&str>,
    paragraph: &mut Vec<&str>,
    max_chars: usize,
    out: &mut Vec<Chunk>,
) {
    if paragraph.is_empty() {
        return;
    }
    let body = paragraph.join("\n");
    paragraph.clear();
    for piece in split_chars(&body, max_chars) {
        out.push(Chunk::new(with_heading(heading, &piece)));
    }
}

fn flush_table(heading: Option<&str>, table: &mut Vec<&str>, out: &mut Vec<Chunk>) {
    let lines = std::mem::take(table);
    let Some((header, rest)) = lines.split_first() else {
        return;
    };
    let (prefix, rows) = match rest.split_first() {
        Some((separator, rows)) if is_separator_row(separator) => {
            (format!("{header}\n{separator}"), rows)
        }
        _ => (header.to_string(), rest),
    };

    if rows.is_empty() {
        out.push(Chunk::new(with_heading(heading, &prefix)));
    }
    for row in rows {
        out.push(Chunk::new(with_heading(heading, &format!("{prefix}\n{row}"))));
    }
}

fn is_separator_row(line: &str) -> bool {
    line.chars()
        .all(|c| matches!(c, '|' | '-' | ':' | ' '))
        && line.contains('-')
}

fn split_chars(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Lowercased alphanumeric terms, thousands separators removed, stopwords dropped.
fn terms(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace(',', "")
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

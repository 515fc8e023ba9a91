//! Query-time retrieval and context assembly

use crate::config::QueryConfig;
use crate::embed::Embedder;
use crate::error::Result;
use crate::store::{QdrantStore, SearchHit};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// One hit selected for the answer context
#[derive(Debug, Clone)]
pub struct RetrievedHit {
    pub score: f32,
    pub source: String,
    pub file_name: String,
    pub text: String,
}

impl RetrievedHit {
    fn from_search(hit: &SearchHit) -> Self {
        let field = |key: &str| {
            hit.payload
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };
        Self {
            score: hit.score,
            source: field("source"),
            file_name: field("file_name"),
            text: field("text"),
        }
    }

    fn render(&self, index: usize) -> String {
        format!(
            "[{}] score={:.3} source={} file={}\n{}\n",
            index, self.score, self.source, self.file_name, self.text
        )
    }
}

/// Assembled context, or an explicit empty marker when nothing fits
#[derive(Debug, Clone)]
pub enum ContextResult {
    Empty,
    Context {
        text: String,
        hits: Vec<RetrievedHit>,
        context_chars: usize,
    },
}

impl ContextResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, ContextResult::Empty)
    }
}

/// Build numbered context blocks. Assembly stops at the first hit whose
/// whole block would push the total past the character budget; later hits
/// are never considered.
fn assemble_context(hits: Vec<RetrievedHit>, max_context_chars: usize) -> ContextResult {
    let mut blocks: Vec<String> = Vec::new();
    let mut included: Vec<RetrievedHit> = Vec::new();
    let mut used = 0usize;

    for hit in hits {
        if hit.text.trim().is_empty() {
            continue;
        }
        let block = hit.render(included.len() + 1);
        let cost = block.chars().count() + if blocks.is_empty() { 0 } else { 1 };
        if used + cost > max_context_chars {
            break;
        }
        used += cost;
        blocks.push(block);
        included.push(hit);
    }

    if included.is_empty() {
        return ContextResult::Empty;
    }

    ContextResult::Context {
        text: blocks.join("\n"),
        context_chars: used,
        hits: included,
    }
}

/// Answers queries from the vector index
pub struct Retriever {
    store: Arc<QdrantStore>,
    embedder: Arc<dyn Embedder>,
    defaults: QueryConfig,
}

impl Retriever {
    pub fn new(store: Arc<QdrantStore>, embedder: Arc<dyn Embedder>, defaults: QueryConfig) -> Self {
        Self {
            store,
            embedder,
            defaults,
        }
    }

    /// Embed the query, search the index, and assemble the context
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<ContextResult> {
        let top_k = top_k.unwrap_or(self.defaults.top_k);

        let mut vectors = self.embedder.embed(vec![query.to_string()]).await?;
        let Some(query_vector) = vectors.pop() else {
            return Ok(ContextResult::Empty);
        };

        let hits = self.store.search(query_vector, top_k).await?;
        debug!(hits = hits.len(), top_k, "search complete");

        let retrieved: Vec<RetrievedHit> = hits.iter().map(RetrievedHit::from_search).collect();
        Ok(assemble_context(retrieved, self.defaults.max_context_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(score: f32, file: &str, text: &str) -> RetrievedHit {
        RetrievedHit {
            score,
            source: format!("gdrive://{}", file),
            file_name: file.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_blocks_are_numbered_in_order() {
        let result = assemble_context(
            vec![hit(0.91, "a.md", "first"), hit(0.72, "b.md", "second")],
            10_000,
        );
        let ContextResult::Context { text, hits, .. } = result else {
            panic!("expected context");
        };
        assert_eq!(hits.len(), 2);
        assert!(text.starts_with("[1] score=0.910 source=gdrive://a.md file=a.md\nfirst\n"));
        assert!(text.contains("\n[2] score=0.720 source=gdrive://b.md file=b.md\nsecond\n"));
    }

    #[test]
    fn test_assembly_stops_at_first_overflowing_hit() {
        // The oversized top hit ends assembly; the small hit after it is not
        // pulled in.
        let big = "x".repeat(500);
        let result = assemble_context(
            vec![hit(0.9, "big.md", &big), hit(0.8, "small.md", "tiny")],
            120,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_hits_before_the_overflow_are_kept() {
        let result = assemble_context(
            vec![
                hit(0.9, "a.md", "first"),
                hit(0.8, "b.md", &"y".repeat(300)),
                hit(0.7, "c.md", "late"),
            ],
            120,
        );
        let ContextResult::Context { hits, .. } = result else {
            panic!("expected context");
        };
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "a.md");
    }

    #[test]
    fn test_nothing_fits_yields_empty() {
        let result = assemble_context(vec![hit(0.9, "a.md", "some text here")], 5);
        assert!(result.is_empty());
    }

    #[test]
    fn test_no_hits_yields_empty() {
        assert!(assemble_context(Vec::new(), 1000).is_empty());
    }

    #[test]
    fn test_blank_payload_text_is_ignored() {
        let result = assemble_context(vec![hit(0.9, "a.md", "   ")], 1000);
        assert!(result.is_empty());
    }

    #[test]
    fn test_context_chars_counts_rendered_blocks() {
        let result = assemble_context(vec![hit(0.5, "a.md", "abc")], 1000);
        let ContextResult::Context {
            text,
            context_chars,
            ..
        } = result
        else {
            panic!("expected context");
        };
        assert_eq!(context_chars, text.chars().count());
    }
}

//! Idempotent document-to-index synchronization
//!
//! A document is replaced in the index as a unit: its text is chunked
//! deterministically, embedded in batches, and written under point ids
//! derived from (file id, chunk index). Old points for the file are deleted
//! before the new ones are inserted, so re-ingesting a file never leaves
//! stale chunks behind and re-ingesting identical content writes identical
//! points.

use crate::chunk::{self};
use crate::config::{ChunkConfig, Config};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::Result;
use crate::store::{ChunkPoint, QdrantStore};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

// Namespace for deterministic point ids. Changing this rewrites every point
// id in the collection.
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x8c9e_c946_2a4f_4f91_9d3b_6a1f0c7d5e42);

/// One extracted document ready for indexing
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    pub source: String,
    pub modified_time: Option<String>,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Deterministic point id for one chunk of one file
pub fn point_id(file_id: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &POINT_NAMESPACE,
        format!("{}:{}", file_id, chunk_index).as_bytes(),
    )
}

/// Build the payload-bearing points for a document's chunks and vectors
fn build_points(
    record: &DocumentRecord,
    chunks: Vec<String>,
    vectors: Vec<Vec<f32>>,
    indexed_at: &str,
) -> Vec<ChunkPoint> {
    let chunk_count = chunks.len();
    chunks
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(index, (text, vector))| {
            let mut payload = Map::new();
            payload.insert("text".to_string(), Value::from(text));
            payload.insert("file_id".to_string(), Value::from(record.file_id.clone()));
            payload.insert(
                "file_name".to_string(),
                Value::from(record.file_name.clone()),
            );
            payload.insert(
                "file_type".to_string(),
                Value::from(record.file_type.clone()),
            );
            payload.insert("source".to_string(), Value::from(record.source.clone()));
            if let Some(modified) = &record.modified_time {
                payload.insert("modified_time".to_string(), Value::from(modified.clone()));
            }
            payload.insert("chunk_index".to_string(), Value::from(index));
            payload.insert("chunk_count".to_string(), Value::from(chunk_count));
            payload.insert("indexed_at".to_string(), Value::from(indexed_at));

            // Extractor metadata rides along but never shadows core fields.
            for (key, value) in &record.metadata {
                payload.entry(key.clone()).or_insert_with(|| value.clone());
            }

            ChunkPoint {
                id: point_id(&record.file_id, index),
                vector,
                payload,
            }
        })
        .collect()
}

/// Replaces documents in the vector index
pub struct IndexSync {
    store: Arc<QdrantStore>,
    embedder: Arc<dyn Embedder>,
    chunk_config: ChunkConfig,
    batch_size: usize,
}

impl IndexSync {
    pub fn new(store: Arc<QdrantStore>, embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        Self {
            store,
            embedder,
            chunk_config: config.chunk.clone(),
            batch_size: config.embedding.batch_size,
        }
    }

    /// Replace all points for a document and return the new chunk count.
    /// Empty text after normalization removes the document's points entirely.
    pub async fn replace_document(&self, record: DocumentRecord) -> Result<usize> {
        let chunks = chunk::chunk_text(&record.text, &self.chunk_config);
        if chunks.is_empty() {
            self.store.delete_file_points(&record.file_id).await?;
            return Ok(0);
        }

        let vectors =
            embed_in_batches(self.embedder.as_ref(), chunks.clone(), self.batch_size).await?;
        let indexed_at = Utc::now().to_rfc3339();
        let points = build_points(&record, chunks, vectors, &indexed_at);
        let count = points.len();

        // Delete-then-insert keeps the file's point set exact even when the
        // new chunk count is smaller than the old one.
        self.store.delete_file_points(&record.file_id).await?;
        self.store.upsert_points(points).await?;

        debug!(
            file_id = %record.file_id,
            chunks = count,
            "document replaced in index"
        );
        Ok(count)
    }
}

//! Qdrant vector database integration
//!
//! This module wraps the Qdrant client and provides:
//! - Collection management with payload indexes for watermark lookups
//! - Point upsert and delete-by-file operations
//! - Vector search

use crate::config::Config;
use crate::error::{Error, Result};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointId, PointStruct, ScalarQuantizationBuilder,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

// Payload fields with keyword indexes, used by the watermark probe and the
// per-file delete filter.
const INDEXED_FIELDS: &[&str] = &["file_id", "modified_time", "file_type"];

/// One embedded chunk ready for upsert
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: serde_json::Map<String, Value>,
}

impl ChunkPoint {
    fn into_point_struct(self) -> Result<PointStruct> {
        let payload = Payload::try_from(Value::Object(self.payload))
            .map_err(|e| Error::Qdrant(format!("Invalid point payload: {}", e)))?;
        Ok(PointStruct::new(self.id.to_string(), self.vector, payload))
    }
}

/// Search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Map<String, Value>,
}

/// Collection statistics
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub collection: String,
    pub points_count: u64,
    pub status: String,
}

/// Qdrant store handle
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            &config.collection_name,
            config.embedding.dimension,
        )
    }

    /// Create a new store connection directly with URL and collection name
    pub fn new(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Ensure the collection exists with the expected vector size, creating
    /// it and its payload indexes when missing
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);

            if let Some(size) = self.collection_vector_size().await? {
                if size != self.dimension as u64 {
                    return Err(Error::Qdrant(format!(
                        "Collection '{}' has vector size {}, but the embedding model produces {}. Set a new collection name or reindex with the expected dimension.",
                        self.collection, size, self.dimension
                    )));
                }
            }
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        let vectors_config = VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors_config)
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        for field in INDEXED_FIELDS {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    *field,
                    FieldType::Keyword,
                ))
                .await?;
        }

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    async fn collection_vector_size(&self) -> Result<Option<u64>> {
        let info = self.client.collection_info(&self.collection).await?;
        let size = info
            .result
            .as_ref()
            .and_then(|r| r.config.as_ref())
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|c| match c {
                qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.size),
                qdrant_client::qdrant::vectors_config::Config::ParamsMap(_) => None,
            });
        Ok(size)
    }

    fn file_filter(file_id: &str) -> Filter {
        Filter::must([Condition::matches("file_id", file_id.to_string())])
    }

    /// Whether any stored point carries this exact (file_id, modified_time)
    /// pair. This is the watermark probe used to skip unchanged files.
    pub async fn has_file_version(&self, file_id: &str, modified_time: &str) -> Result<bool> {
        let filter = Filter::must([
            Condition::matches("file_id", file_id.to_string()),
            Condition::matches("modified_time", modified_time.to_string()),
        ]);

        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .limit(1)
                    .with_payload(false)
                    .with_vectors(false),
            )
            .await?;

        Ok(!response.result.is_empty())
    }

    /// Delete every point belonging to a file
    pub async fn delete_file_points(&self, file_id: &str) -> Result<()> {
        debug!(
            "Deleting points for file {} from collection {}",
            file_id, self.collection
        );
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection).points(Self::file_filter(file_id)),
            )
            .await?;
        Ok(())
    }

    /// Upsert chunk points, validating vector dimensions first
    pub async fn upsert_points(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': expected {} (got {})",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs: Vec<PointStruct> = points
            .into_iter()
            .map(ChunkPoint::into_point_struct)
            .collect::<Result<_>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs))
            .await?;
        Ok(())
    }

    /// Search for similar vectors
    pub async fn search(&self, query_vector: Vec<f32>, limit: usize) -> Result<Vec<SearchHit>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, limit
        );

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
                    .with_payload(true),
            )
            .await?;

        let hits = response
            .result
            .into_iter()
            .map(|p| SearchHit {
                id: point_id_to_string(p.id),
                score: p.score,
                payload: p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect(),
            })
            .collect();

        Ok(hits)
    }

    /// Get collection statistics
    pub async fn get_stats(&self) -> Result<CollectionStats> {
        let info = self.client.collection_info(&self.collection).await?;
        let (points_count, status) = info
            .result
            .map(|r| (r.points_count.unwrap_or(0), format!("{:?}", r.status())))
            .unwrap_or((0, "Unknown".to_string()));

        Ok(CollectionStats {
            collection: self.collection.clone(),
            points_count,
            status,
        })
    }
}

fn point_id_to_string(id: Option<PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

//! SQLite-backed vector index.
//!
//! Embeddings are stored as little-endian f32 BLOBs in a table shared by all
//! collections. Queries scan the collection and rank by cosine distance
//! (`1 - cosine similarity`), which is adequate for a few tens of thousands
//! of abstracts.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    cosine_similarity, IndexError, IndexResult, Metadata, MetadataFilter, VectorHits, VectorIndex,
};
use crate::models::EmbeddingConfig;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS embeddings (
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,
    embedding  BLOB NOT NULL,
    document   TEXT NOT NULL,
    metadata   TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
CREATE TABLE IF NOT EXISTS collections (
    name       TEXT PRIMARY KEY,
    model_name TEXT NOT NULL,
    dimension  INTEGER NOT NULL
);
";

impl From<rusqlite::Error> for IndexError {
    fn from(e: rusqlite::Error) -> Self {
        IndexError::Backend(e.to_string())
    }
}

/// One collection inside an SQLite embeddings database.
pub struct SqliteVectorIndex {
    conn: Mutex<Connection>,
    collection: String,
}

impl SqliteVectorIndex {
    /// Open (or create) `collection` inside the database at `path`.
    pub fn open(path: impl AsRef<Path>, collection: impl Into<String>) -> IndexResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| IndexError::Backend(format!("{}: {}", path.display(), e)))?;
        Self::with_connection(conn, collection.into())
    }

    pub fn in_memory(collection: impl Into<String>) -> IndexResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, collection.into())
    }

    fn with_connection(conn: Connection, collection: String) -> IndexResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            collection,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn stored_dimension(conn: &Connection, collection: &str) -> IndexResult<Option<usize>> {
        let dimension: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dimension.map(|d| d as usize))
    }

    fn check_dimension(conn: &Connection, collection: &str, actual: usize) -> IndexResult<()> {
        match Self::stored_dimension(conn, collection)? {
            Some(expected) if expected != actual => {
                Err(IndexError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

/// Serialize an embedding vector to bytes for BLOB storage.
fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Deserialize an embedding vector from BLOB bytes.
fn deserialize_embedding(bytes: &[u8]) -> IndexResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(IndexError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(
        &self,
        id: &str,
        embedding: &[f32],
        document: &str,
        metadata: &Metadata,
    ) -> IndexResult<()> {
        let metadata_json =
            serde_json::to_string(metadata).map_err(|e| IndexError::Corrupt(e.to_string()))?;

        let conn = self.conn.lock().await;
        Self::check_dimension(&conn, &self.collection, embedding.len())?;
        conn.execute(
            "INSERT INTO embeddings (collection, id, embedding, document, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (collection, id) DO UPDATE SET
                embedding = excluded.embedding,
                document = excluded.document,
                metadata = excluded.metadata",
            params![
                self.collection,
                id,
                serialize_embedding(embedding),
                document,
                metadata_json
            ],
        )?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> IndexResult<VectorHits> {
        if k == 0 {
            return Ok(VectorHits::default());
        }

        let conn = self.conn.lock().await;
        Self::check_dimension(&conn, &self.collection, embedding.len())?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, embedding, document, metadata FROM embeddings WHERE collection = ?1",
        )?;
        let rows = stmt.query_map(params![self.collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut scored: Vec<(f32, String, String, Metadata)> = Vec::new();
        for row in rows {
            let (id, blob, document, metadata_json) = row?;
            let metadata: Metadata = serde_json::from_str(&metadata_json)
                .map_err(|e| IndexError::Corrupt(format!("metadata of {}: {}", id, e)))?;
            if let Some(filter) = filter {
                if !filter.matches(&metadata) {
                    continue;
                }
            }
            let stored = deserialize_embedding(&blob)?;
            let distance = 1.0 - cosine_similarity(embedding, &stored)?;
            scored.push((distance, id, document, metadata));
        }

        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut hits = VectorHits::default();
        for (distance, id, document, metadata) in scored {
            hits.push(id, distance.max(0.0), document, metadata);
        }
        debug!(collection = %self.collection, k, returned = hits.len(), "vector query");
        Ok(hits)
    }

    async fn contains(&self, id: &str) -> IndexResult<bool> {
        let conn = self.conn.lock().await;
        let found = conn
            .query_row(
                "SELECT 1 FROM embeddings WHERE collection = ?1 AND id = ?2",
                params![self.collection, id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn count(&self) -> IndexResult<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE collection = ?1",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn embedding_config(&self) -> IndexResult<Option<EmbeddingConfig>> {
        let conn = self.conn.lock().await;
        let config = conn
            .query_row(
                "SELECT model_name, dimension FROM collections WHERE name = ?1",
                params![self.collection],
                |row| {
                    Ok(EmbeddingConfig {
                        model_name: row.get(0)?,
                        dimension: row.get::<_, i64>(1)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(config)
    }

    async fn set_embedding_config(&self, config: &EmbeddingConfig) -> IndexResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO collections (name, model_name, dimension) VALUES (?1, ?2, ?3)
             ON CONFLICT (name) DO UPDATE SET model_name = excluded.model_name, dimension = excluded.dimension",
            params![self.collection, config.model_name, config.dimension as i64],
        )?;
        Ok(())
    }
}

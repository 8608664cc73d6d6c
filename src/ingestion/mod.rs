//! Ingestion pipeline module.
//!
//! This module handles the offline pipeline that loads normalized paper
//! records into the paper store and embeds their abstracts into the vector
//! index.
//!
//! # Usage
//!
//! ```ignore
//! use paper_rag::ingestion::IngestionPipeline;
//! use paper_rag::provider::{json::JsonFilePaperProvider, RecordDefaults};
//!
//! let pipeline = IngestionPipeline::new(embedding, store, index, None);
//! pipeline.prepare().await?;
//!
//! let provider = JsonFilePaperProvider::from_file("neurips.json", RecordDefaults::new("NeurIPS", 2025)).await?;
//! let stats = pipeline.ingest_from_provider(&provider).await?;
//! println!("Inserted: {}, Duplicates: {}", stats.inserted, stats.duplicates_skipped);
//! ```
//!
//! The pipeline:
//! - Deduplicates by paper `uid`, both against the store and inside one batch
//! - Stores every new paper, embedding only those with a non-empty abstract
//! - Records the embedding model in the index on first write and refuses to
//!   mix vectors from a different model afterwards

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::models::{EmbeddingConfig, Paper};
use crate::provider::{PaperProvider, ProviderError};
use crate::query::paper_metadata;
use crate::storage::{PaperStore, StorageError};
use crate::vector::{IndexError, VectorIndex};

/// Default number of abstracts sent per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Paper store operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Vector index operation failed
    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),

    /// Provider operation failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The index was built with a different embedding model
    #[error("Embedding configuration mismatch: {0}")]
    ConfigurationMismatch(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    /// Total number of input papers processed
    pub total_processed: usize,

    /// Number of papers inserted into the store
    pub inserted: usize,

    /// Number of papers skipped because their uid was already known
    pub duplicates_skipped: usize,

    /// Number of papers whose abstract was embedded and indexed
    pub embedded: usize,

    /// Number of papers that could not be inserted
    pub failed: usize,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inserted(&mut self) {
        self.total_processed += 1;
        self.inserted += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.total_processed += 1;
        self.duplicates_skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }

    /// Add the counters of another run, e.g. one chunk of a larger input.
    pub fn absorb(&mut self, other: &IngestionStats) {
        self.total_processed += other.total_processed;
        self.inserted += other.inserted;
        self.duplicates_skipped += other.duplicates_skipped;
        self.embedded += other.embedded;
        self.failed += other.failed;
    }
}

/// Ingestion pipeline coordinator.
///
/// Coordinates the paper store, the embedding provider and the vector index.
/// All three are shared handles so the same store and index can be reused by
/// a retriever in the same process.
pub struct IngestionPipeline {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn PaperStore>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    skip_embeddings: bool,
}

impl IngestionPipeline {
    /// Create a pipeline; `batch_size` defaults to [`DEFAULT_BATCH_SIZE`].
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn PaperStore>,
        index: Arc<dyn VectorIndex>,
        batch_size: Option<usize>,
    ) -> Self {
        Self {
            embedding_provider,
            store,
            index,
            batch_size: batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
            skip_embeddings: false,
        }
    }

    /// Store papers only; abstracts can be embedded later with
    /// [`IngestionPipeline::embed_missing`].
    pub fn with_skip_embeddings(mut self, skip: bool) -> Self {
        self.skip_embeddings = skip;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Initialize the store schema and verify that the index, if it already
    /// holds vectors, was built with this pipeline's embedding model.
    ///
    /// # Errors
    /// Returns `IngestionError::ConfigurationMismatch` when the recorded model
    /// differs from the provider's
    pub async fn prepare(&self) -> IngestionResult<()> {
        self.store.initialize().await?;
        if !self.skip_embeddings {
            self.check_model().await?;
        }
        Ok(())
    }

    /// Ingest a batch of papers.
    ///
    /// Papers whose uid is already stored (or repeated earlier in `papers`)
    /// are skipped. New papers are inserted one by one; an insert failure is
    /// logged and counted but does not stop the batch. Embedding and index
    /// failures abort the call; the papers stay in the store and can be
    /// indexed later with [`IngestionPipeline::embed_missing`].
    pub async fn ingest_batch(&self, papers: &[Paper]) -> IngestionResult<IngestionStats> {
        if !self.skip_embeddings {
            self.check_model().await?;
        }

        let mut stats = IngestionStats::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut inserted: Vec<&Paper> = Vec::new();

        for paper in papers {
            if !seen.insert(paper.uid.as_str()) || self.store.exists(&paper.uid).await? {
                debug!(uid = %paper.uid, "skipping duplicate paper");
                stats.record_duplicate();
                continue;
            }

            match self.store.insert_paper(paper).await {
                Ok(()) => {
                    stats.record_inserted();
                    inserted.push(paper);
                }
                Err(StorageError::DuplicateEntry(uid)) => {
                    debug!(uid = %uid, "paper inserted concurrently, skipping");
                    stats.record_duplicate();
                }
                Err(e) => {
                    warn!(uid = %paper.uid, title = %paper.title, error = %e, "failed to insert paper");
                    stats.record_failed();
                }
            }
        }

        if !self.skip_embeddings && !inserted.is_empty() {
            stats.embedded = self.embed_and_index(&inserted).await?;
        }

        info!(
            processed = stats.total_processed,
            inserted = stats.inserted,
            duplicates = stats.duplicates_skipped,
            embedded = stats.embedded,
            failed = stats.failed,
            "ingested batch"
        );
        Ok(stats)
    }

    /// Fetch every paper from `provider` and ingest it.
    pub async fn ingest_from_provider(
        &self,
        provider: &dyn PaperProvider,
    ) -> IngestionResult<IngestionStats> {
        let papers = provider.fetch_papers().await?;
        info!(provider = provider.name(), papers = papers.len(), "fetched papers");
        self.ingest_batch(&papers).await
    }

    /// Embed every stored paper that has no vector in the index yet.
    ///
    /// Only `embedded` is counted in the returned stats.
    pub async fn embed_missing(&self) -> IngestionResult<IngestionStats> {
        self.check_model().await?;

        let mut missing = Vec::new();
        for uid in self.store.list_uids().await? {
            if !self.index.contains(&uid).await? {
                missing.push(self.store.get_paper(&uid).await?);
            }
        }
        info!(missing = missing.len(), "papers without embeddings");

        let refs: Vec<&Paper> = missing.iter().collect();
        let embedded = self.embed_and_index(&refs).await?;
        Ok(IngestionStats {
            embedded,
            ..IngestionStats::default()
        })
    }

    /// Embed non-empty abstracts in `batch_size` requests and upsert them.
    /// Returns the number of papers indexed.
    async fn embed_and_index(&self, papers: &[&Paper]) -> IngestionResult<usize> {
        let embeddable: Vec<&Paper> = papers
            .iter()
            .copied()
            .filter(|p| !p.abstract_text.trim().is_empty())
            .collect();
        if embeddable.len() < papers.len() {
            debug!(
                skipped = papers.len() - embeddable.len(),
                "papers without abstract are stored but not embedded"
            );
        }

        let mut embedded = 0;
        for chunk in embeddable.chunks(self.batch_size) {
            let texts: Vec<&str> = chunk.iter().map(|p| p.abstract_text.trim()).collect();
            let embeddings = self.embedding_provider.embed_batch(&texts).await?;
            if embeddings.len() != chunk.len() {
                return Err(EmbeddingError::MalformedResponse(format!(
                    "requested {} embeddings, received {}",
                    chunk.len(),
                    embeddings.len()
                ))
                .into());
            }

            if let Some(first) = embeddings.first() {
                self.record_config(first.len()).await?;
            }

            for (paper, embedding) in chunk.iter().zip(embeddings.iter()) {
                self.index
                    .upsert(&paper.uid, embedding, &paper.abstract_text, &paper_metadata(paper))
                    .await?;
                embedded += 1;
            }
            debug!(batch = chunk.len(), "indexed embedding batch");
        }
        Ok(embedded)
    }

    async fn check_model(&self) -> IngestionResult<()> {
        if let Some(recorded) = self.index.embedding_config().await? {
            let model = self.embedding_provider.model_name();
            if recorded.model_name != model {
                return Err(IngestionError::ConfigurationMismatch(format!(
                    "index was built with '{}' but the provider uses '{}'",
                    recorded.model_name, model
                )));
            }
        }
        Ok(())
    }

    /// Record the embedding configuration on first write, verify it afterwards.
    async fn record_config(&self, dimension: usize) -> IngestionResult<()> {
        let current = EmbeddingConfig {
            model_name: self.embedding_provider.model_name().to_string(),
            dimension,
        };
        match self.index.embedding_config().await? {
            None => {
                info!(model = %current.model_name, dimension, "recording embedding configuration");
                self.index.set_embedding_config(&current).await?;
                Ok(())
            }
            Some(recorded) if recorded == current => Ok(()),
            Some(recorded) => Err(IngestionError::ConfigurationMismatch(format!(
                "index has {} ({} dims) but the provider produced {} ({} dims)",
                recorded.model_name, recorded.dimension, current.model_name, current.dimension
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingResult;
    use crate::provider::ProviderResult;
    use crate::storage::sqlite::SqlitePaperStore;
    use crate::vector::sqlite::SqliteVectorIndex;
    use async_trait::async_trait;
    use std::sync::Mutex;

    // ===== Mock Implementations =====

    /// Mock embedding provider recording every batch it receives.
    #[derive(Clone)]
    struct MockEmbeddingProvider {
        model_name: String,
        dimension: usize,
        state: Arc<Mutex<MockEmbeddingState>>,
    }

    #[derive(Default)]
    struct MockEmbeddingState {
        embed_batch_calls: Vec<Vec<String>>,
        should_fail: bool,
    }

    impl MockEmbeddingProvider {
        fn new(model_name: &str, dimension: usize) -> Self {
            Self {
                model_name: model_name.to_string(),
                dimension,
                state: Arc::new(Mutex::new(MockEmbeddingState::default())),
            }
        }

        fn with_failure(self) -> Self {
            self.state.lock().unwrap().should_fail = true;
            self
        }

        fn get_embed_batch_calls(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().embed_batch_calls.clone()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
            Ok(create_test_embedding(self.dimension))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut state = self.state.lock().unwrap();
            state
                .embed_batch_calls
                .push(texts.iter().map(|s| s.to_string()).collect());
            if state.should_fail {
                return Err(EmbeddingError::ApiError("Mock embed_batch failure".to_string()));
            }
            Ok(texts.iter().map(|_| create_test_embedding(self.dimension)).collect())
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }

    /// Mock paper provider for testing.
    struct MockPaperProvider {
        papers: Vec<Paper>,
        should_fail: bool,
    }

    #[async_trait]
    impl PaperProvider for MockPaperProvider {
        async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>> {
            if self.should_fail {
                return Err(ProviderError::ParseError("Mock provider failure".to_string()));
            }
            Ok(self.papers.clone())
        }

        fn name(&self) -> &str {
            "MockProvider"
        }
    }

    // ===== Test Helper Functions =====

    fn create_test_paper(uid: &str, title: &str) -> Paper {
        Paper {
            uid: uid.to_string(),
            title: title.to_string(),
            abstract_text: format!("This is an abstract for the paper titled '{}'", title),
            authors: vec!["John Doe".to_string()],
            session: None,
            decision: Some("Accept (poster)".to_string()),
            topic: None,
            keywords: vec![],
            award: None,
            url: None,
            year: 2025,
            conference: "NeurIPS".to_string(),
        }
    }

    fn create_test_embedding(dimension: usize) -> Vec<f32> {
        (0..dimension).map(|i| (i as f32 + 1.0) / (dimension as f32)).collect()
    }

    struct Fixture {
        embedding: MockEmbeddingProvider,
        store: Arc<SqlitePaperStore>,
        index: Arc<SqliteVectorIndex>,
    }

    impl Fixture {
        fn new(embedding: MockEmbeddingProvider) -> Self {
            Self {
                embedding,
                store: Arc::new(SqlitePaperStore::in_memory().unwrap()),
                index: Arc::new(SqliteVectorIndex::in_memory("papers").unwrap()),
            }
        }

        fn pipeline(&self, batch_size: Option<usize>) -> IngestionPipeline {
            IngestionPipeline::new(
                Arc::new(self.embedding.clone()),
                self.store.clone(),
                self.index.clone(),
                batch_size,
            )
        }
    }

    // ===== Batch Ingestion Tests =====

    #[tokio::test]
    async fn test_ingest_batch_stores_and_indexes() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4));
        let pipeline = fixture.pipeline(None);

        let papers = vec![create_test_paper("p1", "First"), create_test_paper("p2", "Second")];
        let stats = pipeline.ingest_batch(&papers).await.unwrap();

        assert_eq!(stats.total_processed, 2);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.embedded, 2);
        assert_eq!(stats.duplicates_skipped, 0);
        assert_eq!(fixture.store.count_papers().await.unwrap(), 2);
        assert_eq!(fixture.index.count().await.unwrap(), 2);

        let config = fixture.index.embedding_config().await.unwrap().unwrap();
        assert_eq!(config.model_name, "test-model");
        assert_eq!(config.dimension, 4);

        let hits = fixture.index.query(&create_test_embedding(4), 1, None).await.unwrap();
        assert_eq!(hits.metadatas[0]["conference"], "NeurIPS");
    }

    #[tokio::test]
    async fn test_deduplication_by_uid() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4));
        let pipeline = fixture.pipeline(None);

        pipeline
            .ingest_batch(&[create_test_paper("p1", "Existing Paper")])
            .await
            .unwrap();

        let papers = vec![
            create_test_paper("p1", "Existing Paper (renamed)"),
            create_test_paper("p2", "New Paper"),
            create_test_paper("p2", "New Paper repeated in batch"),
        ];
        let stats = pipeline.ingest_batch(&papers).await.unwrap();

        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.duplicates_skipped, 2);
        assert_eq!(fixture.store.get_paper("p1").await.unwrap().title, "Existing Paper");
        assert_eq!(fixture.store.get_paper("p2").await.unwrap().title, "New Paper");
    }

    #[tokio::test]
    async fn test_empty_abstracts_stored_but_not_embedded() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4));
        let pipeline = fixture.pipeline(None);

        let mut blank = create_test_paper("p2", "No Abstract");
        blank.abstract_text = "   ".to_string();
        let stats = pipeline
            .ingest_batch(&[create_test_paper("p1", "With Abstract"), blank])
            .await
            .unwrap();

        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.embedded, 1);
        assert!(fixture.index.contains("p1").await.unwrap());
        assert!(!fixture.index.contains("p2").await.unwrap());
        assert_eq!(fixture.embedding.get_embed_batch_calls()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_requests_respect_batch_size() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4));
        let pipeline = fixture.pipeline(Some(2));

        let papers: Vec<Paper> = (0..5)
            .map(|i| create_test_paper(&format!("p{}", i), &format!("Paper {}", i)))
            .collect();
        let stats = pipeline.ingest_batch(&papers).await.unwrap();

        let sizes: Vec<usize> = fixture
            .embedding
            .get_embed_batch_calls()
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(stats.embedded, 5);
    }

    #[tokio::test]
    async fn test_skip_embeddings_then_embed_missing() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4));
        let pipeline = fixture.pipeline(None).with_skip_embeddings(true);

        let papers = vec![create_test_paper("p1", "First"), create_test_paper("p2", "Second")];
        let stats = pipeline.ingest_batch(&papers).await.unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.embedded, 0);
        assert!(fixture.embedding.get_embed_batch_calls().is_empty());
        assert_eq!(fixture.index.count().await.unwrap(), 0);

        let stats = fixture.pipeline(None).embed_missing().await.unwrap();
        assert_eq!(stats.embedded, 2);
        assert_eq!(fixture.index.count().await.unwrap(), 2);

        // Nothing left to do on a second pass
        let stats = fixture.pipeline(None).embed_missing().await.unwrap();
        assert_eq!(stats.embedded, 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_papers_in_store() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4).with_failure());
        let pipeline = fixture.pipeline(None);

        let result = pipeline.ingest_batch(&[create_test_paper("p1", "First")]).await;
        assert!(matches!(result, Err(IngestionError::Embedding(_))));
        assert!(fixture.store.exists("p1").await.unwrap());
        assert_eq!(fixture.index.count().await.unwrap(), 0);
    }

    // ===== Configuration Validation Tests =====

    #[tokio::test]
    async fn test_model_mismatch_rejected() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("model-a", 4));
        fixture
            .pipeline(None)
            .ingest_batch(&[create_test_paper("p1", "First")])
            .await
            .unwrap();

        let other = IngestionPipeline::new(
            Arc::new(MockEmbeddingProvider::new("model-b", 4)),
            fixture.store.clone(),
            fixture.index.clone(),
            None,
        );

        match other.prepare().await {
            Err(IngestionError::ConfigurationMismatch(msg)) => {
                assert!(msg.contains("model-a"), "Error should mention recorded model");
                assert!(msg.contains("model-b"), "Error should mention provider model");
            }
            result => panic!("Expected ConfigurationMismatch, got {:?}", result),
        }

        let result = other.ingest_batch(&[create_test_paper("p2", "Second")]).await;
        assert!(matches!(result, Err(IngestionError::ConfigurationMismatch(_))));
    }

    #[tokio::test]
    async fn test_prepare_on_fresh_index() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4));
        assert!(fixture.pipeline(None).prepare().await.is_ok());
        assert!(fixture.index.embedding_config().await.unwrap().is_none());
    }

    // ===== Provider Integration Tests =====

    #[tokio::test]
    async fn test_ingest_from_provider() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4));
        let provider = MockPaperProvider {
            papers: vec![create_test_paper("p1", "First"), create_test_paper("p2", "Second")],
            should_fail: false,
        };

        let stats = fixture.pipeline(None).ingest_from_provider(&provider).await.unwrap();
        assert_eq!(stats.inserted, 2);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let fixture = Fixture::new(MockEmbeddingProvider::new("test-model", 4));
        let provider = MockPaperProvider {
            papers: vec![],
            should_fail: true,
        };

        let result = fixture.pipeline(None).ingest_from_provider(&provider).await;
        assert!(matches!(result, Err(IngestionError::Provider(_))));
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = IngestionStats::new();
        let mut chunk = IngestionStats::new();
        chunk.record_inserted();
        chunk.record_duplicate();
        chunk.record_failed();
        chunk.embedded = 1;

        total.absorb(&chunk);
        total.absorb(&chunk);
        assert_eq!(total.total_processed, 6);
        assert_eq!(total.inserted, 2);
        assert_eq!(total.duplicates_skipped, 2);
        assert_eq!(total.failed, 2);
        assert_eq!(total.embedded, 2);
    }
}

//! `MemorySystem`: the unified façade over episodic, semantic, procedural,
//! and working memory (spec §4.4). Refuses to start without an encryption
//! key, since every store it owns persists through `aegis_crypto`.

use crate::episodic::{EpisodicRecord, EpisodicStore};
use crate::procedural::{ProcedureRecord, ProceduralStore};
use crate::semantic::SemanticStore;
use crate::working::{WorkingItem, WorkingStore};
use aegis_core::{AegisError, AegisResult, DocumentId, MemoryConfig, MemoryError, MemoryItemId};
use aegis_crypto::EncryptedStore;
use aegis_vector::{HnswConfig, VectorStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Episodic,
    Semantic,
    Procedural,
    Working,
}

pub enum MemoryStoreInput {
    Episodic { text: String, embedding: Vec<f32> },
    Semantic { text: String, embedding: Vec<f32>, metadata: HashMap<String, serde_json::Value> },
    Procedural(ProcedureRecord),
    Working { text: String, metadata: HashMap<String, serde_json::Value> },
}

pub enum MemoryStoreOutput {
    Episodic(MemoryItemId),
    Semantic(DocumentId),
    Procedural,
    Working,
}

pub struct RetrievalQuery {
    pub embedding: Vec<f32>,
    pub kinds: Vec<MemoryKind>,
    pub k: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub kind: MemoryKind,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStatistics {
    pub episodic_count: usize,
    pub semantic_count: usize,
    pub procedural_count: usize,
    pub working_count: usize,
}

#[derive(Debug)]
pub struct MemorySystem {
    episodic: EpisodicStore,
    vectors: VectorStore,
    procedural: ProceduralStore,
    working: WorkingStore,
    episodic_blob: EncryptedStore,
    procedural_blob: EncryptedStore,
    retrieve_concurrency: usize,
}

impl MemorySystem {
    #[instrument(skip(data_dir, secret))]
    pub async fn initialize(
        data_dir: impl Into<PathBuf>,
        secret: &str,
        config: &MemoryConfig,
        ann_config: HnswConfig,
    ) -> AegisResult<Self> {
        if secret.is_empty() {
            return Err(MemoryError::EncryptionKeyMissing.into());
        }
        let data_dir = data_dir.into();
        let vectors = VectorStore::open(&data_dir, secret, ann_config).await?;
        let episodic_blob = EncryptedStore::open("episodic-log", data_dir.join("episodic-log"), secret)?;
        let procedural_blob = EncryptedStore::open("procedural-metadata", data_dir.join("procedural-metadata"), secret)?;

        let episodic = EpisodicStore::new();
        if episodic_blob.exists().await {
            if let Ok(bytes) = episodic_blob.read().await {
                if let Ok(records) = serde_json::from_slice::<Vec<EpisodicRecord>>(&bytes) {
                    episodic.load(records);
                }
            }
        }

        let procedural = ProceduralStore::new(config.code_loading_enabled);
        if procedural_blob.exists().await {
            if let Ok(bytes) = procedural_blob.read().await {
                if let Ok(records) = serde_json::from_slice::<Vec<ProcedureRecord>>(&bytes) {
                    procedural.load_metadata(records);
                }
            }
        }

        Ok(Self {
            episodic,
            vectors,
            procedural,
            working: WorkingStore::new(config.working_capacity),
            episodic_blob,
            procedural_blob,
            retrieve_concurrency: config.retrieve_batch_concurrency.max(1),
        })
    }

    pub fn procedural(&self) -> &ProceduralStore {
        &self.procedural
    }

    #[instrument(skip(self, input))]
    pub fn store(&self, input: MemoryStoreInput) -> AegisResult<MemoryStoreOutput> {
        match input {
            MemoryStoreInput::Episodic { text, embedding } => {
                Ok(MemoryStoreOutput::Episodic(self.episodic.append(text, embedding)))
            }
            MemoryStoreInput::Semantic { text, embedding, metadata } => {
                let id = SemanticStore::new(&self.vectors).store(text, embedding, metadata)?;
                Ok(MemoryStoreOutput::Semantic(id))
            }
            MemoryStoreInput::Procedural(record) => {
                self.procedural.store_metadata(record);
                Ok(MemoryStoreOutput::Procedural)
            }
            MemoryStoreInput::Working { text, metadata } => {
                self.working.push(WorkingItem { text, metadata });
                Ok(MemoryStoreOutput::Working)
            }
        }
    }

    pub fn store_batch(&self, inputs: Vec<MemoryStoreInput>) -> AegisResult<Vec<MemoryStoreOutput>> {
        inputs.into_iter().map(|i| self.store(i)).collect()
    }

    #[instrument(skip(self, query))]
    pub async fn retrieve(&self, query: &RetrievalQuery) -> AegisResult<Vec<RetrievalHit>> {
        let mut hits = Vec::new();
        for kind in &query.kinds {
            match kind {
                MemoryKind::Episodic => {
                    for (record, score) in self.episodic.most_similar(&query.embedding, query.k) {
                        if score >= query.threshold {
                            hits.push(RetrievalHit { kind: MemoryKind::Episodic, text: record.text, score });
                        }
                    }
                }
                MemoryKind::Semantic => {
                    for hit in SemanticStore::new(&self.vectors).retrieve(&query.embedding, query.k, query.threshold) {
                        hits.push(RetrievalHit { kind: MemoryKind::Semantic, text: hit.text, score: hit.score });
                    }
                }
                MemoryKind::Working => {
                    for item in self.working.items().into_iter().take(query.k) {
                        hits.push(RetrievalHit { kind: MemoryKind::Working, text: item.text, score: 1.0 });
                    }
                }
                MemoryKind::Procedural => {
                    // Procedural entries are addressed by name, not similarity; not
                    // part of embedding-based retrieval.
                }
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }

    /// Runs each query's `retrieve` with a bounded concurrency cap; one
    /// query's failure never aborts its siblings.
    #[instrument(skip(self, queries))]
    pub async fn retrieve_batch(&self, queries: Vec<RetrievalQuery>) -> Vec<AegisResult<Vec<RetrievalHit>>> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.retrieve_concurrency));
        let futures = queries.into_iter().map(|query| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                self.retrieve(&query).await
            }
        });
        futures_util::future::join_all(futures).await
    }

    #[instrument(skip(self, input, result, context))]
    pub fn store_interaction(
        &self,
        input: &str,
        result: &str,
        context: &HashMap<String, serde_json::Value>,
        embedding: Vec<f32>,
    ) -> MemoryItemId {
        let text = format!("Q: {input}\nA: {result}");
        self.working.push(WorkingItem {
            text: text.clone(),
            metadata: context.clone(),
        });
        self.episodic.append(text, embedding)
    }

    pub fn statistics(&self) -> MemoryStatistics {
        MemoryStatistics {
            episodic_count: self.episodic.len(),
            semantic_count: self.vectors.count(),
            procedural_count: self.procedural.all_metadata().len(),
            working_count: self.working.len(),
        }
    }

    #[instrument(skip(self))]
    pub async fn persist(&self) -> AegisResult<()> {
        let episodic_bytes = serde_json::to_vec(&self.episodic.all()).expect("episodic records serialize");
        self.episodic_blob.write(&episodic_bytes).await.map_err(|e| {
            AegisError::from(aegis_core::ConfigError::InvalidValue {
                field: "episodic-log".to_string(),
                reason: e.to_string(),
            })
        })?;

        let procedural_bytes = serde_json::to_vec(&self.procedural.all_metadata()).expect("procedure metadata serializes");
        self.procedural_blob.write(&procedural_bytes).await.map_err(|e| {
            AegisError::from(aegis_core::ConfigError::InvalidValue {
                field: "procedural-metadata".to_string(),
                reason: e.to_string(),
            })
        })?;

        self.vectors.persist().await.map_err(|e| {
            AegisError::from(aegis_core::ConfigError::InvalidValue {
                field: "hnsw-index".to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> AegisResult<()> {
        self.working.clear();
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MemoryConfig {
        MemoryConfig {
            working_capacity: 10,
            retrieve_batch_concurrency: 5,
            code_loading_enabled: false,
        }
    }

    #[tokio::test]
    async fn refuses_to_initialize_without_secret() {
        let dir = tempfile::tempdir().unwrap();
        let err = MemorySystem::initialize(dir.path(), "", &cfg(), HnswConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "memory_error");
    }

    #[tokio::test]
    async fn store_and_retrieve_across_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let system = MemorySystem::initialize(dir.path(), "0123456789abcdef0123456789abcdef", &cfg(), HnswConfig::default())
            .await
            .unwrap();

        system
            .store(MemoryStoreInput::Semantic {
                text: "semantic fact".into(),
                embedding: vec![1.0, 0.0],
                metadata: HashMap::new(),
            })
            .unwrap();
        system
            .store(MemoryStoreInput::Episodic {
                text: "episodic event".into(),
                embedding: vec![0.9, 0.1],
            })
            .unwrap();

        let hits = system
            .retrieve(&RetrievalQuery {
                embedding: vec![1.0, 0.0],
                kinds: vec![MemoryKind::Semantic, MemoryKind::Episodic],
                k: 5,
                threshold: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn retrieve_batch_runs_all_queries_independently() {
        let dir = tempfile::tempdir().unwrap();
        let system = MemorySystem::initialize(dir.path(), "0123456789abcdef0123456789abcdef", &cfg(), HnswConfig::default())
            .await
            .unwrap();
        let queries = (0..8)
            .map(|_| RetrievalQuery {
                embedding: vec![1.0, 0.0],
                kinds: vec![MemoryKind::Working],
                k: 5,
                threshold: 0.0,
            })
            .collect();
        let results = system.retrieve_batch(queries).await;
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn persist_and_reload_preserves_episodic_history() {
        let dir = tempfile::tempdir().unwrap();
        let secret = "0123456789abcdef0123456789abcdef";
        {
            let system = MemorySystem::initialize(dir.path(), secret, &cfg(), HnswConfig::default())
                .await
                .unwrap();
            system
                .store(MemoryStoreInput::Episodic { text: "persisted".into(), embedding: vec![1.0, 0.0] })
                .unwrap();
            system.persist().await.unwrap();
        }
        let reopened = MemorySystem::initialize(dir.path(), secret, &cfg(), HnswConfig::default())
            .await
            .unwrap();
        assert_eq!(reopened.statistics().episodic_count, 1);
    }
}

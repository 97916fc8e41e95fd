//! Public vector store contract (spec §4.3): add/search/remove over an
//! HNSW graph with encrypted persistence under the `hnsw-index` store name.

use crate::graph::{HnswConfig, HnswGraph, PersistedIndex, SearchHit};
use aegis_core::{AegisResult, ConfigError, DocumentId};
use aegis_crypto::EncryptedStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::instrument;

pub use crate::graph::SearchHit as VectorHit;

/// A document to add to the store.
pub struct DocumentInput {
    pub id: DocumentId,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug)]
pub struct VectorStore {
    graph: RwLock<HnswGraph>,
    persistence: EncryptedStore,
}

impl VectorStore {
    /// Open (or create) the vector store, loading any persisted index.
    #[instrument(skip(data_dir, secret))]
    pub async fn open(data_dir: impl Into<PathBuf>, secret: &str, config: HnswConfig) -> Result<Self, ConfigError> {
        let path = data_dir.into().join("hnsw-index");
        let persistence = EncryptedStore::open("hnsw-index", path, secret)?;
        let graph = if persistence.exists().await {
            match persistence.read().await {
                Ok(bytes) => match serde_json::from_slice::<PersistedIndex>(&bytes) {
                    Ok(persisted) => HnswGraph::from_persisted(config, persisted),
                    Err(_) => HnswGraph::new(config),
                },
                Err(_) => HnswGraph::new(config),
            }
        } else {
            HnswGraph::new(config)
        };
        Ok(Self {
            graph: RwLock::new(graph),
            persistence,
        })
    }

    #[instrument(skip(self, input))]
    pub fn add(&self, input: DocumentInput) -> AegisResult<()> {
        self.graph
            .write()
            .insert(input.id, input.vector, input.text, input.metadata)?;
        Ok(())
    }

    pub fn add_batch(&self, inputs: Vec<DocumentInput>) -> AegisResult<()> {
        let mut graph = self.graph.write();
        for input in inputs {
            graph.insert(input.id, input.vector, input.text, input.metadata)?;
        }
        Ok(())
    }

    pub fn find_similar(&self, query: &[f32], k: usize, threshold: f32) -> Vec<SearchHit> {
        self.graph.read().search(query, k, threshold)
    }

    pub fn remove(&self, id: DocumentId) -> bool {
        self.graph.write().remove(id)
    }

    pub fn count(&self) -> usize {
        self.graph.read().len()
    }

    /// Serialize the current graph and write it to the encrypted store.
    #[instrument(skip(self))]
    pub async fn persist(&self) -> std::io::Result<()> {
        let persisted = self.graph.read().to_persisted();
        let bytes = serde_json::to_vec(&persisted).expect("hnsw index serializes");
        self.persistence.write(&bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: DocumentId, v: Vec<f32>) -> DocumentInput {
        DocumentInput {
            id,
            vector: v,
            text: "t".into(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn persists_and_reloads_across_store_instances() {
        use aegis_core::EntityIdType;
        let dir = tempfile::tempdir().unwrap();
        let secret = "0123456789abcdef0123456789abcdef";
        let id = DocumentId::generate();

        {
            let store = VectorStore::open(dir.path(), secret, HnswConfig::default()).await.unwrap();
            store.add(doc(id, vec![1.0, 0.0, 0.0])).unwrap();
            store.persist().await.unwrap();
        }

        let reopened = VectorStore::open(dir.path(), secret, HnswConfig::default()).await.unwrap();
        assert_eq!(reopened.count(), 1);
        let hits = reopened.find_similar(&[1.0, 0.0, 0.0], 5, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
    }

    #[tokio::test]
    async fn remove_decrements_count() {
        use aegis_core::EntityIdType;
        let dir = tempfile::tempdir().unwrap();
        let secret = "0123456789abcdef0123456789abcdef";
        let store = VectorStore::open(dir.path(), secret, HnswConfig::default()).await.unwrap();
        let id = DocumentId::generate();
        store.add(doc(id, vec![1.0, 0.0])).unwrap();
        assert_eq!(store.count(), 1);
        assert!(store.remove(id));
        assert_eq!(store.count(), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        use aegis_core::EntityIdType;
        let dir = tempfile::tempdir().unwrap();
        let secret = "0123456789abcdef0123456789abcdef";
        let store = VectorStore::open(dir.path(), secret, HnswConfig::default()).await.unwrap();
        store.add(doc(DocumentId::generate(), vec![1.0, 0.0])).unwrap();
        let err = store.add(doc(DocumentId::generate(), vec![1.0, 0.0, 0.0]));
        assert!(err.is_err());
    }
}

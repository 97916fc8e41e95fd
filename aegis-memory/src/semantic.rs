//! Semantic memory: a thin adapter over the vector store (spec §4.4 — "thin
//! adapter over C2"). No additional state lives here.

use aegis_core::{AegisResult, DocumentId, EntityIdType};
use aegis_vector::{DocumentInput, SearchHit, VectorStore};
use std::collections::HashMap;

pub struct SemanticStore<'a> {
    vectors: &'a VectorStore,
}

impl<'a> SemanticStore<'a> {
    pub fn new(vectors: &'a VectorStore) -> Self {
        Self { vectors }
    }

    pub fn store(&self, text: String, embedding: Vec<f32>, metadata: HashMap<String, serde_json::Value>) -> AegisResult<DocumentId> {
        let id = DocumentId::generate();
        self.vectors.add(DocumentInput {
            id,
            vector: embedding,
            text,
            metadata,
        })?;
        Ok(id)
    }

    pub fn retrieve(&self, query: &[f32], k: usize, threshold: f32) -> Vec<SearchHit> {
        self.vectors.find_similar(query, k, threshold)
    }

    pub fn remove(&self, id: DocumentId) -> bool {
        self.vectors.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_retrieve_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = VectorStore::open(dir.path(), "0123456789abcdef0123456789abcdef", Default::default())
            .await
            .unwrap();
        let semantic = SemanticStore::new(&vectors);
        let id = semantic.store("a fact".into(), vec![1.0, 0.0], HashMap::new()).unwrap();
        let hits = semantic.retrieve(&[1.0, 0.0], 5, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
    }
}

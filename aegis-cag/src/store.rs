//! Encrypted export/import of the cache's entries (spec §4.6
//! "Persistence"): a single JSON blob under C3, merged on import with
//! hit-count-wins conflict resolution.

use crate::engine::CacheEngine;
use crate::entry::CacheEntry;
use aegis_core::ConfigError;
use aegis_crypto::EncryptedStore;
use std::path::PathBuf;
use tracing::instrument;

pub struct CachePersistence {
    store: EncryptedStore,
}

impl CachePersistence {
    pub fn open(data_dir: impl Into<PathBuf>, secret: &str) -> Result<Self, ConfigError> {
        let path = data_dir.into().join("cag-cache");
        Ok(Self {
            store: EncryptedStore::open("cag-cache", path, secret)?,
        })
    }

    #[instrument(skip(self, engine))]
    pub async fn export(&self, engine: &CacheEngine) -> std::io::Result<()> {
        let entries = engine.snapshot();
        let json = serde_json::to_vec(&entries).unwrap_or_default();
        self.store.write(&json).await
    }

    /// Loads the persisted blob, if any, and merges it into `engine`.
    /// Entries already present with a higher hit count than the persisted
    /// copy are kept; everything else is overwritten by the import.
    #[instrument(skip(self, engine))]
    pub async fn import(&self, engine: &CacheEngine) {
        if !self.store.exists().await {
            return;
        }
        let bytes = match self.store.read().await {
            Ok(bytes) => bytes,
            Err(_) => return,
        };
        let entries: Vec<CacheEntry> = match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        engine.merge_entries(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::QueryOptions;
    use aegis_core::{AegisResult, EmbeddingClient, GenerateError, GenerateRequest, LlmClient};
    use aegis_resilience::{BreakerConfig, CircuitBreaker, RetryPolicy, TokenBucket};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, request: GenerateRequest) -> Result<String, GenerateError> {
            Ok(format!("answer: {}", request.prompt))
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn embed(&self, text: &str) -> AegisResult<Vec<f32>> {
            let mut v: Vec<f32> = text.bytes().map(|b| b as f32).collect();
            v.resize(8, 0.0);
            Ok(v)
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    fn new_engine() -> CacheEngine {
        CacheEngine::new(
            aegis_core::CacheConfig::default(),
            Arc::new(StubLlm),
            Arc::new(StubEmbedder),
            TokenBucket::new(1000.0, 1000.0),
            CircuitBreaker::new("test-llm", BreakerConfig::default()),
            RetryPolicy {
                max_attempts: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                multiplier: 1.0,
                jitter: 0.0,
            },
        )
    }

    #[tokio::test]
    async fn export_then_import_into_a_fresh_engine_restores_entries() {
        let dir = tempfile::tempdir().unwrap();
        let secret = "0123456789abcdef0123456789abcdef";

        let engine = new_engine();
        engine.query("what is xss", QueryOptions::default()).await.unwrap();

        let persistence = CachePersistence::open(dir.path(), secret).unwrap();
        persistence.export(&engine).await.unwrap();

        let reloaded = new_engine();
        persistence.import(&reloaded).await;
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn import_keeps_the_entry_with_the_higher_hit_count() {
        let dir = tempfile::tempdir().unwrap();
        let secret = "0123456789abcdef0123456789abcdef";

        let engine = new_engine();
        engine.query("what is csrf", QueryOptions::default()).await.unwrap();
        // Replay the exact-hit path a few times to bump the hit count.
        engine.query("what is csrf", QueryOptions::default()).await.unwrap();
        engine.query("what is csrf", QueryOptions::default()).await.unwrap();

        let persistence = CachePersistence::open(dir.path(), secret).unwrap();
        persistence.export(&engine).await.unwrap();

        let fresh = new_engine();
        fresh.query("what is csrf", QueryOptions::default()).await.unwrap();
        let fresh_hits_before = fresh.snapshot()[0].hit_count;

        persistence.import(&fresh).await;
        let merged = fresh.snapshot();
        assert_eq!(merged.len(), 1);
        assert!(merged[0].hit_count >= fresh_hits_before);
    }
}

//! Agent façade (spec §4.7): the single coordinator allowed to reach across
//! authentication, memory, and the cache engine. It owns no business logic
//! of its own — each step delegates to the component that actually
//! implements it.

use aegis_auth::{AuditEvent, SessionManager};
use aegis_cag::{CacheEngine, CachePersistence, CacheResponse, QueryOptions};
use aegis_core::{AegisError, AegisResult, ConfigError, EmbeddingClient, UserId};
use aegis_memory::{MemoryKind, MemorySystem, RetrievalHit, RetrievalQuery};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// A single `process` call.
pub struct ProcessRequest {
    pub access_token: String,
    pub query: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Tuning knobs for context assembly and cache lookup.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Max memory items pulled into context, across all kinds combined.
    pub context_budget: usize,
    /// Minimum similarity for a memory item to be included as context.
    pub context_threshold: f32,
    /// Forwarded to the cache engine's embedding-tier hit.
    pub accept_approximate: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            context_budget: 5,
            context_threshold: 0.5,
            accept_approximate: false,
        }
    }
}

/// The CAG result plus the principal and context it was produced under.
#[derive(Debug, Clone)]
pub struct ProcessResponse {
    pub principal: UserId,
    pub cache: CacheResponse,
    pub context: Vec<RetrievalHit>,
}

/// Wires C5 (auth), C4 (memory), and C6 (cache) into the single
/// authenticate → assemble context → query cache → store interaction →
/// audit → return pipeline described in the façade contract.
pub struct AgentFacade {
    sessions: Arc<SessionManager>,
    memory: Arc<MemorySystem>,
    cache: Arc<CacheEngine>,
    cache_persistence: CachePersistence,
    embedder: Arc<dyn EmbeddingClient>,
}

impl AgentFacade {
    pub fn new(
        sessions: Arc<SessionManager>,
        memory: Arc<MemorySystem>,
        cache: Arc<CacheEngine>,
        cache_persistence: CachePersistence,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self { sessions, memory, cache, cache_persistence, embedder }
    }

    /// Drains in-flight work and persists C2 (via `MemorySystem::shutdown`)
    /// and C6 before the process exits. The audit log needs no explicit
    /// close: each append opens and fsyncs its own file handle.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> AegisResult<()> {
        self.memory.shutdown().await?;
        self.cache_persistence.export(&self.cache).await.map_err(|e| {
            AegisError::from(ConfigError::InvalidValue {
                field: "cag-cache".to_string(),
                reason: e.to_string(),
            })
        })
    }

    #[instrument(skip(self, request, opts), fields(query_len = request.query.len()))]
    pub async fn process(&self, request: ProcessRequest, opts: ProcessOptions) -> AegisResult<ProcessResponse> {
        let (principal, session) = self.sessions.verify(&request.access_token)?;

        let query_embedding = self.embedder.embed(&request.query).await?;
        let context = self
            .memory
            .retrieve(&RetrievalQuery {
                embedding: query_embedding,
                kinds: vec![MemoryKind::Episodic, MemoryKind::Semantic, MemoryKind::Working],
                k: opts.context_budget,
                threshold: opts.context_threshold,
            })
            .await?;

        let context_text = if context.is_empty() {
            None
        } else {
            Some(context.iter().map(|hit| hit.text.as_str()).collect::<Vec<_>>().join("\n"))
        };

        let cache_result = self
            .cache
            .query(
                &request.query,
                QueryOptions {
                    accept_approximate: opts.accept_approximate,
                    context: context_text,
                },
            )
            .await;

        let cache = match cache_result {
            Ok(response) => response,
            Err(err) => {
                self.sessions
                    .audit()
                    .record(AuditEvent {
                        actor: Some(principal),
                        action: "agent.process".to_string(),
                        resource: "query".to_string(),
                        session_id: Some(session.id),
                        ip: request.ip,
                        user_agent: request.user_agent,
                        success: false,
                        error: Some(err.code().to_string()),
                        ..Default::default()
                    })
                    .await
                    .ok();
                return Err(err);
            }
        };

        let response_embedding = self.embedder.embed(&cache.response).await?;
        let mut metadata = HashMap::new();
        metadata.insert("cache_hit_type".to_string(), serde_json::json!(format!("{:?}", cache.cache_hit_type)));
        self.memory.store_interaction(&request.query, &cache.response, &metadata, response_embedding);

        self.sessions
            .audit()
            .record(AuditEvent {
                actor: Some(principal),
                action: "agent.process".to_string(),
                resource: "query".to_string(),
                session_id: Some(session.id),
                ip: request.ip,
                user_agent: request.user_agent,
                success: true,
                ..Default::default()
            })
            .await
            .ok();

        Ok(ProcessResponse { principal, cache, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_auth::{AuditLog, JwtIssuer, SessionManager, User, UserStore};
    use aegis_cag::CacheEngine;
    use aegis_core::{AegisResult, AuthConfig, CacheConfig, GenerateError, GenerateRequest, LlmClient};
    use aegis_memory::MemorySystem;
    use aegis_resilience::{BreakerConfig, CircuitBreaker, RetryPolicy, TokenBucket};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, request: GenerateRequest) -> Result<String, GenerateError> {
            Ok(format!("answer to: {}", request.prompt))
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

    async fn facade(dir: &std::path::Path) -> (AgentFacade, String) {
        let users = UserStore::new();
        users.insert(User::new("alice", "correct horse battery", "analyst"));
        let jwt = JwtIssuer::new("test-signing-secret-test", None);
        let audit = AuditLog::open(dir, "0123456789abcdef0123456789abcdef").unwrap();
        let sessions = Arc::new(SessionManager::new(users, jwt, audit, AuthConfig::default(), 100, 100));

        let memory = Arc::new(
            MemorySystem::initialize(
                dir,
                "0123456789abcdef0123456789abcdef",
                &aegis_core::MemoryConfig::default(),
                aegis_vector::HnswConfig::default(),
            )
            .await
            .unwrap(),
        );

        let cache = Arc::new(CacheEngine::new(
            CacheConfig::default(),
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
        ));

        let cache_persistence = CachePersistence::open(dir, "0123456789abcdef0123456789abcdef").unwrap();

        let outcome = sessions.login("alice", "correct horse battery", None, None).await.unwrap();
        (
            AgentFacade::new(sessions, memory, cache, cache_persistence, Arc::new(StubEmbedder)),
            outcome.access_token,
        )
    }

    #[tokio::test]
    async fn process_authenticates_queries_and_stores_the_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, access_token) = facade(dir.path()).await;

        let response = facade
            .process(
                ProcessRequest {
                    access_token,
                    query: "what is sql injection".to_string(),
                    ip: None,
                    user_agent: None,
                },
                ProcessOptions::default(),
            )
            .await
            .unwrap();

        assert!(response.cache.response.contains("sql injection"));
        assert_eq!(facade.memory.statistics().episodic_count, 1);
    }

    #[tokio::test]
    async fn process_rejects_an_invalid_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, _token) = facade(dir.path()).await;

        let err = facade
            .process(
                ProcessRequest {
                    access_token: "not-a-real-token".to_string(),
                    query: "anything".to_string(),
                    ip: None,
                    user_agent: None,
                },
                ProcessOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "token_invalid");
    }

    #[tokio::test]
    async fn shutdown_persists_memory_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (facade, access_token) = facade(dir.path()).await;
        facade
            .process(
                ProcessRequest {
                    access_token,
                    query: "what is xss".to_string(),
                    ip: None,
                    user_agent: None,
                },
                ProcessOptions::default(),
            )
            .await
            .unwrap();

        facade.shutdown().await.unwrap();

        let reloaded_cache = CachePersistence::open(dir.path(), "0123456789abcdef0123456789abcdef").unwrap();
        let fresh_engine = CacheEngine::new(
            CacheConfig::default(),
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
        );
        reloaded_cache.import(&fresh_engine).await;
        assert_eq!(fresh_engine.len(), 1);
    }
}

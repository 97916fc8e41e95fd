//! The cache-augmented generation engine (spec §4.6): layered lookup over
//! exact, similar, and embedding hits, falling through to a single-flight
//! coalesced downstream `Generate` call on miss.

use crate::entry::{CacheEntry, CacheHitType, CacheResponse};
use crate::normalize::{normalize, query_id};
use crate::singleflight::SingleFlight;
use aegis_core::{
    AegisError, AegisResult, CacheConfig, CacheEntryId, EmbeddingClient, GenerateError,
    GenerateErrorKind, GenerateRequest, GenerationFailedError, LlmClient, TransientError,
};
use aegis_resilience::{CircuitBreaker, Protected, RetryPolicy, TokenBucket};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Options controlling a single `query` call.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Allow returning an embedding-tier hit (similarity between
    /// `embeddingThreshold` and `similarThreshold`) instead of regenerating.
    pub accept_approximate: bool,
    /// Extra context passed straight through to `Generate` on a miss.
    pub context: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheMetrics {
    pub hits_exact: u64,
    pub hits_similar: u64,
    pub hits_embedding: u64,
    pub misses: u64,
    pub generation_failures: u64,
}

struct Metrics {
    inner: parking_lot::Mutex<CacheMetrics>,
}

impl Metrics {
    fn new() -> Self {
        Self {
            inner: parking_lot::Mutex::new(CacheMetrics::default()),
        }
    }

    fn record(&self, f: impl FnOnce(&mut CacheMetrics)) {
        f(&mut self.inner.lock());
    }

    fn snapshot(&self) -> CacheMetrics {
        *self.inner.lock()
    }
}

/// The cache-augmented generation engine. One instance is shared (behind an
/// `Arc`) across every caller in the process.
pub struct CacheEngine {
    entries: RwLock<HashMap<CacheEntryId, CacheEntry>>,
    config: CacheConfig,
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingClient>,
    single_flight: SingleFlight<Result<CacheEntry, AegisError>>,
    limiter: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    retry_policy: RetryPolicy,
    metrics: Metrics,
}

impl CacheEngine {
    pub fn new(
        config: CacheConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingClient>,
        limiter: TokenBucket,
        breaker: CircuitBreaker,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            llm,
            embedder,
            single_flight: SingleFlight::new(),
            limiter: Arc::new(limiter),
            breaker: Arc::new(breaker),
            retry_policy,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.snapshot()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[instrument(skip(self, opts), fields(qid))]
    pub async fn query(&self, q: &str, opts: QueryOptions) -> AegisResult<CacheResponse> {
        let started = Instant::now();
        let normalized = normalize(q);
        let qid = query_id(&normalized);
        tracing::Span::current().record("qid", tracing::field::debug(&qid));

        if let Some(response) = self.try_exact_hit(&qid, started) {
            return Ok(response);
        }

        let qv = self.embedder.embed(&normalized).await?;

        if let Some(response) = self.try_similar_or_embedding_hit(&qv, opts.accept_approximate, started) {
            return Ok(response);
        }

        self.metrics.record(|m| m.misses += 1);
        let entry = self.generate_and_insert(&qid, &normalized, opts.context.as_deref()).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(CacheResponse::from_entry(&entry, CacheHitType::None, None, elapsed_ms))
    }

    fn try_exact_hit(&self, qid: &CacheEntryId, started: Instant) -> Option<CacheResponse> {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let entry = entries.get_mut(qid)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.hit_count += 1;
        entry.last_accessed = now;
        extend_ttl(entry, &self.config);
        self.metrics.record(|m| m.hits_exact += 1);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Some(CacheResponse::from_entry(entry, CacheHitType::Exact, Some(1.0), elapsed_ms))
    }

    fn try_similar_or_embedding_hit(
        &self,
        qv: &[f32],
        accept_approximate: bool,
        started: Instant,
    ) -> Option<CacheResponse> {
        let now = Utc::now();
        let mut entries = self.entries.write();

        let mut candidates: Vec<&CacheEntryId> = entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(id, _)| id)
            .collect();
        candidates.sort_by_key(|id| std::cmp::Reverse(entries.get(*id).unwrap().last_accessed));
        candidates.truncate(self.config.top_k_similar);

        let mut best: Option<(CacheEntryId, f32)> = None;
        for id in candidates {
            let score = entries
                .get(id)
                .map(|e| aegis_vector::cosine_similarity(&e.embedding, qv))
                .unwrap_or(f32::MIN);
            if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((*id, score));
            }
        }

        let (best_id, score) = best?;
        if score >= self.config.similar_threshold {
            let entry = entries.get_mut(&best_id)?;
            entry.hit_count += 1;
            entry.last_accessed = now;
            extend_ttl(entry, &self.config);
            self.metrics.record(|m| m.hits_similar += 1);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            return Some(CacheResponse::from_entry(entry, CacheHitType::Similar, Some(score), elapsed_ms));
        }
        if score >= self.config.embedding_threshold && accept_approximate {
            let entry = entries.get_mut(&best_id)?;
            entry.hit_count += 1;
            entry.last_accessed = now;
            extend_ttl(entry, &self.config);
            self.metrics.record(|m| m.hits_embedding += 1);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            return Some(CacheResponse::from_entry(entry, CacheHitType::Embedding, Some(score), elapsed_ms));
        }
        None
    }

    /// Runs the downstream `Generate` call under single-flight coalescing
    /// keyed by `qid`, protected by the shared limiter/breaker/retry policy.
    async fn generate_and_insert(
        &self,
        qid: &CacheEntryId,
        normalized: &str,
        context: Option<&str>,
    ) -> AegisResult<CacheEntry> {
        let key = *qid;
        let normalized = normalized.to_string();
        let context = context.map(|s| s.to_string());
        let llm = Arc::clone(&self.llm);
        let embedder = Arc::clone(&self.embedder);
        let retry_policy = self.retry_policy.clone();
        let limiter = Arc::clone(&self.limiter);
        let breaker = Arc::clone(&self.breaker);

        let result = self
            .single_flight
            .run_or_join(key, move || async move {
                // The limiter/breaker Arcs (and everything else this task
                // touches) are moved in above so this future is fully
                // owned and needs no borrow back into `self` — it runs
                // detached on `tokio::spawn` and must be `'static`.
                let protected = Protected::new(retry_policy).with_limiter(&limiter).with_breaker(&breaker);
                let prompt = match &context {
                    Some(ctx) => format!("{}\n\n{}", ctx, normalized),
                    None => normalized.clone(),
                };
                let generated = protected
                    .call(is_retryable, || {
                        let llm = Arc::clone(&llm);
                        let prompt = prompt.clone();
                        async move {
                            llm.generate(GenerateRequest {
                                prompt: prompt.clone(),
                                max_tokens: None,
                                temperature: None,
                                stop: Vec::new(),
                                deadline: Utc::now() + chrono::Duration::seconds(30),
                            })
                            .await
                            .map_err(|e: GenerateError| match e.kind {
                                GenerateErrorKind::Transient => TransientError {
                                    operation: "cag.generate".to_string(),
                                    reason: e.message,
                                },
                                GenerateErrorKind::Permanent => TransientError {
                                    operation: "cag.generate".to_string(),
                                    reason: format!("permanent:{}", e.message),
                                },
                            })
                        }
                    })
                    .await?;

                let embedding = embedder.embed(&normalized).await?;
                let now = Utc::now();
                Ok(CacheEntry {
                    id: key,
                    normalized_query: normalized.clone(),
                    embedding,
                    response: generated,
                    confidence: 1.0,
                    techniques: Vec::new(),
                    tools: Vec::new(),
                    code_examples: Vec::new(),
                    sources: Vec::new(),
                    hit_count: 0,
                    ttl_sec: 0,
                    created_at: now,
                    last_accessed: now,
                })
            })
            .await;

        match result {
            Ok(mut entry) => {
                entry.ttl_sec = self.config.base_ttl_sec;
                self.insert(entry.clone());
                Ok(entry)
            }
            Err(err) => {
                self.metrics.record(|m| m.generation_failures += 1);
                Err(AegisError::GenerationFailed(GenerationFailedError {
                    reason: err.to_string(),
                }))
            }
        }
    }

    fn insert(&self, entry: CacheEntry) {
        let mut entries = self.entries.write();
        entries.insert(entry.id, entry);
        drop(entries);
        self.evict_if_over_budget();
    }

    /// Evicts TTL-expired entries first, then strict LRU, until the cache is
    /// back under `maxEntries`/`maxBytes`.
    fn evict_if_over_budget(&self) {
        let now = Utc::now();
        let mut entries = self.entries.write();

        let expired: Vec<CacheEntryId> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            entries.remove(&id);
        }

        loop {
            let total_bytes: usize = entries.values().map(|e| e.estimated_bytes()).sum();
            if entries.len() <= self.config.max_entries && total_bytes <= self.config.max_bytes {
                break;
            }
            let lru = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(id, _)| *id);
            match lru {
                Some(id) => {
                    entries.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Runs `queries` sequentially under a concurrency cap, populating the
    /// cache ahead of real traffic.
    #[instrument(skip(self, queries))]
    pub async fn pre_warm(&self, queries: Vec<String>, concurrency: usize) -> Vec<AegisResult<()>> {
        let concurrency = concurrency.max(1);
        let mut results = Vec::with_capacity(queries.len());
        for chunk in queries.chunks(concurrency) {
            let futures = chunk.iter().map(|q| async move {
                self.query(q, QueryOptions::default()).await.map(|_| ())
            });
            results.extend(futures_util::future::join_all(futures).await);
        }
        results
    }

    pub(crate) fn snapshot(&self) -> Vec<CacheEntry> {
        self.entries.read().values().cloned().collect()
    }

    pub(crate) fn merge_entries(&self, incoming: Vec<CacheEntry>) {
        let mut entries = self.entries.write();
        for entry in incoming {
            match entries.get(&entry.id) {
                Some(existing) if existing.hit_count >= entry.hit_count => {}
                _ => {
                    entries.insert(entry.id, entry);
                }
            }
        }
    }
}

fn extend_ttl(entry: &mut CacheEntry, config: &CacheConfig) {
    let factor = 1.0 + (entry.hit_count as f64 / config.hit_saturation);
    let extended = (entry.ttl_sec as f64 * factor) as u64;
    entry.ttl_sec = extended.min(config.max_ttl_sec);
}

fn is_retryable(err: &TransientError) -> bool {
    !err.reason.starts_with("permanent:")
}

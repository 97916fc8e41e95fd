//! The stored cache entry and the response shape returned to callers
//! (spec §4.6 "Result shape").

use aegis_core::CacheEntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheHitType {
    Exact,
    Similar,
    Embedding,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: CacheEntryId,
    pub normalized_query: String,
    pub embedding: Vec<f32>,
    pub response: String,
    pub confidence: f32,
    #[serde(default)]
    pub techniques: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub code_examples: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub hit_count: u64,
    pub ttl_sec: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.created_at + chrono::Duration::seconds(self.ttl_sec as i64)
    }

    /// Approximate in-memory/on-disk footprint used for the `maxBytes`
    /// eviction budget.
    pub fn estimated_bytes(&self) -> usize {
        self.normalized_query.len()
            + self.response.len()
            + self.embedding.len() * std::mem::size_of::<f32>()
            + self.techniques.iter().map(|s| s.len()).sum::<usize>()
            + self.tools.iter().map(|s| s.len()).sum::<usize>()
            + self.code_examples.iter().map(|s| s.len()).sum::<usize>()
            + self.sources.iter().map(|s| s.len()).sum::<usize>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheResponse {
    pub response: String,
    pub cached: bool,
    pub cache_hit_type: CacheHitType,
    pub similarity_score: Option<f32>,
    pub confidence: f32,
    pub techniques: Vec<String>,
    pub tools: Vec<String>,
    pub code_examples: Vec<String>,
    pub sources: Vec<String>,
    pub processing_time_ms: u64,
}

impl CacheResponse {
    pub fn from_entry(entry: &CacheEntry, hit_type: CacheHitType, similarity_score: Option<f32>, processing_time_ms: u64) -> Self {
        Self {
            response: entry.response.clone(),
            cached: !matches!(hit_type, CacheHitType::None),
            cache_hit_type: hit_type,
            similarity_score,
            confidence: entry.confidence,
            techniques: entry.techniques.clone(),
            tools: entry.tools.clone(),
            code_examples: entry.code_examples.clone(),
            sources: entry.sources.clone(),
            processing_time_ms,
        }
    }
}

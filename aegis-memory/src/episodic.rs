//! Episodic memory: an append-only interaction log (spec §4.4). Queries
//! return either the most recent N records or the N most similar to a query
//! embedding — a linear scan, since episodic history is bounded by session
//! activity rather than corpus size.

use aegis_core::{EntityIdType, MemoryItemId};
use aegis_vector::cosine_similarity;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicRecord {
    pub id: MemoryItemId,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug)]
pub struct EpisodicStore {
    records: RwLock<VecDeque<EpisodicRecord>>,
}

impl EpisodicStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
        }
    }

    pub fn append(&self, text: String, embedding: Vec<f32>) -> MemoryItemId {
        let id = MemoryItemId::generate();
        self.records.write().push_back(EpisodicRecord {
            id,
            timestamp: Utc::now(),
            text,
            embedding,
        });
        id
    }

    /// Most recent `n` records, newest first.
    pub fn recent(&self, n: usize) -> Vec<EpisodicRecord> {
        let records = self.records.read();
        records.iter().rev().take(n).cloned().collect()
    }

    /// The `n` records whose embedding is most similar to `query`, highest
    /// similarity first.
    pub fn most_similar(&self, query: &[f32], n: usize) -> Vec<(EpisodicRecord, f32)> {
        let records = self.records.read();
        let mut scored: Vec<(EpisodicRecord, f32)> = records
            .iter()
            .map(|r| (r.clone(), cosine_similarity(query, &r.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn all(&self) -> Vec<EpisodicRecord> {
        self.records.read().iter().cloned().collect()
    }

    pub fn load(&self, records: Vec<EpisodicRecord>) {
        *self.records.write() = records.into();
    }
}

impl Default for EpisodicStore {
    fn default() -> Self {
        Self::new()
    }
}

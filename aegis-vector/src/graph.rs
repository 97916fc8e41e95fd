//! Hierarchical Navigable Small World graph (spec §4.3).
//!
//! Neighbor sets hold ids, never direct references, so removal is a map
//! delete plus two-way edge cleanup with no lifetime puzzles.

use crate::distance::cosine_similarity;
use aegis_core::{DocumentId, VectorError};
use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::cmp::Reverse;

/// `mL = 1 / ln(2)`, the layer-assignment decay constant from spec §4.3.
const ML: f64 = std::f64::consts::LOG2_E;

#[derive(Debug, Clone, Copy)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    vector: Vec<f32>,
    text: String,
    metadata: HashMap<String, serde_json::Value>,
    /// `neighbors[layer]` is the set of neighbor ids at that layer.
    neighbors: Vec<HashSet<DocumentId>>,
}

#[derive(Clone, Copy)]
struct Scored {
    score: f32,
    id: DocumentId,
}
impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.id == other.id
    }
}
impl Eq for Scored {}
impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scored {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// On-disk representation of a single node (spec §6 HNSW index format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedNode {
    pub id: DocumentId,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub connections: Vec<(usize, Vec<DocumentId>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub entry_point_id: Option<DocumentId>,
    pub max_layer: usize,
    pub nodes: Vec<PersistedNode>,
    pub dimension: Option<usize>,
}

/// A document returned by a similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: DocumentId,
    pub text: String,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug)]
pub struct HnswGraph {
    config: HnswConfig,
    dimension: Option<usize>,
    nodes: HashMap<DocumentId, HnswNode>,
    entry_point: Option<DocumentId>,
    max_layer: usize,
}

impl HnswGraph {
    pub fn new(config: HnswConfig) -> Self {
        Self {
            config,
            dimension: None,
            nodes: HashMap::new(),
            entry_point: None,
            max_layer: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn random_level(&self) -> usize {
        let u: f64 = loop {
            let u = rand::random::<f64>();
            if u > 0.0 {
                break u;
            }
        };
        (-u.ln() * ML).floor() as usize
    }

    /// Beam search at a single layer starting from `entry_points`. Returns up
    /// to `ef` hits sorted descending by similarity.
    fn search_layer(&self, entry_points: &[DocumentId], query: &[f32], ef: usize, layer: usize) -> Vec<Scored> {
        let mut visited: HashSet<DocumentId> = HashSet::new();
        let mut candidates: BinaryHeap<Scored> = BinaryHeap::new();
        let mut found: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();

        for &ep in entry_points {
            if let Some(node) = self.nodes.get(&ep) {
                if visited.insert(ep) {
                    let score = cosine_similarity(query, &node.vector);
                    candidates.push(Scored { score, id: ep });
                    found.push(Reverse(Scored { score, id: ep }));
                }
            }
        }

        while let Some(Scored { score: c_score, id: c_id }) = candidates.pop() {
            if let Some(Reverse(worst)) = found.peek() {
                if found.len() >= ef && c_score < worst.score {
                    break;
                }
            }
            let Some(node) = self.nodes.get(&c_id) else { continue };
            let Some(neighbor_set) = node.neighbors.get(layer) else { continue };
            for &n_id in neighbor_set {
                if !visited.insert(n_id) {
                    continue;
                }
                let Some(n_node) = self.nodes.get(&n_id) else { continue };
                let n_score = cosine_similarity(query, &n_node.vector);
                let worth_adding = found.len() < ef
                    || found.peek().map(|Reverse(w)| n_score > w.score).unwrap_or(true);
                if worth_adding {
                    candidates.push(Scored { score: n_score, id: n_id });
                    found.push(Reverse(Scored { score: n_score, id: n_id }));
                    if found.len() > ef {
                        found.pop();
                    }
                }
            }
        }

        let mut result: Vec<Scored> = found.into_iter().map(|Reverse(s)| s).collect();
        result.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        result
    }

    pub fn insert(
        &mut self,
        id: DocumentId,
        vector: Vec<f32>,
        text: String,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), VectorError> {
        match self.dimension {
            Some(dim) if dim != vector.len() => {
                return Err(VectorError::DimensionMismatch {
                    expected: dim,
                    got: vector.len(),
                })
            }
            None => self.dimension = Some(vector.len()),
            _ => {}
        }

        let level = self.random_level();
        let mut node = HnswNode {
            vector: vector.clone(),
            text,
            metadata,
            neighbors: vec![HashSet::new(); level + 1],
        };

        if self.nodes.is_empty() {
            self.entry_point = Some(id);
            self.max_layer = level;
            self.nodes.insert(id, node);
            return Ok(());
        }

        let entry = self.entry_point.expect("non-empty graph has an entry point");
        let mut cur = entry;
        for lc in ((level + 1)..=self.max_layer).rev() {
            if let Some(best) = self.search_layer(&[cur], &vector, 1, lc).first() {
                cur = best.id;
            }
        }

        let mut entry_points = vec![cur];
        for lc in (0..=level.min(self.max_layer)).rev() {
            let candidates = self.search_layer(&entry_points, &vector, self.config.ef_construction, lc);
            let m_max = if lc == 0 { self.config.m * 2 } else { self.config.m };
            let selected: Vec<Scored> = candidates.iter().take(self.config.m).copied().collect();

            for s in &selected {
                node.neighbors[lc].insert(s.id);
            }

            for s in &selected {
                let pruned = {
                    let Some(n) = self.nodes.get_mut(&s.id) else { continue };
                    if n.neighbors.len() <= lc {
                        n.neighbors.resize(lc + 1, HashSet::new());
                    }
                    n.neighbors[lc].insert(id);
                    if n.neighbors[lc].len() > m_max {
                        Some((n.vector.clone(), n.neighbors[lc].clone()))
                    } else {
                        None
                    }
                };
                if let Some((nv, current)) = pruned {
                    let mut scored: Vec<Scored> = current
                        .iter()
                        .filter_map(|&nid| {
                            self.nodes
                                .get(&nid)
                                .map(|n2| Scored { score: cosine_similarity(&nv, &n2.vector), id: nid })
                        })
                        .collect();
                    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                    scored.truncate(m_max);
                    if let Some(n) = self.nodes.get_mut(&s.id) {
                        n.neighbors[lc] = scored.into_iter().map(|sc| sc.id).collect();
                    }
                }
            }

            entry_points = candidates.iter().map(|s| s.id).collect();
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(id);
        }

        self.nodes.insert(id, node);
        Ok(())
    }

    pub fn remove(&mut self, id: DocumentId) -> bool {
        let Some(node) = self.nodes.remove(&id) else { return false };
        for (layer, neighbor_set) in node.neighbors.iter().enumerate() {
            for &nid in neighbor_set {
                if let Some(n) = self.nodes.get_mut(&nid) {
                    if n.neighbors.len() > layer {
                        n.neighbors[layer].remove(&id);
                    }
                }
            }
        }
        if self.entry_point == Some(id) {
            if let Some((&new_entry, _)) = self.nodes.iter().next() {
                self.entry_point = Some(new_entry);
                self.max_layer = self
                    .nodes
                    .values()
                    .map(|n| n.neighbors.len().saturating_sub(1))
                    .max()
                    .unwrap_or(0);
            } else {
                self.entry_point = None;
                self.max_layer = 0;
            }
        }
        true
    }

    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Vec<SearchHit> {
        if let Some(dim) = self.dimension {
            if query.len() != dim {
                tracing::warn!(expected = dim, got = query.len(), "query dimension mismatch, returning no hits");
                return Vec::new();
            }
        }
        let Some(entry) = self.entry_point else { return Vec::new() };
        let mut cur = entry;
        for lc in (1..=self.max_layer).rev() {
            if let Some(best) = self.search_layer(&[cur], query, 1, lc).first() {
                cur = best.id;
            }
        }
        let ef = self.config.ef_search.max(k);
        self.search_layer(&[cur], query, ef, 0)
            .into_iter()
            .filter(|s| s.score >= threshold)
            .take(k)
            .filter_map(|s| {
                self.nodes.get(&s.id).map(|n| SearchHit {
                    id: s.id,
                    text: n.text.clone(),
                    score: s.score,
                    metadata: n.metadata.clone(),
                })
            })
            .collect()
    }

    pub fn to_persisted(&self) -> PersistedIndex {
        PersistedIndex {
            entry_point_id: self.entry_point,
            max_layer: self.max_layer,
            dimension: self.dimension,
            nodes: self
                .nodes
                .iter()
                .map(|(id, n)| PersistedNode {
                    id: *id,
                    vector: n.vector.clone(),
                    text: n.text.clone(),
                    metadata: n.metadata.clone(),
                    connections: n
                        .neighbors
                        .iter()
                        .enumerate()
                        .map(|(layer, set)| (layer, set.iter().copied().collect()))
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn from_persisted(config: HnswConfig, persisted: PersistedIndex) -> Self {
        let mut nodes = HashMap::with_capacity(persisted.nodes.len());
        for pn in persisted.nodes {
            let mut neighbors: Vec<HashSet<DocumentId>> = Vec::new();
            for (layer, ids) in pn.connections {
                if neighbors.len() <= layer {
                    neighbors.resize(layer + 1, HashSet::new());
                }
                neighbors[layer] = ids.into_iter().collect();
            }
            nodes.insert(
                pn.id,
                HnswNode {
                    vector: pn.vector,
                    text: pn.text,
                    metadata: pn.metadata,
                    neighbors,
                },
            );
        }
        Self {
            config,
            dimension: persisted.dimension,
            nodes,
            entry_point: persisted.entry_point_id,
            max_layer: persisted.max_layer,
        }
    }
}

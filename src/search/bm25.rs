// src/search/bm25.rs
//! Okapi BM25 inverted index, tenant-sharded and in-process.
//!
//! Readers run concurrently; each write takes the shard's write lock, so
//! document postings and the (N, avg_len) statistics always move together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use uuid::Uuid;

lazy_static! {
    static ref TOKEN_SPLIT: Regex = Regex::new(r"\W+").expect("tokenizer regex");
}

/// Fixed, language-agnostic tokenization: lowercase, split on non-word
/// characters, drop tokens shorter than two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_SPLIT
        .split(&text.to_lowercase())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_string())
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        // k1 in [1.2, 2.0], b in [0.5, 0.8]
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Default)]
struct DocEntry {
    length: usize,
    term_counts: HashMap<String, usize>,
}

#[derive(Default)]
struct Bm25Shard {
    /// term → ids of documents containing it (df = set size)
    term_index: HashMap<String, HashSet<Uuid>>,
    document_index: HashMap<Uuid, DocEntry>,
    total_tokens: usize,
}

impl Bm25Shard {
    fn doc_count(&self) -> usize {
        self.document_index.len()
    }

    fn avg_len(&self) -> f32 {
        if self.document_index.is_empty() {
            0.0
        } else {
            self.total_tokens as f32 / self.document_index.len() as f32
        }
    }

    fn add(&mut self, id: Uuid, text: &str) {
        if self.document_index.contains_key(&id) {
            self.remove(id);
        }
        let tokens = tokenize(text);
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *term_counts.entry(token.clone()).or_insert(0) += 1;
        }
        for term in term_counts.keys() {
            self.term_index.entry(term.clone()).or_default().insert(id);
        }
        self.total_tokens += tokens.len();
        self.document_index.insert(
            id,
            DocEntry {
                length: tokens.len(),
                term_counts,
            },
        );
    }

    fn remove(&mut self, id: Uuid) -> bool {
        let Some(entry) = self.document_index.remove(&id) else {
            return false;
        };
        for term in entry.term_counts.keys() {
            if let Some(posting) = self.term_index.get_mut(term) {
                posting.remove(&id);
                if posting.is_empty() {
                    self.term_index.remove(term);
                }
            }
        }
        self.total_tokens -= entry.length;
        true
    }

    fn search(&self, query: &str, k: usize, params: Bm25Params) -> Vec<(Uuid, f32)> {
        let n = self.doc_count() as f32;
        if n == 0.0 {
            return vec![];
        }
        let avg_len = self.avg_len();

        let mut terms: Vec<String> = tokenize(query);
        terms.sort();
        terms.dedup();

        let mut scores: HashMap<Uuid, f32> = HashMap::new();
        for term in &terms {
            let Some(posting) = self.term_index.get(term) else {
                continue;
            };
            let df = posting.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for id in posting {
                let doc = &self.document_index[id];
                let tf = doc.term_counts[term] as f32;
                let denom = tf
                    + params.k1 * (1.0 - params.b + params.b * doc.length as f32 / avg_len);
                *scores.entry(*id).or_insert(0.0) += idf * tf * (params.k1 + 1.0) / denom;
            }
        }

        let mut ranked: Vec<(Uuid, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }
}

/// Tenant-keyed BM25 index.
pub struct Bm25Index {
    params: Bm25Params,
    shards: RwLock<HashMap<String, Arc<RwLock<Bm25Shard>>>>,
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            shards: RwLock::new(HashMap::new()),
        }
    }

    fn shard(&self, tenant_id: &str) -> Arc<RwLock<Bm25Shard>> {
        if let Some(shard) = self.shards.read().get(tenant_id) {
            return shard.clone();
        }
        self.shards
            .write()
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }

    fn shard_if_exists(&self, tenant_id: &str) -> Option<Arc<RwLock<Bm25Shard>>> {
        self.shards.read().get(tenant_id).cloned()
    }

    pub fn add(&self, tenant_id: &str, id: Uuid, text: &str) {
        self.shard(tenant_id).write().add(id, text);
    }

    pub fn remove(&self, tenant_id: &str, id: Uuid) -> bool {
        match self.shard_if_exists(tenant_id) {
            Some(shard) => shard.write().remove(id),
            None => false,
        }
    }

    pub fn search(&self, tenant_id: &str, query: &str, k: usize) -> Vec<(Uuid, f32)> {
        match self.shard_if_exists(tenant_id) {
            Some(shard) => shard.read().search(query, k, self.params),
            None => vec![],
        }
    }

    /// (document count, average document length) for a tenant.
    pub fn stats(&self, tenant_id: &str) -> (usize, f32) {
        match self.shard_if_exists(tenant_id) {
            Some(shard) => {
                let shard = shard.read();
                (shard.doc_count(), shard.avg_len())
            }
            None => (0, 0.0),
        }
    }

    /// Document frequency of a single term within a tenant.
    pub fn doc_frequency(&self, tenant_id: &str, term: &str) -> usize {
        match self.shard_if_exists(tenant_id) {
            Some(shard) => shard
                .read()
                .term_index
                .get(&term.to_lowercase())
                .map(|p| p.len())
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Drop a tenant's entire sparse index.
    pub fn clear_tenant(&self, tenant_id: &str) {
        self.shards.write().remove(tenant_id);
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new(Bm25Params::default())
    }
}

// src/graph/mod.rs

//! Lightweight knowledge graph over stored text: regex-extracted
//! entities, pattern-matched relations, adjacency kept per tenant.
//! Secondary surface — best-effort extraction, no model in the loop.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

lazy_static! {
    static ref ENTITY_RE: Regex =
        Regex::new(r"\b[A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+){0,3}\b").expect("entity regex");
    static ref EMAIL_RE: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex");
    /// "<A> works at <B>", "<A> is a <B>", "<A> lives in <B>", ...
    static ref RELATION_RE: Regex = Regex::new(
        r"\b([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)\s+(works? (?:at|for)|is (?:a|an|the)|lives? in|manages?|reports? to|founded|uses?|owns?)\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)"
    )
    .expect("relation regex");
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Named,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Default)]
struct TenantGraph {
    nodes: HashSet<Entity>,
    /// subject → outgoing relations.
    edges: HashMap<String, Vec<Relation>>,
    edge_count: usize,
}

/// Per-tenant knowledge graph built from extracted entities/relations.
#[derive(Default)]
pub struct KnowledgeGraph {
    tenants: RwLock<HashMap<String, TenantGraph>>,
}

/// Pull entity mentions out of free text: capitalized runs and emails,
/// de-duplicated in order of first appearance.
pub fn extract_entities(text: &str) -> Vec<Entity> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in ENTITY_RE.find_iter(text) {
        let name = m.as_str().to_string();
        if seen.insert(name.clone()) {
            out.push(Entity {
                name,
                kind: EntityKind::Named,
            });
        }
    }
    for m in EMAIL_RE.find_iter(text) {
        let name = m.as_str().to_string();
        if seen.insert(name.clone()) {
            out.push(Entity {
                name,
                kind: EntityKind::Email,
            });
        }
    }
    out
}

/// Pattern-matched subject–predicate–object triples.
pub fn extract_relations(text: &str) -> Vec<Relation> {
    let mut out = Vec::new();
    for caps in RELATION_RE.captures_iter(text) {
        let relation = Relation {
            subject: caps[1].to_string(),
            predicate: caps[2].trim().to_string(),
            object: caps[3].to_string(),
        };
        if !out.contains(&relation) {
            out.push(relation);
        }
    }
    out
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract from `text` and fold the result into the tenant's graph.
    /// Returns (entities added, relations added).
    pub fn ingest(&self, tenant_id: &str, text: &str) -> (usize, usize) {
        let entities = extract_entities(text);
        let relations = extract_relations(text);

        let mut tenants = self.tenants.write();
        let graph = tenants.entry(tenant_id.to_string()).or_default();
        let mut added_nodes = 0;
        for entity in entities {
            if graph.nodes.insert(entity) {
                added_nodes += 1;
            }
        }
        let mut added_edges = 0;
        for relation in relations {
            let slot = graph.edges.entry(relation.subject.clone()).or_default();
            if !slot.contains(&relation) {
                slot.push(relation);
                graph.edge_count += 1;
                added_edges += 1;
            }
        }
        debug!(
            "graph ingest for {tenant_id}: +{added_nodes} nodes, +{added_edges} edges"
        );
        (added_nodes, added_edges)
    }

    /// Relations touching an entity, either side.
    pub fn query(&self, tenant_id: &str, entity: &str) -> Vec<Relation> {
        let tenants = self.tenants.read();
        let Some(graph) = tenants.get(tenant_id) else {
            return vec![];
        };
        let mut out: Vec<Relation> = graph
            .edges
            .get(entity)
            .cloned()
            .unwrap_or_default();
        for relations in graph.edges.values() {
            for relation in relations {
                if relation.object == entity && !out.contains(relation) {
                    out.push(relation.clone());
                }
            }
        }
        out
    }

    pub fn stats(&self, tenant_id: &str) -> GraphStats {
        let tenants = self.tenants.read();
        match tenants.get(tenant_id) {
            Some(graph) => GraphStats {
                node_count: graph.nodes.len(),
                edge_count: graph.edge_count,
            },
            None => GraphStats::default(),
        }
    }

    pub fn clear(&self, tenant_id: &str) {
        self.tenants.write().remove(tenant_id);
    }
}

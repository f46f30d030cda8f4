// src/lineage.rs
//! Append-only audit trail: one event list per memory, plus typed
//! relations between memories. Events are never mutated after append.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::MemoryUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageEventType {
    Created,
    Updated,
    Accessed,
    Deleted,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEvent {
    pub memory_id: Uuid,
    pub event_type: LineageEventType,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Option<String>,
    pub new_hash: Option<String>,
    pub related_ids: Vec<Uuid>,
    pub details: HashMap<String, String>,
}

impl LineageEvent {
    fn new(memory_id: Uuid, tenant_id: &str, event_type: LineageEventType) -> Self {
        Self {
            memory_id,
            event_type,
            tenant_id: tenant_id.to_string(),
            timestamp: Utc::now(),
            previous_hash: None,
            new_hash: None,
            related_ids: Vec::new(),
            details: HashMap::new(),
        }
    }
}

/// Typed link between two memories, stored separately from events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    MergedFrom,
    RelatedTo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelation {
    pub from: Uuid,
    pub to: Uuid,
    pub kind: RelationKind,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
}

/// Filters for reading a memory's history.
#[derive(Debug, Clone, Default)]
pub struct LineageQuery {
    pub event_types: Option<Vec<LineageEventType>>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// In-process lineage store. Appends are guarded by a per-memory mutex;
/// the recording operations do not fail in steady state.
#[derive(Default)]
pub struct LineageTracker {
    events: RwLock<HashMap<Uuid, Arc<Mutex<Vec<LineageEvent>>>>>,
    relations: RwLock<HashMap<Uuid, Vec<MemoryRelation>>>,
}

impl LineageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, event: LineageEvent) {
        let list = {
            let events = self.events.read();
            events.get(&event.memory_id).cloned()
        };
        let list = match list {
            Some(list) => list,
            None => self
                .events
                .write()
                .entry(event.memory_id)
                .or_default()
                .clone(),
        };
        list.lock().push(event);
    }

    pub fn record_created(&self, unit: &MemoryUnit) {
        let mut event = LineageEvent::new(unit.id, &unit.tenant_id, LineageEventType::Created);
        event.new_hash = unit.content_hash().map(str::to_string);
        self.log(event);
    }

    pub fn record_updated(
        &self,
        unit: &MemoryUnit,
        previous_hash: Option<String>,
        new_hash: Option<String>,
    ) {
        let mut event = LineageEvent::new(unit.id, &unit.tenant_id, LineageEventType::Updated);
        event.previous_hash = previous_hash;
        event.new_hash = new_hash;
        self.log(event);
    }

    pub fn record_accessed(&self, tenant_id: &str, memory_id: Uuid) {
        self.log(LineageEvent::new(
            memory_id,
            tenant_id,
            LineageEventType::Accessed,
        ));
    }

    pub fn record_deleted(&self, tenant_id: &str, memory_id: Uuid, hard: bool) {
        let mut event = LineageEvent::new(memory_id, tenant_id, LineageEventType::Deleted);
        event
            .details
            .insert("hard".to_string(), hard.to_string());
        self.log(event);
    }

    /// Merged event on the surviving primary, listing the absorbed ids.
    pub fn record_merged(&self, primary: &MemoryUnit, sources: &[Uuid]) {
        let mut event =
            LineageEvent::new(primary.id, &primary.tenant_id, LineageEventType::Merged);
        event.related_ids = sources.to_vec();
        event
            .details
            .insert("source_count".to_string(), sources.len().to_string());
        self.log(event);

        for source in sources {
            self.record_relation(MemoryRelation {
                from: primary.id,
                to: *source,
                kind: RelationKind::MergedFrom,
                tenant_id: primary.tenant_id.clone(),
                created_at: Utc::now(),
            });
        }
    }

    pub fn record_relation(&self, relation: MemoryRelation) {
        self.relations
            .write()
            .entry(relation.from)
            .or_default()
            .push(relation);
    }

    /// Event history for one memory, newest first.
    pub fn events_for(&self, memory_id: Uuid, query: &LineageQuery) -> Vec<LineageEvent> {
        let list = {
            let events = self.events.read();
            events.get(&memory_id).cloned()
        };
        let Some(list) = list else {
            return vec![];
        };

        let mut out: Vec<LineageEvent> = list
            .lock()
            .iter()
            .filter(|e| {
                if let Some(ref types) = query.event_types {
                    if !types.contains(&e.event_type) {
                        return false;
                    }
                }
                if let Some(after) = query.after {
                    if e.timestamp < after {
                        return false;
                    }
                }
                if let Some(before) = query.before {
                    if e.timestamp > before {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        out.reverse();
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        out
    }

    pub fn relations_for(&self, memory_id: Uuid) -> Vec<MemoryRelation> {
        self.relations
            .read()
            .get(&memory_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove every trace of a memory. Called on hard delete.
    pub fn purge(&self, memory_id: Uuid) {
        self.events.write().remove(&memory_id);
        self.relations.write().remove(&memory_id);
    }
}

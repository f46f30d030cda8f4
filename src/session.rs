// src/session.rs
// Tenant session registry, created lazily on first use

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::types::Session;

/// Per-session activity bookkeeping.
#[derive(Debug, Clone)]
pub struct SessionActivity {
    pub last_activity: DateTime<Utc>,
    pub total_messages: usize,
}

/// Tracks sessions per tenant. A session exists as soon as something
/// touches it; "active" sessions are those not explicitly closed.
#[derive(Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<(String, String), Session>>>,
    activity: Arc<RwLock<HashMap<(String, String), SessionActivity>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch-or-create. The first touch creates the session as active.
    pub async fn touch(&self, tenant_id: &str, session_id: &str) -> Session {
        let key = (tenant_id.to_string(), session_id.to_string());
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key)
            .or_insert_with(|| {
                debug!("creating session {session_id} for tenant {tenant_id}");
                Session {
                    tenant_id: tenant_id.to_string(),
                    session_id: session_id.to_string(),
                    name: None,
                    created_at: Utc::now(),
                    is_active: true,
                }
            })
            .clone()
    }

    /// Bump the message counter and refresh last-activity. Creates the
    /// session if needed and returns the new count.
    pub async fn record_message(&self, tenant_id: &str, session_id: &str) -> usize {
        self.touch(tenant_id, session_id).await;
        let key = (tenant_id.to_string(), session_id.to_string());
        let mut activity = self.activity.write().await;
        let entry = activity.entry(key).or_insert_with(|| SessionActivity {
            last_activity: Utc::now(),
            total_messages: 0,
        });
        entry.total_messages += 1;
        entry.last_activity = Utc::now();
        entry.total_messages
    }

    pub async fn activity(&self, tenant_id: &str, session_id: &str) -> Option<SessionActivity> {
        let key = (tenant_id.to_string(), session_id.to_string());
        self.activity.read().await.get(&key).cloned()
    }

    pub async fn rename(&self, tenant_id: &str, session_id: &str, name: &str) -> bool {
        let key = (tenant_id.to_string(), session_id.to_string());
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&key) {
            Some(session) => {
                session.name = Some(name.to_string());
                true
            }
            None => false,
        }
    }

    /// Mark a session closed. Returns false if it never existed.
    pub async fn close(&self, tenant_id: &str, session_id: &str) -> bool {
        let key = (tenant_id.to_string(), session_id.to_string());
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&key) {
            Some(session) => {
                session.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Sessions for one tenant, optionally only the active ones, ordered
    /// newest first.
    pub async fn list(&self, tenant_id: &str, active_only: bool) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut out: Vec<Session> = sessions
            .values()
            .filter(|s| s.tenant_id == tenant_id && (!active_only || s.is_active))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

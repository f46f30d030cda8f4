// src/rate_limit.rs
//! Sliding-window admission control, two-level: per (tenant, operation)
//! and a per-tenant global cap. Acquisition order is fixed — per-op
//! first, then global — and a global denial rolls the per-op grant back.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Store,
    Recall,
    Update,
    Delete,
    Batch,
    /// The tenant-wide window. Acquiring `Any` skips the global level.
    Any,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Store => "store",
            Operation::Recall => "recall",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Batch => "batch",
            Operation::Any => "any",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub is_permitted: bool,
    pub remaining: usize,
    pub retry_after: Option<Duration>,
    pub denial_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub limit: usize,
    pub remaining: usize,
    /// Time until the oldest permit in the window expires.
    pub reset_after: Duration,
}

type WindowKey = (String, Operation);

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: RwLock<HashMap<WindowKey, Arc<Mutex<VecDeque<Instant>>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    fn permits_for(&self, op: Operation) -> usize {
        match op {
            Operation::Store => self.config.store_permits,
            Operation::Recall => self.config.recall_permits,
            Operation::Update => self.config.update_permits,
            Operation::Delete => self.config.delete_permits,
            Operation::Batch => self.config.batch_permits,
            Operation::Any => self.config.global_permits,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    fn queue(&self, tenant_id: &str, op: Operation) -> Arc<Mutex<VecDeque<Instant>>> {
        let key = (tenant_id.to_string(), op);
        if let Some(queue) = self.windows.read().get(&key) {
            return queue.clone();
        }
        self.windows.write().entry(key).or_default().clone()
    }

    /// Try to take one permit. Evicts expired timestamps, then checks the
    /// per-op window and (for ops other than Any) the tenant-global one.
    pub fn acquire(&self, tenant_id: &str, op: Operation) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision {
                is_permitted: true,
                remaining: usize::MAX,
                retry_after: None,
                denial_reason: None,
            };
        }

        let now = Instant::now();
        let window = self.window();

        // Level 1: per-operation.
        let op_queue = self.queue(tenant_id, op);
        {
            let mut queue = op_queue.lock();
            evict(&mut queue, now, window);
            let max = self.permits_for(op);
            if queue.len() >= max {
                return self.deny(&queue, now, max, op);
            }
            queue.push_back(now);
        }

        // Level 2: tenant-global, with rollback on denial.
        if op != Operation::Any {
            let global_queue = self.queue(tenant_id, Operation::Any);
            let mut queue = global_queue.lock();
            evict(&mut queue, now, window);
            let max = self.permits_for(Operation::Any);
            if queue.len() >= max {
                // Release the per-op permit we just took.
                op_queue.lock().pop_back();
                debug!("global window full for tenant {tenant_id}, rolled back {op:?}");
                return self.deny(&queue, now, max, Operation::Any);
            }
            queue.push_back(now);
        }

        let remaining = {
            let queue = op_queue.lock();
            self.permits_for(op).saturating_sub(queue.len())
        };
        RateLimitDecision {
            is_permitted: true,
            remaining,
            retry_after: None,
            denial_reason: None,
        }
    }

    fn deny(
        &self,
        queue: &VecDeque<Instant>,
        now: Instant,
        max: usize,
        level: Operation,
    ) -> RateLimitDecision {
        let retry_after = queue
            .front()
            .map(|oldest| {
                let elapsed = now.duration_since(*oldest);
                self.window().saturating_sub(elapsed)
            })
            .filter(|d| *d >= Duration::from_secs(1))
            .unwrap_or(Duration::from_secs(1));
        RateLimitDecision {
            is_permitted: false,
            remaining: 0,
            retry_after: Some(retry_after),
            denial_reason: Some(format!(
                "{} limit exceeded: {} requests per {} seconds",
                level.as_str(),
                max,
                self.config.window_secs
            )),
        }
    }

    /// Evict and report, without consuming a permit.
    pub fn status(&self, tenant_id: &str, op: Operation) -> RateLimitStatus {
        let now = Instant::now();
        let window = self.window();
        let max = self.permits_for(op);

        let queue = self.queue(tenant_id, op);
        let mut queue = queue.lock();
        evict(&mut queue, now, window);
        let reset_after = queue
            .front()
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO);
        RateLimitStatus {
            limit: max,
            remaining: max.saturating_sub(queue.len()),
            reset_after,
        }
    }

    /// Drop every window belonging to a tenant.
    pub fn reset(&self, tenant_id: &str) {
        self.windows.write().retain(|(t, _), _| t != tenant_id);
    }
}

fn evict(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = queue.front() {
        if now.duration_since(*front) > window {
            queue.pop_front();
        } else {
            break;
        }
    }
}

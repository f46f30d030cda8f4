// src/working_memory/mod.rs

//! Self-editing working memory: a bounded per-session context with
//! reflection triggers and archival overflow into long-term storage.
//!
//! All operations on one session run under that session's mutex for
//! their full duration; sessions never contend with each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::WorkingMemoryConfig;
use crate::core::traits::MemoryStore;
use crate::core::types::{MemoryType, MemoryUnit};
use crate::dedup::content_hash;
use crate::embeddings::EmbeddingGateway;
use crate::error::Result;
use crate::summarize::ExtractiveSummarizer;

/// Importance keywords: each distinct hit adds half a point.
const IMPORTANCE_KEYWORDS: &[&str] = &[
    "important",
    "critical",
    "remember",
    "must",
    "urgent",
    "deadline",
    "decision",
    "password",
    "never",
    "always",
];

const CODE_MARKERS: &[&str] = &["```", "function", "class", "fn ", "def "];

/// Which slot `replace` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextLocation {
    /// Pinned persona text.
    Core,
    /// Rolling conversation context.
    Context,
}

#[derive(Debug)]
struct WorkingMemoryState {
    core: String,
    conversation_context: String,
    recent_summaries: VecDeque<String>,
    token_count: usize,
    max_tokens: usize,
    accumulated_importance: f32,
    memory_count: usize,
    last_updated: DateTime<Utc>,
}

impl WorkingMemoryState {
    fn new(max_tokens: usize) -> Self {
        Self {
            core: String::new(),
            conversation_context: String::new(),
            recent_summaries: VecDeque::new(),
            token_count: 0,
            max_tokens,
            accumulated_importance: 0.0,
            memory_count: 0,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub token_count: usize,
    pub truncated: bool,
    pub archived_tokens: usize,
    pub reflection_recommended: bool,
}

#[derive(Debug, Clone)]
pub struct ReflectOutcome {
    pub tokens_freed: usize,
    pub summary: String,
}

#[derive(Debug, Clone, Default)]
pub struct ManageOutcome {
    pub reflected: bool,
    pub truncated: bool,
    pub token_count: usize,
}

/// Snapshot of a session's working-memory bookkeeping.
#[derive(Debug, Clone)]
pub struct WorkingMemoryStats {
    pub token_count: usize,
    pub max_tokens: usize,
    pub accumulated_importance: f32,
    pub memory_count: usize,
    pub recent_summaries: usize,
    pub last_updated: DateTime<Utc>,
}

pub struct WorkingMemoryManager {
    store: Arc<dyn MemoryStore>,
    gateway: Arc<EmbeddingGateway>,
    summarizer: Arc<ExtractiveSummarizer>,
    config: WorkingMemoryConfig,
    sessions: RwLock<HashMap<(String, String), Arc<Mutex<WorkingMemoryState>>>>,
}

impl WorkingMemoryManager {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        gateway: Arc<EmbeddingGateway>,
        summarizer: Arc<ExtractiveSummarizer>,
        config: WorkingMemoryConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            summarizer,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn state(&self, tenant_id: &str, session_id: &str) -> Arc<Mutex<WorkingMemoryState>> {
        let key = (tenant_id.to_string(), session_id.to_string());
        if let Some(state) = self.sessions.read().await.get(&key) {
            return state.clone();
        }
        self.sessions
            .write()
            .await
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(WorkingMemoryState::new(self.config.max_tokens)))
            })
            .clone()
    }

    /// Swap a slot wholesale; returns the previous contents.
    pub async fn replace(
        &self,
        tenant_id: &str,
        session_id: &str,
        location: ContextLocation,
        text: &str,
    ) -> String {
        let state = self.state(tenant_id, session_id).await;
        let mut state = state.lock().await;
        let previous = match location {
            ContextLocation::Core => std::mem::replace(&mut state.core, text.to_string()),
            ContextLocation::Context => {
                std::mem::replace(&mut state.conversation_context, text.to_string())
            }
        };
        self.refresh(&mut state);
        previous
    }

    /// Append a turn to the conversation context, accumulate its
    /// estimated importance, and overflow-truncate if the cap nears.
    pub async fn update(
        &self,
        tenant_id: &str,
        session_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome> {
        let state = self.state(tenant_id, session_id).await;
        let mut state = state.lock().await;

        if !state.conversation_context.is_empty() {
            state.conversation_context.push_str("\n\n");
        }
        state.conversation_context.push_str(text);
        state.accumulated_importance += estimate_importance(text);
        state.memory_count += 1;
        self.refresh(&mut state);

        let mut outcome = UpdateOutcome {
            token_count: state.token_count,
            ..Default::default()
        };

        if state.token_count as f32 > 0.9 * state.max_tokens as f32 {
            let archived = self
                .truncate_and_archive(tenant_id, session_id, &mut state, cancel)
                .await?;
            outcome.truncated = archived > 0;
            outcome.archived_tokens = archived;
            outcome.token_count = state.token_count;
        }

        outcome.reflection_recommended = reflection_due(&state, self.config.reflection_threshold);
        Ok(outcome)
    }

    /// Reflection trigger check, without mutating anything.
    pub async fn should_reflect(&self, tenant_id: &str, session_id: &str) -> bool {
        let state = self.state(tenant_id, session_id).await;
        let state = state.lock().await;
        reflection_due(&state, self.config.reflection_threshold)
    }

    /// Summarize the context, archive the original, reset the context to
    /// the two most recent summaries, and zero the accumulator.
    pub async fn reflect(
        &self,
        tenant_id: &str,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ReflectOutcome> {
        let state = self.state(tenant_id, session_id).await;
        let mut state = state.lock().await;
        let before = state.token_count;

        let original = state.conversation_context.clone();
        let summary = if original.trim().is_empty() {
            String::new()
        } else {
            self.summarizer
                .summarize_text(&original, 0.7, cancel)
                .await?
                .content
        };

        if !original.trim().is_empty() {
            self.archive(tenant_id, session_id, &original, "reflection", cancel)
                .await?;
        }

        // Context resets to the tail of the existing summaries; the new
        // one enters the deque afterwards.
        let tail: Vec<String> = state
            .recent_summaries
            .iter()
            .rev()
            .take(2)
            .rev()
            .cloned()
            .collect();
        state.conversation_context = tail.join("\n\n");

        if !summary.is_empty() {
            state.recent_summaries.push_back(summary.clone());
            while state.recent_summaries.len() > self.config.max_recent_summaries {
                state.recent_summaries.pop_front();
            }
        }

        state.accumulated_importance = 0.0;
        state.memory_count = 0;
        self.refresh(&mut state);

        let freed = before.saturating_sub(state.token_count);
        info!(
            "reflection for {tenant_id}/{session_id}: freed ~{freed} tokens, {} summaries retained",
            state.recent_summaries.len()
        );
        Ok(ReflectOutcome {
            tokens_freed: freed,
            summary,
        })
    }

    /// Re-cap the session and bring it under budget: reflect when past
    /// 85% of the new cap, then truncate if still past 90%.
    pub async fn manage(
        &self,
        tenant_id: &str,
        session_id: &str,
        max_tokens: usize,
        cancel: &CancellationToken,
    ) -> Result<ManageOutcome> {
        {
            let state = self.state(tenant_id, session_id).await;
            let mut state = state.lock().await;
            state.max_tokens = max_tokens.max(1);
            self.refresh(&mut state);
        }

        let mut outcome = ManageOutcome::default();

        let over_soft = {
            let state = self.state(tenant_id, session_id).await;
            let state = state.lock().await;
            state.token_count as f32 > 0.85 * state.max_tokens as f32
        };
        if over_soft {
            self.reflect(tenant_id, session_id, cancel).await?;
            outcome.reflected = true;
        }

        let state = self.state(tenant_id, session_id).await;
        let mut state = state.lock().await;
        if state.token_count as f32 > 0.9 * state.max_tokens as f32 {
            let archived = self
                .truncate_and_archive(tenant_id, session_id, &mut state, cancel)
                .await?;
            outcome.truncated = archived > 0;
        }
        outcome.token_count = state.token_count;
        Ok(outcome)
    }

    pub async fn stats(&self, tenant_id: &str, session_id: &str) -> WorkingMemoryStats {
        let state = self.state(tenant_id, session_id).await;
        let state = state.lock().await;
        WorkingMemoryStats {
            token_count: state.token_count,
            max_tokens: state.max_tokens,
            accumulated_importance: state.accumulated_importance,
            memory_count: state.memory_count,
            recent_summaries: state.recent_summaries.len(),
            last_updated: state.last_updated,
        }
    }

    /// Number of summaries currently retained for a session.
    pub async fn recent_summaries(&self, tenant_id: &str, session_id: &str) -> Vec<String> {
        let state = self.state(tenant_id, session_id).await;
        let state = state.lock().await;
        state.recent_summaries.iter().cloned().collect()
    }

    fn refresh(&self, state: &mut WorkingMemoryState) {
        let mut tokens = estimate_tokens(&state.core, self.config.tokens_per_word)
            + estimate_tokens(&state.conversation_context, self.config.tokens_per_word);
        for summary in &state.recent_summaries {
            tokens += estimate_tokens(summary, self.config.tokens_per_word);
        }
        state.token_count = tokens;
        state.last_updated = Utc::now();
    }

    /// Cut a prefix of the context at a paragraph or sentence boundary
    /// within its first half and archive it. Returns the token estimate
    /// of the archived prefix.
    async fn truncate_and_archive(
        &self,
        tenant_id: &str,
        session_id: &str,
        state: &mut WorkingMemoryState,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let context = state.conversation_context.clone();
        let Some(cut) = truncation_point(&context) else {
            return Ok(0);
        };
        let (prefix, rest) = context.split_at(cut);
        let prefix = prefix.trim().to_string();
        if prefix.is_empty() {
            return Ok(0);
        }

        self.archive(tenant_id, session_id, &prefix, "truncation", cancel)
            .await?;
        state.conversation_context = rest.trim_start().to_string();
        self.refresh(state);
        debug!(
            "truncated working memory for {tenant_id}/{session_id}, context now ~{} tokens",
            state.token_count
        );
        Ok(estimate_tokens(&prefix, self.config.tokens_per_word))
    }

    async fn archive(
        &self,
        tenant_id: &str,
        session_id: &str,
        text: &str,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut unit = MemoryUnit::new(tenant_id, text)
            .with_session(session_id)
            .with_type(MemoryType::Semantic)
            .with_importance(0.7);
        unit.embedding = Some(self.gateway.embed(text, cancel).await?);
        unit.metadata
            .insert("source".to_string(), source.to_string());
        unit.metadata
            .insert("session_id".to_string(), session_id.to_string());
        unit.metadata
            .insert("content_hash".to_string(), content_hash(text));
        self.store.store(unit).await?;
        Ok(())
    }
}

fn reflection_due(state: &WorkingMemoryState, threshold: f32) -> bool {
    state.accumulated_importance >= threshold
        || (state.token_count as f32 >= 0.85 * state.max_tokens as f32
            && state.memory_count >= 5)
}

/// Deterministic importance of one turn: word volume, keyword hits,
/// questions, and code markers, capped at 5.
pub fn estimate_importance(text: &str) -> f32 {
    let mut score = 0.5f32;
    let words = text.split_whitespace().count() as f32;
    score += (words / 100.0).min(2.0);

    let lowercase = text.to_lowercase();
    for keyword in IMPORTANCE_KEYWORDS {
        if lowercase.contains(keyword) {
            score += 0.5;
        }
    }
    if text.contains('?') {
        score += 0.3;
    }
    if CODE_MARKERS.iter().any(|m| text.contains(m)) {
        score += 0.5;
    }
    score.min(5.0)
}

/// Words × tokens_per_word, words split on spaces, newlines, and tabs.
pub fn estimate_tokens(text: &str, tokens_per_word: f32) -> usize {
    let words = text
        .split([' ', '\n', '\t'])
        .filter(|w| !w.is_empty())
        .count();
    (words as f32 * tokens_per_word) as usize
}

/// Cut point inside the first half of the context: the last paragraph
/// break, else the last sentence end, else the midpoint.
fn truncation_point(context: &str) -> Option<usize> {
    if context.is_empty() {
        return None;
    }
    let half = context.len() / 2;
    if half == 0 {
        return None;
    }
    let head = &context[..floor_char_boundary(context, half)];
    if let Some(pos) = head.rfind("\n\n") {
        return Some(pos + 2);
    }
    if let Some(pos) = head.rfind(['.', '!', '?']) {
        return Some(pos + 1);
    }
    Some(head.len())
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, SummaryConfig};
    use crate::embeddings::HashedEmbedder;
    use crate::storage::InMemoryStore;

    const DIMS: usize = 32;

    fn manager(max_tokens: usize) -> (WorkingMemoryManager, Arc<dyn MemoryStore>) {
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new(DIMS));
        let gateway = Arc::new(EmbeddingGateway::new(
            Arc::new(HashedEmbedder::new(DIMS)),
            EmbeddingConfig {
                dimensions: DIMS,
                ..Default::default()
            },
        ));
        let summarizer = Arc::new(ExtractiveSummarizer::new(
            gateway.clone(),
            SummaryConfig::default(),
        ));
        let config = WorkingMemoryConfig {
            max_tokens,
            ..Default::default()
        };
        (
            WorkingMemoryManager::new(store.clone(), gateway, summarizer, config),
            store,
        )
    }

    fn turn(n: usize) -> String {
        format!(
            "Turn {n}: the team reviewed the ingestion metrics and agreed the backlog \
             should be drained before the next release train departs."
        )
    }

    // ============================================================================
    // Estimator tests
    // ============================================================================

    #[test]
    fn test_importance_base_and_cap() {
        assert!((estimate_importance("hi") - 0.5).abs() < 0.1);
        let loaded = "important critical remember must urgent ? ``` ".repeat(20);
        assert!((estimate_importance(&loaded) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_importance_keyword_and_question_bonuses() {
        let base = estimate_importance("plain statement");
        assert!(estimate_importance("this is important") > base);
        assert!(estimate_importance("is this fine?") > base);
    }

    #[test]
    fn test_token_estimate_scales_with_words() {
        assert_eq!(estimate_tokens("one two three", 1.3), 3);
        assert_eq!(estimate_tokens("", 1.3), 0);
        assert_eq!(estimate_tokens("a\nb\tc d", 1.0), 4);
    }

    // ============================================================================
    // Update and replace tests
    // ============================================================================

    #[tokio::test]
    async fn test_update_accumulates_importance_and_tokens() {
        let (manager, _) = manager(10_000);
        let cancel = CancellationToken::new();
        manager.update("t", "s", &turn(1), &cancel).await.unwrap();
        let outcome = manager.update("t", "s", &turn(2), &cancel).await.unwrap();

        assert!(outcome.token_count > 0);
        let stats = manager.stats("t", "s").await;
        assert!(stats.accumulated_importance > 1.0);
        assert_eq!(stats.memory_count, 2);
    }

    #[tokio::test]
    async fn test_replace_returns_previous_slot() {
        let (manager, _) = manager(10_000);
        manager
            .replace("t", "s", ContextLocation::Core, "persona v1")
            .await;
        let previous = manager
            .replace("t", "s", ContextLocation::Core, "persona v2")
            .await;
        assert_eq!(previous, "persona v1");
    }

    #[tokio::test]
    async fn test_overflow_truncates_and_archives() {
        let (manager, store) = manager(200);
        let cancel = CancellationToken::new();
        let mut truncated = false;
        for n in 0..30 {
            let outcome = manager.update("t", "s", &turn(n), &cancel).await.unwrap();
            truncated |= outcome.truncated;
        }
        assert!(truncated, "context should overflow a 200-token cap");
        assert!(store.count("t").await.unwrap() > 0, "prefix must be archived");
    }

    // ============================================================================
    // Reflection tests
    // ============================================================================

    #[tokio::test]
    async fn test_reflection_recommended_near_cap() {
        let (manager, _) = manager(1000);
        let cancel = CancellationToken::new();
        let mut recommended = false;
        for n in 0..40 {
            let outcome = manager.update("t", "s", &turn(n), &cancel).await.unwrap();
            if outcome.reflection_recommended {
                recommended = true;
                break;
            }
        }
        assert!(recommended);
    }

    #[tokio::test]
    async fn test_reflect_resets_accumulator_and_caps_summaries() {
        let (manager, _) = manager(1000);
        let cancel = CancellationToken::new();
        for round in 0..7 {
            for n in 0..6 {
                manager
                    .update("t", "s", &turn(round * 10 + n), &cancel)
                    .await
                    .unwrap();
            }
            manager.reflect("t", "s", &cancel).await.unwrap();
        }

        let stats = manager.stats("t", "s").await;
        assert!(stats.accumulated_importance.abs() < f32::EPSILON);
        assert!(stats.recent_summaries <= 5);
    }

    #[tokio::test]
    async fn test_reflect_frees_tokens() {
        let (manager, _) = manager(100_000);
        let cancel = CancellationToken::new();
        for n in 0..20 {
            manager.update("t", "s", &turn(n), &cancel).await.unwrap();
        }
        let before = manager.stats("t", "s").await.token_count;
        let outcome = manager.reflect("t", "s", &cancel).await.unwrap();
        let after = manager.stats("t", "s").await.token_count;
        assert!(after < before);
        assert_eq!(outcome.tokens_freed, before - after);
    }

    #[tokio::test]
    async fn test_manage_brings_session_under_new_cap() {
        let (manager, _) = manager(100_000);
        let cancel = CancellationToken::new();
        for n in 0..25 {
            manager.update("t", "s", &turn(n), &cancel).await.unwrap();
        }
        let outcome = manager.manage("t", "s", 300, &cancel).await.unwrap();
        assert!(outcome.reflected || outcome.truncated);
    }

    #[tokio::test]
    async fn test_accumulated_importance_alone_triggers_reflection() {
        let (manager, _) = manager(1_000_000);
        let cancel = CancellationToken::new();
        let loaded = "critical important urgent remember must meet the deadline decision";
        for _ in 0..4 {
            manager.update("t", "s", loaded, &cancel).await.unwrap();
        }
        // Far below the token cap and fewer than five turns: the
        // importance accumulator carries the trigger by itself.
        let stats = manager.stats("t", "s").await;
        assert!(stats.accumulated_importance >= 10.0);
        assert!(stats.memory_count < 5);
        assert!(manager.should_reflect("t", "s").await);
    }

    #[tokio::test]
    async fn test_token_pressure_alone_does_not_trigger_reflection() {
        let (manager, _) = manager(300);
        // Fill the context in one swap: high token pressure with zero
        // recorded turns and zero accumulated importance.
        let slab = "steady words without any signal ".repeat(40);
        manager
            .replace("t", "s", ContextLocation::Context, &slab)
            .await;

        let stats = manager.stats("t", "s").await;
        assert!(stats.token_count as f32 >= 0.85 * stats.max_tokens as f32);
        assert_eq!(stats.memory_count, 0);
        assert!(!manager.should_reflect("t", "s").await);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let (manager, _) = manager(10_000);
        let cancel = CancellationToken::new();
        manager.update("t", "one", &turn(1), &cancel).await.unwrap();
        let stats = manager.stats("t", "two").await;
        assert_eq!(stats.token_count, 0);
        assert_eq!(stats.memory_count, 0);
    }
}

// src/search/scoring.rs

//! Composite rescoring: relevance × recency × importance.
//!
//! Temporal decay is applied here and only here — the raw retrieval path
//! returns undecayed similarity so the decay can never be applied twice.

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::core::types::{MemoryUnit, ScoredMemory};

#[derive(Clone)]
pub struct CompositeScorer {
    config: ScoringConfig,
}

impl CompositeScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Rescore fused retrieval output. `fused` carries the raw RRF score
    /// per record; the result is ordered by the weighted composite with
    /// the standard deterministic tiebreak.
    pub fn rescore(
        &self,
        fused: Vec<(MemoryUnit, f32)>,
        now: DateTime<Utc>,
    ) -> Vec<ScoredMemory> {
        let max_rrf = fused
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0f32, f32::max);

        let total = self.config.relevance_weight
            + self.config.recency_weight
            + self.config.importance_weight;
        let (w_rel, w_rec, w_imp) = if total > 0.0 {
            (
                self.config.relevance_weight / total,
                self.config.recency_weight / total,
                self.config.importance_weight / total,
            )
        } else {
            (1.0, 0.0, 0.0)
        };

        let mut scored: Vec<ScoredMemory> = fused
            .into_iter()
            .map(|(memory, rrf)| {
                let relevance_score = if max_rrf > 0.0 { rrf / max_rrf } else { 0.0 };
                let recency_score = self.recency_score(&memory, now);
                let importance_score = memory.importance;
                let score =
                    w_rel * relevance_score + w_rec * recency_score + w_imp * importance_score;
                ScoredMemory {
                    memory,
                    score,
                    relevance_score,
                    recency_score,
                    importance_score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        scored
    }

    /// Exponential decay by age: `exp(−Δdays · ln(1/decay))`, i.e.
    /// `decay^Δdays`. A record created now scores 1.0.
    pub fn recency_score(&self, memory: &MemoryUnit, now: DateTime<Utc>) -> f32 {
        let decay = self.config.decay.clamp(1e-4, 1.0);
        let age_days = memory.age_days(now);
        (-age_days * (1.0 / decay).ln()).exp()
    }
}

impl Default for CompositeScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

// tests/summarize_compress_test.rs
// Summarization and compression through the service accessors

use tokio_util::sync::CancellationToken;

use recollect::compress::{CompressionOptions, CompressionStrategy};
use recollect::config::ServiceConfig;
use recollect::core::types::MemoryUnit;
use recollect::summarize::estimate_tokens;
use recollect::MemoryService;

fn service() -> MemoryService {
    let mut config = ServiceConfig::default();
    config.embedding.dimensions = 64;
    MemoryService::new(config)
}

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

fn meeting_memories() -> Vec<MemoryUnit> {
    let mut memories = vec![
        MemoryUnit::new(
            "t",
            "Monday sync covered the index migration. The owners agreed to freeze \
             schema changes until the backfill completes.",
        )
        .with_importance(0.8),
        MemoryUnit::new(
            "t",
            "Tuesday review walked through the backfill dashboard. Throughput held \
             at forty thousand rows per second overnight.",
        )
        .with_importance(0.6),
        MemoryUnit::new(
            "t",
            "Wednesday standup flagged a hot shard. Rebalancing was scheduled for \
             the weekend maintenance window.",
        )
        .with_importance(0.7),
        MemoryUnit::new(
            "t",
            "Thursday wrap-up confirmed the freeze lifts Friday. Retrospective notes \
             go to the shared folder.",
        )
        .with_importance(0.4),
    ];
    // Stable distinct ids; the summarizer tracks provenance by id.
    for (n, memory) in memories.iter_mut().enumerate() {
        memory.id = uuid::Uuid::from_u128(n as u128 + 1);
    }
    memories
}

// ============================================================================
// Extractive summarization
// ============================================================================

#[tokio::test]
async fn summary_respects_token_budget() {
    let service = service();
    let memories = meeting_memories();
    let source_tokens: usize = memories
        .iter()
        .map(|m| estimate_tokens(&m.content))
        .sum();

    let summary = service
        .summarizer()
        .summarize_memories(&memories, &cancel())
        .await
        .unwrap();

    assert!(summary.token_estimate < source_tokens);
    assert!(!summary.content.is_empty());
    assert!(summary.key_points.len() <= 5);
    assert!(summary.embedding.is_some());
}

#[tokio::test]
async fn summary_output_is_chronological() {
    let mut config = ServiceConfig::default();
    config.embedding.dimensions = 64;
    // Generous budget keeps every sentence so order is observable.
    config.summary.ratio = 1.0;
    config.summary.max_output_tokens = 10_000;
    let generous = MemoryService::new(config);

    let memories = meeting_memories();
    let summary = generous
        .summarizer()
        .summarize_memories(&memories, &cancel())
        .await
        .unwrap();

    let monday = summary.content.find("Monday").expect("kept under 1.0 ratio");
    let thursday = summary
        .content
        .find("Thursday")
        .expect("kept under 1.0 ratio");
    assert!(monday < thursday, "selected sentences must read in source order");
}

#[tokio::test]
async fn incremental_update_accumulates_sources() {
    let service = service();
    let first = vec![meeting_memories().remove(0)];
    let prior = service
        .summarizer()
        .summarize_memories(&first, &cancel())
        .await
        .unwrap();
    assert_eq!(prior.source_ids.len(), 1);

    let rest = meeting_memories().split_off(1);
    let updated = service
        .summarizer()
        .update(&prior, &rest, &cancel())
        .await
        .unwrap();

    assert!(!updated.content.is_empty());
    assert_eq!(updated.source_ids.len(), 4);
}

#[tokio::test]
async fn hierarchical_rollup_condenses_many_memories() {
    let service = service();
    let memories: Vec<MemoryUnit> = (0..15)
        .map(|n| {
            MemoryUnit::new(
                "t",
                format!(
                    "Operations journal entry {n} recorded queue depth, compaction \
                     cadence, and the state of the replica fleet."
                ),
            )
        })
        .collect();

    let rollup = service
        .summarizer()
        .summarize_hierarchical(&memories, 3, &cancel())
        .await
        .unwrap();

    assert!(!rollup.root.content.is_empty());
    assert!(rollup.levels[0].len() >= 2);
    let leaf_total: usize = rollup.levels[0].iter().map(|s| s.token_estimate).sum();
    assert!(rollup.root.token_estimate <= leaf_total);
}

// ============================================================================
// Compression strategies
// ============================================================================

const REPORT: &str = "The rollout started at dawn on Tuesday. Canary traffic stayed green \
    for six hours. A latency regression appeared in the Frankfurt region. The team pinned \
    the regression to a misconfigured connection pool. A fix shipped before the evening \
    cutoff and the rollout completed.";

#[test]
fn every_strategy_reduces_tokens() {
    let service = service();
    for strategy in [
        CompressionStrategy::TokenPruning,
        CompressionStrategy::SentencePruning,
        CompressionStrategy::Hybrid,
        CompressionStrategy::Heuristic,
    ] {
        let result = service.compressor().compress(
            REPORT,
            &CompressionOptions {
                strategy,
                target_ratio: 0.5,
                ..Default::default()
            },
        );
        assert!(
            result.compressed_tokens < result.original_tokens,
            "{strategy:?} failed to reduce"
        );
        assert!(!result.compressed.is_empty());
    }
}

#[test]
fn tighter_ratio_compresses_harder() {
    let service = service();
    let loose = service.compressor().compress(
        REPORT,
        &CompressionOptions {
            strategy: CompressionStrategy::TokenPruning,
            target_ratio: 0.8,
            ..Default::default()
        },
    );
    let tight = service.compressor().compress(
        REPORT,
        &CompressionOptions {
            strategy: CompressionStrategy::TokenPruning,
            target_ratio: 0.2,
            ..Default::default()
        },
    );
    assert!(tight.compressed_tokens < loose.compressed_tokens);
}

#[test]
fn required_keywords_survive_every_strategy() {
    let service = service();
    for strategy in [
        CompressionStrategy::TokenPruning,
        CompressionStrategy::Hybrid,
        CompressionStrategy::Heuristic,
    ] {
        let result = service.compressor().compress(
            REPORT,
            &CompressionOptions {
                strategy,
                target_ratio: 0.3,
                required_keywords: vec!["Frankfurt".to_string()],
                ..Default::default()
            },
        );
        assert!(
            result.compressed.contains("Frankfurt"),
            "{strategy:?} dropped a required keyword"
        );
    }
}

#[test]
fn reported_ratio_matches_token_counts() {
    let service = service();
    let result = service.compressor().compress(
        REPORT,
        &CompressionOptions {
            strategy: CompressionStrategy::SentencePruning,
            target_ratio: 0.5,
            ..Default::default()
        },
    );
    let expected = result.compressed_tokens as f32 / result.original_tokens as f32;
    assert!((result.ratio - expected).abs() < 1e-6);
}

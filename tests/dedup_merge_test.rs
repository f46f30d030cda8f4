// tests/dedup_merge_test.rs
// Semantic duplicate actions and batch merge maintenance

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use recollect::config::ServiceConfig;
use recollect::core::types::MemoryUnit;
use recollect::dedup::MergeStrategy;
use recollect::embeddings::{l2_normalize, EmbeddingGateway};
use recollect::lineage::{LineageEventType, LineageQuery, RelationKind};
use recollect::service::StoreRequest;
use recollect::storage::InMemoryStore;
use recollect::{EmbeddingProvider, MemoryService};

const DIMS: usize = 32;

/// Maps marker words to fixed directions so tests can pick exact
/// cosines between contents.
struct AxisEmbedder;

fn axis(primary: f32, secondary: f32, axis_index: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[0] = primary;
    v[axis_index] = secondary;
    l2_normalize(&mut v);
    v
}

#[async_trait]
impl EmbeddingProvider for AxisEmbedder {
    async fn embed(&self, text: &str) -> recollect::Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        Ok(out.pop().unwrap())
    }

    async fn embed_batch(&self, texts: &[String]) -> recollect::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                if text.contains("anchor") {
                    axis(1.0, 0.0, 1)
                } else if text.contains("close-96") {
                    // cos 0.96 against the anchor
                    axis(0.96, (1.0f32 - 0.96 * 0.96).sqrt(), 1)
                } else if text.contains("near-90") {
                    // cos 0.90
                    axis(0.90, (1.0f32 - 0.90 * 0.90).sqrt(), 2)
                } else if text.contains("kin-80") {
                    // cos 0.80
                    axis(0.80, (1.0f32 - 0.80 * 0.80).sqrt(), 3)
                } else {
                    axis(0.0, 1.0, 4)
                }
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

fn service_with_axis(duplicate_threshold: f32) -> MemoryService {
    let mut config = ServiceConfig::default();
    config.embedding.dimensions = DIMS;
    config.search.duplicate_threshold = duplicate_threshold;
    let store = Arc::new(InMemoryStore::new(DIMS));
    let gateway = Arc::new(EmbeddingGateway::new(
        Arc::new(AxisEmbedder),
        config.embedding.clone(),
    ));
    MemoryService::with_backend(config, store, gateway)
}

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

// ============================================================================
// Ingest-time semantic actions
// ============================================================================

#[tokio::test]
async fn much_longer_near_identical_content_updates_in_place() {
    let service = service_with_axis(0.85);
    let first = service
        .store(StoreRequest::new("t", "anchor note"), &cancel())
        .await;
    assert!(first.success);

    let longer = "close-96 note that is substantially longer than the original \
                  text and easily exceeds the update length ratio threshold";
    let second = service.store(StoreRequest::new("t", longer), &cancel()).await;

    let report = second.duplicate.expect("duplicate expected");
    assert_eq!(report.recommended_action, "update");
    assert_eq!(second.id, first.id);

    let fetched = service.get("t", first.id.unwrap()).await.memory.unwrap();
    assert!(fetched.content.contains("substantially longer"));
    assert_eq!(service.memory_store().count("t").await.unwrap(), 1);

    let events = service
        .lineage()
        .events_for(first.id.unwrap(), &LineageQuery::default());
    assert!(events
        .iter()
        .any(|e| e.event_type == LineageEventType::Updated));
}

#[tokio::test]
async fn mid_band_similarity_merges_content() {
    let service = service_with_axis(0.85);
    let first = service
        .store(StoreRequest::new("t", "anchor fact about the deadline."), &cancel())
        .await;

    let second = service
        .store(
            StoreRequest::new("t", "near-90 reminder to prepare slides."),
            &cancel(),
        )
        .await;
    let report = second.duplicate.expect("duplicate expected");
    assert_eq!(report.recommended_action, "merge");

    let fetched = service.get("t", first.id.unwrap()).await.memory.unwrap();
    assert!(fetched.content.contains("deadline"));
    assert!(fetched.content.contains("prepare slides"));
    assert_eq!(service.memory_store().count("t").await.unwrap(), 1);
}

#[tokio::test]
async fn low_band_adds_new_record_with_relation() {
    let service = service_with_axis(0.75);
    let first = service
        .store(StoreRequest::new("t", "anchor topic"), &cancel())
        .await;

    let second = service
        .store(StoreRequest::new("t", "kin-80 adjacent topic"), &cancel())
        .await;
    let report = second.duplicate.expect("duplicate expected");
    assert_eq!(report.recommended_action, "add_with_relation");
    assert_ne!(second.id, first.id);
    assert_eq!(service.memory_store().count("t").await.unwrap(), 2);

    let relations = service.lineage().relations_for(second.id.unwrap());
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].kind, RelationKind::RelatedTo);
    assert_eq!(relations[0].to, first.id.unwrap());
}

#[tokio::test]
async fn unrelated_content_is_stored_normally() {
    let service = service_with_axis(0.85);
    service
        .store(StoreRequest::new("t", "anchor subject"), &cancel())
        .await;
    let other = service
        .store(StoreRequest::new("t", "completely different matter"), &cancel())
        .await;
    assert!(other.success);
    assert!(other.duplicate.is_none());
    assert_eq!(service.memory_store().count("t").await.unwrap(), 2);
}

// ============================================================================
// Batch merge maintenance
// ============================================================================

async fn seed_raw(service: &MemoryService, content: &str, vector: Vec<f32>, importance: f32) {
    let mut unit = MemoryUnit::new("t", content).with_importance(importance);
    unit.embedding = Some(vector);
    let saved = service.memory_store().store(unit).await.unwrap();
    service.sparse_index().add("t", saved.id, content);
}

#[tokio::test]
async fn merge_duplicates_collapses_groups_and_logs_lineage() {
    let service = service_with_axis(0.85);
    // Seed directly at the index layer so ingest dedup does not collapse
    // the cluster before the maintenance pass runs.
    seed_raw(&service, "cluster head", axis(1.0, 0.0, 1), 0.4).await;
    seed_raw(&service, "cluster echo one", axis(0.97, 0.243, 1), 0.9).await;
    seed_raw(&service, "cluster echo two", axis(0.96, 0.28, 1), 0.2).await;
    seed_raw(&service, "free-standing record", axis(0.0, 1.0, 5), 0.5).await;

    let report = service
        .merge_duplicates("t", MergeStrategy::KeepHighestImportance, &cancel())
        .await
        .unwrap();

    assert_eq!(report.groups_merged, 1);
    assert_eq!(report.memories_removed, 2);
    assert_eq!(service.memory_store().count("t").await.unwrap(), 2);

    // The survivor carries the highest importance and a Merged event.
    let all = service
        .get_all("t", Default::default(), &cancel())
        .await
        .items;
    let survivor = all
        .iter()
        .find(|u| u.content.starts_with("cluster"))
        .expect("one cluster record survives");
    assert!((survivor.importance - 0.9).abs() < 1e-6);

    let merged_events = service.lineage().events_for(
        survivor.id,
        &LineageQuery {
            event_types: Some(vec![LineageEventType::Merged]),
            ..Default::default()
        },
    );
    assert_eq!(merged_events.len(), 1);
    assert_eq!(merged_events[0].related_ids.len(), 2);
}

#[tokio::test]
async fn merge_duplicates_without_duplicates_is_a_noop() {
    let service = service_with_axis(0.85);
    seed_raw(&service, "anchor lone", axis(1.0, 0.0, 1), 0.5).await;
    seed_raw(&service, "far away", axis(0.0, 1.0, 6), 0.5).await;

    let report = service
        .merge_duplicates("t", MergeStrategy::KeepOldest, &cancel())
        .await
        .unwrap();
    assert_eq!(report.groups_merged, 0);
    assert_eq!(service.memory_store().count("t").await.unwrap(), 2);
}

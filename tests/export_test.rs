mod helpers;

use std::collections::BTreeSet;

use mnemograph::memory::export::{ExportDocument, EXPORT_FORMAT_VERSION};
use mnemograph::memory::types::EdgeOrigin;
use mnemograph::service::MemoryService;

const NOTES: &[&str] = &[
    "Alice Chen owns the GraphQL gateway",
    "The EU cluster runs Postgres 16",
    "Bob Smith is on call for the API this week",
    "Nothing notable happened today",
];

async fn seeded() -> MemoryService {
    let svc = helpers::hash_service();
    for note in NOTES {
        svc.remember((*note).into(), None, None).await.unwrap();
    }
    svc
}

fn entity_sets(document: &ExportDocument) -> BTreeSet<(String, Vec<String>)> {
    document
        .memories
        .iter()
        .map(|m| (m.text.clone(), m.entities.clone()))
        .collect()
}

#[tokio::test]
async fn reingesting_an_export_reproduces_entity_sets() {
    let source = seeded().await;
    let exported = source.export().await.unwrap();
    assert_eq!(exported.format_version, EXPORT_FORMAT_VERSION);
    assert_eq!(exported.memories.len(), NOTES.len());

    let target = helpers::hash_service();
    for memory in &exported.memories {
        target.remember(memory.text.clone(), None, None).await.unwrap();
    }
    let reexported = target.export().await.unwrap();

    assert_eq!(entity_sets(&exported), entity_sets(&reexported));
    let old_ids: BTreeSet<_> = exported.memories.iter().map(|m| m.id.clone()).collect();
    assert!(reexported.memories.iter().all(|m| !old_ids.contains(&m.id)));
}

#[tokio::test]
async fn export_skips_forgotten_memories_and_their_edges() {
    let svc = helpers::keyword_service();
    let a = svc.remember("GraphQL rollout plan".into(), None, None).await.unwrap();
    let b = svc.remember("GraphQL rollout delayed".into(), None, None).await.unwrap();
    assert_eq!(b.links.len(), 1);

    svc.forget(a.memory.id.clone()).await.unwrap();
    let document = svc.export().await.unwrap();

    assert_eq!(document.memories.len(), 1);
    assert_eq!(document.memories[0].id, b.memory.id);
    assert!(document.edges.is_empty());
}

#[tokio::test]
async fn export_survives_json_and_restores_explicit_edges() {
    let svc = helpers::keyword_service();
    let a = svc.remember("Checkout latency regression".into(), Some(0.8), None).await.unwrap();
    let b = svc.remember("Feature flag left on in prod".into(), Some(0.6), None).await.unwrap();
    svc.relate(a.memory.id.clone(), b.memory.id.clone(), "caused_by".into(), Some(0.7))
        .await
        .unwrap();

    let json = serde_json::to_string(&svc.export().await.unwrap()).unwrap();
    assert!(!json.contains("\"embedding\""));
    let document: ExportDocument = serde_json::from_str(&json).unwrap();

    let fresh = helpers::hash_service();
    let report = fresh.restore(document).await.unwrap();
    assert_eq!(report.memories_restored, 2);
    assert_eq!(report.edges_restored, 1);
    assert_eq!(report.edges_skipped, 0);

    let restored = fresh.export().await.unwrap();
    let explicit: Vec<_> = restored
        .edges
        .iter()
        .filter(|e| e.origin == EdgeOrigin::Explicit)
        .collect();
    assert_eq!(explicit.len(), 1);
    assert_eq!(explicit[0].relation.as_str(), "caused_by");
    assert!((explicit[0].weight - 0.7).abs() < 1e-9);

    let importances: BTreeSet<String> = restored
        .memories
        .iter()
        .map(|m| format!("{:.1}", m.importance))
        .collect();
    assert_eq!(importances, BTreeSet::from(["0.6".to_string(), "0.8".to_string()]));
}

#[tokio::test]
async fn timeline_lists_entity_history_oldest_first() {
    let svc = seeded().await;
    svc.remember("GraphQL gateway upgraded to v2".into(), None, None).await.unwrap();

    let response = svc.timeline(Some("graphql".into()), None, None).await.unwrap();
    let texts: Vec<&str> = response.entries.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["Alice Chen owns the GraphQL gateway", "GraphQL gateway upgraded to v2"]
    );
    assert!(!response.truncated);

    let limited = svc.timeline(None, None, Some(2)).await.unwrap();
    assert_eq!(limited.entries.len(), 2);
    assert!(limited.truncated);
}

#[tokio::test]
async fn stats_reflect_the_store() {
    let svc = seeded().await;
    let first = svc.recall("GraphQL gateway".into(), Some(1)).await.unwrap();
    svc.forget(first.results[0].memory.id.clone()).await.unwrap();

    let stats = svc.stats().await.unwrap();
    assert_eq!(stats.total_memories, NOTES.len() as u64);
    assert_eq!(stats.active_memories, NOTES.len() as u64 - 1);
    assert_eq!(stats.decayed_memories, 1);
    // Tier, embedding and entity figures cover live memories only
    assert_eq!(stats.embedded_memories, NOTES.len() as u64 - 1);
    assert_eq!(stats.by_tier.get("episodic").copied(), Some(NOTES.len() as u64 - 1));
    assert!(stats.distinct_entities >= 3);
}

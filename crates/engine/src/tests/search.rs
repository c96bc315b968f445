use super::fakes::{FakeProvider, Step};
use super::{fake_engine, fake_engine_with, sample_text, test_config, test_engine};
use crate::index::IndexEntry;
use crate::types::{ChunkRecord, DocumentStatus, NewDocument};
use docrag_core::AppError;
use std::sync::Arc;

#[tokio::test]
async fn test_blank_query_makes_no_provider_call() {
    let provider = Arc::new(FakeProvider::new(32));
    let (engine, _) = fake_engine(provider.clone());
    engine.ingest(NewDocument::new("a.txt", "alpha")).await.unwrap();
    let calls = provider.calls();

    assert!(engine.search("", 5).await.unwrap().is_empty());
    assert!(engine.search(" \n\t", 5).await.unwrap().is_empty());
    assert!(engine.search("alpha", 0).await.unwrap().is_empty());
    assert_eq!(provider.calls(), calls);
}

#[tokio::test]
async fn test_results_bounded_and_descending() {
    let engine = test_engine(256);
    let documents = [
        ("rust.txt", "Rust ownership and borrowing keep memory safe without a garbage collector."),
        ("tokio.txt", "Tokio is an asynchronous runtime for the Rust programming language."),
        ("pasta.txt", "Boil the pasta in salted water and serve with tomato sauce."),
        ("garden.txt", "Water the tomato plants in the garden every morning."),
    ];
    for (filename, text) in documents {
        engine.ingest(NewDocument::new(filename, text)).await.unwrap();
    }

    let hits = engine.search("rust borrowing and ownership", 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hits[0].filename, "rust.txt");

    let all = engine.search("rust borrowing and ownership", 50).await.unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_equal_scores_keep_insertion_order() {
    let provider = Arc::new(FakeProvider::new(32));
    let (engine, _) = fake_engine(provider);

    let first = engine
        .ingest(NewDocument::new("first.txt", "identical passage"))
        .await
        .unwrap();
    let second = engine
        .ingest(NewDocument::new("second.txt", "identical passage"))
        .await
        .unwrap();

    let hits = engine.search("identical passage", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].score, hits[1].score);
    assert_eq!(hits[0].document_id, first.document_id);
    assert_eq!(hits[1].document_id, second.document_id);

    let top = engine.search("identical passage", 1).await.unwrap();
    assert_eq!(top[0].document_id, first.document_id);
}

#[tokio::test]
async fn test_only_ready_documents_are_searched() {
    let provider = Arc::new(FakeProvider::new(32));
    let (engine, _) = fake_engine(provider.clone());

    let ready = engine
        .ingest(NewDocument::new("ready.txt", "shared words here"))
        .await
        .unwrap();
    provider.push(Step::Rejected);
    assert!(engine
        .ingest(NewDocument::new("failed.txt", "shared words here"))
        .await
        .is_err());

    let hits = engine.search("shared words here", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, ready.document_id);
}

#[tokio::test]
async fn test_query_failure_is_an_error_not_empty() {
    let provider = Arc::new(FakeProvider::new(32));
    let (engine, _) = fake_engine(provider.clone());
    engine.ingest(NewDocument::new("a.txt", "alpha")).await.unwrap();

    provider.push(Step::Unauthenticated);
    let result = engine.search("alpha", 5).await;
    assert!(matches!(result, Err(AppError::ProviderUnauthenticated(_))));
}

#[tokio::test]
async fn test_min_score_filters_hits() {
    let provider = Arc::new(
        FakeProvider::new(2)
            .with_vector("north", vec![0.0, 1.0])
            .with_vector("north east", vec![1.0, 1.0])
            .with_vector("east", vec![1.0, 0.0]),
    );
    let mut config = test_config(2);
    config.search.min_score = Some(0.5);
    let (engine, _) = fake_engine_with(provider, config);

    engine.ingest(NewDocument::new("n.txt", "north")).await.unwrap();
    engine.ingest(NewDocument::new("ne.txt", "north east")).await.unwrap();

    let hits = engine.search("east", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "ne.txt");
}

#[tokio::test]
async fn test_verify_removes_orphaned_entries() {
    let provider = Arc::new(FakeProvider::new(32));
    let (engine, _) = fake_engine(provider);
    let kept = engine
        .ingest(NewDocument::new("kept.txt", "kept text"))
        .await
        .unwrap();

    engine
        .index_for_tests()
        .insert(vec![IndexEntry::from_chunk(&ChunkRecord {
            chunk_id: "ghost-0".to_string(),
            document_id: "ghost".to_string(),
            ordinal: 0,
            text: "ghost text".to_string(),
            start: 0,
            end: 10,
            embedding: FakeProvider::vector_for("ghost text", 32),
        })])
        .unwrap();

    assert!(engine.search("ghost text", 5).await.unwrap().iter().all(|h| h.document_id != "ghost"));

    let report = engine.verify().await.unwrap();
    assert_eq!(report.orphaned_documents, vec!["ghost".to_string()]);
    assert_eq!(report.removed_entries, 1);
    assert!(report.mismatched_documents.is_empty());
    assert_eq!(engine.stats().indexed_chunks, 1);

    let report = engine.verify().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(engine.search("kept text", 1).await.unwrap()[0].document_id, kept.document_id);
}

#[tokio::test]
async fn test_verify_reindexes_lost_entries() {
    let provider = Arc::new(FakeProvider::new(32));
    let (engine, _) = fake_engine(provider);
    let text = sample_text(250);
    let outcome = engine
        .ingest(NewDocument::new("long.txt", text.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.chunk_count, 3);

    engine.index_for_tests().delete_by_document(&outcome.document_id);
    assert!(engine.search(&text[..100], 10).await.unwrap().is_empty());

    let report = engine.verify().await.unwrap();
    assert_eq!(report.reindexed_documents, vec![outcome.document_id.clone()]);
    assert!(report.mismatched_documents.is_empty());
    assert!(report.orphaned_documents.is_empty());
    assert_eq!(engine.stats().indexed_chunks, 3);

    let hits = engine.search(&text[..100], 10).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].document_id, outcome.document_id);
    assert_eq!(hits[0].ordinal, 0);
    assert_eq!(
        engine.get_document(&outcome.document_id).unwrap().status,
        DocumentStatus::Ready
    );

    assert!(engine.verify().await.unwrap().is_clean());
}

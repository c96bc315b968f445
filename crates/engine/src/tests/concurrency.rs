use super::fakes::{FakeProvider, Step};
use super::{fake_engine, sample_text};
use crate::types::{DocumentStatus, NewDocument};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_searches_stay_consistent_during_writes() {
    let provider = Arc::new(FakeProvider::new(32));
    let (engine, _) = fake_engine(provider);
    let engine = Arc::new(engine);

    let anchor = engine
        .ingest(NewDocument::new("anchor.txt", "anchor passage"))
        .await
        .unwrap();

    let mut readers = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let anchor_id = anchor.document_id.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let hits = engine.search("anchor passage", 3).await.unwrap();
                assert!(hits.len() <= 3);
                assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
                assert_eq!(hits[0].document_id, anchor_id);
                tokio::task::yield_now().await;
            }
        }));
    }

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                let doc = engine
                    .ingest(NewDocument::new(format!("doc-{}.txt", i), format!("churn {}", i)))
                    .await
                    .unwrap();
                assert!(engine.delete(&doc.document_id).await.unwrap().removed);

                let hits = engine.search(&format!("churn {}", i), 50).await.unwrap();
                assert!(hits.iter().all(|h| h.document_id != doc.document_id));
            }
        })
    };

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(engine.list_documents().len(), 1);
    assert_eq!(engine.stats().indexed_chunks, 1);
    assert!(engine.verify().await.unwrap().is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multi_chunk_documents_appear_whole() {
    let provider = Arc::new(FakeProvider::new(32));
    let (engine, _) = fake_engine(provider);
    let engine = Arc::new(engine);
    let query = sample_text(100);

    let mut readers = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let query = query.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..100 {
                let hits = engine.search(&query, 1000).await.unwrap();
                let mut per_document: HashMap<String, usize> = HashMap::new();
                for hit in hits {
                    *per_document.entry(hit.document_id).or_default() += 1;
                }
                assert!(per_document.values().all(|&count| count == 3));
                tokio::task::yield_now().await;
            }
        }));
    }

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..12 {
                let text = format!("{}{}", i, sample_text(250));
                let doc = engine
                    .ingest(NewDocument::new(format!("long-{}.txt", i), text))
                    .await
                    .unwrap();
                assert_eq!(doc.chunk_count, 3);
                if i % 2 == 0 {
                    engine.delete(&doc.document_id).await.unwrap();
                }
            }
        })
    };

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(engine.list_documents().len(), 6);
    assert_eq!(engine.stats().indexed_chunks, 18);
}

#[tokio::test]
async fn test_delete_waits_for_in_flight_ingest() {
    let gate = Arc::new(Notify::new());
    let provider = Arc::new(FakeProvider::new(32).script(vec![Step::Wait(gate.clone())]));
    let (engine, _) = fake_engine(provider.clone());
    let engine = Arc::new(engine);

    let ingest = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ingest(NewDocument::new("a.txt", "gated")).await })
    };
    provider.wait_for_call().await;

    let pending = engine.list_documents().remove(0);
    assert_eq!(pending.status, DocumentStatus::Pending);

    let delete = {
        let engine = engine.clone();
        let id = pending.document_id.clone();
        tokio::spawn(async move { engine.delete(&id).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!delete.is_finished());

    gate.notify_one();
    let outcome = ingest.await.unwrap().unwrap();
    assert_eq!(outcome.document_id, pending.document_id);

    assert!(delete.await.unwrap().unwrap().removed);
    assert!(engine.list_documents().is_empty());
    assert_eq!(engine.stats().indexed_chunks, 0);
}

#[tokio::test]
async fn test_unrelated_ingests_do_not_block_each_other() {
    let gate = Arc::new(Notify::new());
    let provider = Arc::new(FakeProvider::new(32).script(vec![Step::Wait(gate.clone())]));
    let (engine, _) = fake_engine(provider.clone());
    let engine = Arc::new(engine);

    let slow = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ingest(NewDocument::new("slow.txt", "slow")).await })
    };
    provider.wait_for_call().await;

    let fast = tokio::time::timeout(
        Duration::from_secs(1),
        engine.ingest(NewDocument::new("fast.txt", "fast")),
    )
    .await
    .expect("fast ingest should not wait for the slow one")
    .unwrap();
    assert_eq!(fast.chunk_count, 1);

    let hits = engine.search("fast", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "fast.txt");

    gate.notify_one();
    slow.await.unwrap().unwrap();
    assert_eq!(engine.stats().ready, 2);
}

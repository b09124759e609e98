mod common;

use parley::config::MemoryConfig;
use parley::memory::VectorMemoryStore;
use parley::models::Role;
use parley::nlp::{Embedder, HashingEmbedder};
use parley::{NlpBackend, NlpService};
use std::sync::Arc;

fn store() -> VectorMemoryStore {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256));
    VectorMemoryStore::in_memory(embedder)
}

#[test]
fn test_degenerate_text_is_never_stored() {
    let store = store();

    assert_eq!(store.store("s1", "?!", Role::User, None).unwrap(), None);
    assert_eq!(store.store("s1", "", Role::Bot, None).unwrap(), None);
    assert_eq!(store.store("s1", "...", Role::User, None).unwrap(), None);

    assert!(store.is_empty());
    assert!(store.session_history("s1", 10).is_empty());
}

#[test]
fn test_stored_turn_is_its_own_best_match() {
    let store = store();
    store.store("s1", "The printer on floor two is jammed", Role::User, None).unwrap();
    store.store("s1", "Facilities will send a technician", Role::Bot, None).unwrap();

    let hits = store
        .relevant("The printer on floor two is jammed", Some("s1"), 1)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message, "The printer on floor two is jammed");
    assert!((hits[0].similarity.unwrap() - 1.0).abs() < 1e-5);
}

#[test]
fn test_session_history_is_chronological_and_limited() {
    let store = store();
    for i in 0..6 {
        store.store("s1", &format!("turn number {}", i), Role::User, None).unwrap();
    }
    store.store("other", "unrelated turn", Role::User, None).unwrap();

    let history = store.session_history("s1", 3);
    let messages: Vec<&str> = history.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(messages, vec!["turn number 3", "turn number 4", "turn number 5"]);
    assert!(history.iter().all(|m| m.similarity.is_none()));
}

#[test]
fn test_concurrent_writers_keep_per_session_order() {
    let store = Arc::new(store());
    let writers = 4;
    let per_writer = 25;

    std::thread::scope(|scope| {
        for w in 0..writers {
            let store = store.clone();
            scope.spawn(move || {
                for i in 0..per_writer {
                    store
                        .store("shared", &format!("writer {} message {}", w, i), Role::User, None)
                        .unwrap();
                }
            });
        }
    });

    let history = store.session_history("shared", usize::MAX);
    assert_eq!(history.len(), writers * per_writer);
    assert!(history.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));

    for w in 0..writers {
        let prefix = format!("writer {} message ", w);
        let sequence: Vec<usize> = history
            .iter()
            .filter_map(|m| m.message.strip_prefix(&prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(sequence, (0..per_writer).collect::<Vec<_>>());
    }
}

#[test]
fn test_service_memory_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.memory = MemoryConfig {
        persist: true,
        path: Some(dir.path().join("state").join("memory.json")),
    };

    let service = NlpService::with_backend(&config, NlpBackend::hashing(256)).unwrap();
    let id = service
        .store_message("s1", "Expense reports are due Friday", Role::Bot, None)
        .unwrap();
    assert!(id.is_some());
    drop(service);

    let restarted = NlpService::with_backend(&config, NlpBackend::hashing(256)).unwrap();
    assert_eq!(restarted.health().memory_records, 1);
    let history = restarted.session_history("s1", 10);
    assert_eq!(history[0].message, "Expense reports are due Friday");
    assert_eq!(history[0].role, Role::Bot);
}

#[test]
fn test_corrupt_snapshot_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    let path = common::write_file(dir.path(), "memory.json", "{ not json");
    config.memory = MemoryConfig {
        persist: true,
        path: Some(path),
    };

    assert!(NlpService::with_backend(&config, NlpBackend::hashing(256)).is_err());
}

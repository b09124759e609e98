use crate::models::{HistoryMessage, Role, Utterance};
use crate::nlp::{self, Embedder};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Deserialize)]
struct Snapshot {
    records: Vec<Utterance>,
}

/// Conversation turns with their embeddings, grouped by session.
///
/// Writes for one session are serialized end to end (embedding included), so
/// the stored order of a session always equals the order its writes arrived.
/// When a snapshot path is set the full record list is rewritten after every
/// accepted write and read back on open.
pub struct VectorMemoryStore {
    embedder: Arc<dyn Embedder>,
    records: RwLock<Vec<Utterance>>,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
    snapshot: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl VectorMemoryStore {
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(Vec::new()),
            session_locks: DashMap::new(),
            snapshot: None,
            persist_lock: Mutex::new(()),
        }
    }

    pub fn open(embedder: Arc<dyn Embedder>, snapshot: Option<PathBuf>) -> Result<Self> {
        let mut store = Self::in_memory(embedder);
        let Some(path) = snapshot else {
            return Ok(store);
        };

        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read memory snapshot {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse memory snapshot {}", path.display()))?;
            let total = snapshot.records.len();
            let records: Vec<Utterance> = snapshot
                .records
                .into_iter()
                .filter(|r| !nlp::is_degenerate(&r.embedding))
                .collect();
            if records.len() < total {
                warn!("Dropped {} degenerate records from memory snapshot", total - records.len());
            }
            info!("🧠 Restored {} conversation turns from {}", records.len(), path.display());
            *store.records.get_mut() = records;
        } else if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        store.snapshot = Some(path);
        Ok(store)
    }

    /// Embeds and stores one turn. Returns `None` without storing anything
    /// when the embedding is empty or has zero norm.
    pub fn store(
        &self,
        session_id: &str,
        text: &str,
        role: Role,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        let lock = self
            .session_locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock();
            self.append(session_id, text, role, timestamp)
        };

        // Idle sessions hold no lock entry.
        drop(lock);
        self.session_locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn append(
        &self,
        session_id: &str,
        text: &str,
        role: Role,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        let embedding = self.embedder.embed(text)?;
        if nlp::is_degenerate(&embedding) {
            warn!("Skipping {} message in session {}: degenerate embedding", role, session_id);
            return Ok(None);
        }

        let utterance = Utterance {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            session_id: session_id.to_string(),
            role,
            timestamp: timestamp.unwrap_or_else(Utc::now),
            embedding,
        };
        let id = utterance.id.clone();
        self.records.write().push(utterance);
        debug!("Stored {} message {} in session {}", role, id, session_id);

        if let Err(e) = self.save() {
            warn!("⚠️  Failed to write memory snapshot: {:#}", e);
        }
        Ok(Some(id))
    }

    /// Turns ranked by similarity to `query`, optionally limited to one
    /// session. Equal scores keep storage order.
    pub fn relevant(&self, query: &str, session_id: Option<&str>, top_k: usize) -> Result<Vec<HistoryMessage>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query)?;

        let records = self.records.read();
        let mut scored: Vec<(f32, &Utterance)> = records
            .iter()
            .filter(|r| session_id.map_or(true, |s| r.session_id == s))
            .map(|r| (nlp::similarity(&query_embedding, &r.embedding), r))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, r)| HistoryMessage {
                similarity: Some(score),
                ..HistoryMessage::from(r)
            })
            .collect())
    }

    /// The `limit` most recent turns of a session, oldest first.
    pub fn session_history(&self, session_id: &str, limit: usize) -> Vec<HistoryMessage> {
        let records = self.records.read();
        let mut turns: Vec<&Utterance> = records
            .iter()
            .filter(|r| r.session_id == session_id)
            .collect();
        turns.sort_by_key(|r| r.timestamp);

        let skip = turns.len().saturating_sub(limit);
        turns.into_iter().skip(skip).map(HistoryMessage::from).collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock();
        let content = {
            let records = self.records.read();
            serde_json::to_string(&SnapshotRef { records: &records })?
        };

        // Sibling file plus rename: the snapshot on disk is always complete.
        let temp_path = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    records: &'a [Utterance],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::HashingEmbedder;
    use chrono::TimeZone;

    fn store() -> VectorMemoryStore {
        VectorMemoryStore::in_memory(Arc::new(HashingEmbedder::new(128)))
    }

    #[test]
    fn degenerate_text_is_not_stored() {
        let store = store();
        assert_eq!(store.store("s1", "?!", Role::User, None).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn history_keeps_most_recent_in_ascending_order() {
        let store = store();
        for minute in 0..5 {
            let ts = Utc.with_ymd_and_hms(2024, 1, 1, 9, minute, 0).unwrap();
            store
                .store("s1", &format!("message number {}", minute), Role::User, Some(ts))
                .unwrap();
        }
        store.store("s2", "other session", Role::User, None).unwrap();

        let history = store.session_history("s1", 3);
        let texts: Vec<&str> = history.iter().map(|h| h.message.as_str()).collect();
        assert_eq!(texts, vec!["message number 2", "message number 3", "message number 4"]);
        assert!(history.iter().all(|h| h.similarity.is_none()));
    }

    #[test]
    fn relevant_ranks_within_session() {
        let store = store();
        store.store("s1", "the leave policy grants twenty days", Role::Bot, None).unwrap();
        store.store("s1", "printer on floor two is jammed", Role::User, None).unwrap();
        store.store("s2", "leave policy for contractors", Role::User, None).unwrap();

        let hits = store.relevant("leave policy", Some("s1"), 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].message, "the leave policy grants twenty days");
        assert_eq!(hits[0].role, Role::Bot);
        assert!(hits[0].similarity.unwrap() >= hits[1].similarity.unwrap());

        assert_eq!(store.relevant("leave policy", None, 1).unwrap().len(), 1);
        assert!(store.relevant("leave policy", Some("s1"), 0).unwrap().is_empty());
    }

    #[test]
    fn session_locks_are_released_after_writes() {
        let store = store();
        store.store("s1", "first turn", Role::User, None).unwrap();
        store.store("s2", "?!", Role::User, None).unwrap();
        assert!(store.session_locks.is_empty());
    }

    #[test]
    fn leftover_temp_snapshot_is_ignored_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));

        let first = VectorMemoryStore::open(embedder.clone(), Some(path.clone())).unwrap();
        first.store("s1", "expense reports are due friday", Role::Bot, None).unwrap();
        drop(first);
        assert!(!path.with_extension("json.tmp").exists());

        // A write that died half way leaves only the temp file damaged.
        fs::write(path.with_extension("json.tmp"), "{\"records\": [{\"id\"").unwrap();

        let reopened = VectorMemoryStore::open(embedder, Some(path)).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.session_history("s1", 1)[0].message, "expense reports are due friday");
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.json");
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));

        let first = VectorMemoryStore::open(embedder.clone(), Some(path.clone())).unwrap();
        let id = first.store("s1", "hello there", Role::User, None).unwrap();
        assert!(id.is_some());
        drop(first);

        let reopened = VectorMemoryStore::open(embedder, Some(path)).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.session_history("s1", 10)[0].message, "hello there");
    }
}

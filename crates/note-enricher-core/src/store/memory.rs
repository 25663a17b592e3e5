//! In-memory [`NoteStore`] implementation.
//!
//! Uses a `HashMap` keyed by note id plus an owner → ids index, all behind a
//! single `std::sync::RwLock`. Every operation takes the lock once, so an
//! update's read-modify-write cannot interleave with another write.
//! Contents are lost when the process exits.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;
use crate::models::{Note, NoteId};

use super::{NoteMutation, NoteStore, StoreStats};

struct StoredNote {
    note: Note,
    /// Insertion order, breaks `created_at` ties when listing.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    notes: HashMap<NoteId, StoredNote>,
    by_owner: HashMap<String, Vec<NoteId>>,
    next_seq: u64,
}

/// Process-lifetime note store.
#[derive(Default)]
pub struct InMemoryNoteStore {
    inner: RwLock<Inner>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the maps half-written:
    // every mutation below is a single insert/remove, so a poisoned guard is
    // still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Next `updated_at`: now, or one microsecond past `previous` if the clock
/// has not moved past it.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    fn kind(&self) -> &'static str {
        "in_memory"
    }

    async fn insert(&self, note: Note) -> Result<Note, StoreError> {
        let mut inner = self.write();
        if inner.notes.contains_key(&note.id) {
            return Err(StoreError::Duplicate(note.id));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .by_owner
            .entry(note.owner_id.clone())
            .or_default()
            .push(note.id);
        inner.notes.insert(
            note.id,
            StoredNote {
                note: note.clone(),
                seq,
            },
        );
        Ok(note)
    }

    async fn get(&self, id: &NoteId) -> Result<Note, StoreError> {
        self.read()
            .notes
            .get(id)
            .map(|stored| stored.note.clone())
            .ok_or(StoreError::NotFound(*id))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Vec<Note> {
        let inner = self.read();
        let Some(ids) = inner.by_owner.get(owner_id) else {
            return Vec::new();
        };
        let mut stored: Vec<&StoredNote> =
            ids.iter().filter_map(|id| inner.notes.get(id)).collect();
        stored.sort_by(|a, b| {
            b.note
                .created_at
                .cmp(&a.note.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        stored.into_iter().map(|s| s.note.clone()).collect()
    }

    async fn update(&self, id: &NoteId, mutation: NoteMutation) -> Result<Note, StoreError> {
        let mut inner = self.write();
        let stored = inner.notes.get_mut(id).ok_or(StoreError::NotFound(*id))?;

        let mut next = stored.note.clone();
        mutation(&mut next);
        next.id = stored.note.id;
        next.owner_id = stored.note.owner_id.clone();
        next.created_at = stored.note.created_at;
        next.updated_at = next_timestamp(stored.note.updated_at);

        stored.note = next.clone();
        Ok(next)
    }

    async fn delete(&self, id: &NoteId) -> bool {
        let mut inner = self.write();
        let Some(removed) = inner.notes.remove(id) else {
            return false;
        };
        let owner = removed.note.owner_id;
        if let Some(ids) = inner.by_owner.get_mut(&owner) {
            ids.retain(|other| other != id);
            if ids.is_empty() {
                inner.by_owner.remove(&owner);
            }
        }
        true
    }

    async fn stats(&self) -> StoreStats {
        let inner = self.read();
        StoreStats {
            total_notes: inner.notes.len(),
            unique_owners: inner.by_owner.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn note(content: &str, owner: &str) -> Note {
        Note::new(content, owner, Utc::now())
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = InMemoryNoteStore::new();
        let stored = store.insert(note("alpha", "u1")).await.unwrap();
        let fetched = store.get(&stored.id).await.unwrap();
        assert_eq!(stored, fetched);
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_rejected() {
        let store = InMemoryNoteStore::new();
        let n = note("alpha", "u1");
        store.insert(n.clone()).await.unwrap();
        let err = store.insert(n.clone()).await.unwrap_err();
        assert_eq!(err, StoreError::Duplicate(n.id));
        assert_eq!(store.stats().await.total_notes, 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryNoteStore::new();
        let id = NoteId::new();
        assert_eq!(store.get(&id).await.unwrap_err(), StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn test_list_by_owner_newest_first() {
        let store = InMemoryNoteStore::new();
        let base = Utc::now();
        let mut first = note("first", "u1");
        first.created_at = base;
        first.updated_at = base;
        let mut second = note("second", "u1");
        second.created_at = base + Duration::seconds(1);
        second.updated_at = second.created_at;
        store.insert(second.clone()).await.unwrap();
        store.insert(first.clone()).await.unwrap();
        store.insert(note("other", "u2")).await.unwrap();

        let listed = store.list_by_owner("u1").await;
        let contents: Vec<&str> = listed.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first"]);
        assert!(store.list_by_owner("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn test_list_ties_broken_by_insertion_order() {
        let store = InMemoryNoteStore::new();
        let now = Utc::now();
        for content in ["a", "b", "c"] {
            store.insert(Note::new(content, "u1", now)).await.unwrap();
        }
        let contents: Vec<String> = store
            .list_by_owner("u1")
            .await
            .into_iter()
            .map(|n| n.content)
            .collect();
        assert_eq!(contents, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_update_stamps_and_protects_identity() {
        let store = InMemoryNoteStore::new();
        let original = store.insert(note("alpha", "u1")).await.unwrap();

        let updated = store
            .update(
                &original.id,
                Box::new(|n: &mut Note| {
                    n.content = "beta".to_string();
                    n.owner_id = "intruder".to_string();
                    n.id = NoteId::new();
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.content, "beta");
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.owner_id, "u1");
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at > original.updated_at);
        assert_eq!(store.get(&original.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = InMemoryNoteStore::new();
        let id = NoteId::new();
        let err = store.update(&id, Box::new(|_| {})).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn test_update_timestamp_strictly_increases_even_in_future() {
        let store = InMemoryNoteStore::new();
        let mut n = note("alpha", "u1");
        // A clock that has not caught up with the stored timestamp.
        n.updated_at = Utc::now() + Duration::hours(1);
        let stored = store.insert(n).await.unwrap();
        let updated = store.update(&stored.id, Box::new(|_| {})).await.unwrap();
        assert!(updated.updated_at > stored.updated_at);
    }

    #[tokio::test]
    async fn test_delete_cleans_owner_index() {
        let store = InMemoryNoteStore::new();
        let n = store.insert(note("alpha", "u1")).await.unwrap();
        assert!(store.delete(&n.id).await);
        assert!(!store.delete(&n.id).await);
        assert!(store.list_by_owner("u1").await.is_empty());
        assert_eq!(store.stats().await, StoreStats::default());
    }

    #[tokio::test]
    async fn test_stats_counts_owners() {
        let store = InMemoryNoteStore::new();
        store.insert(note("a", "u1")).await.unwrap();
        store.insert(note("b", "u1")).await.unwrap();
        store.insert(note("c", "u2")).await.unwrap();
        assert_eq!(
            store.stats().await,
            StoreStats {
                total_notes: 3,
                unique_owners: 2
            }
        );
        assert_eq!(store.kind(), "in_memory");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(InMemoryNoteStore::new());
        let n = store.insert(note("", "u1")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let id = n.id;
            handles.push(tokio::spawn(async move {
                store
                    .update(&id, Box::new(|n: &mut Note| n.content.push('x')))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.get(&n.id).await.unwrap().content.len(), 32);
    }
}

//! Storage abstraction for notes.
//!
//! The [`NoteStore`] trait is the only place notes live. It knows nothing
//! about ownership rules beyond keeping an owner → ids index for listing;
//! access control is layered on top by [`NotesService`](crate::service::NotesService).
//!
//! Implementations must be `Send + Sync` to be shared across request
//! handlers.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;
use crate::models::{Note, NoteId};

/// In-place edit applied by [`NoteStore::update`].
///
/// Changes to `id`, `owner_id` and `created_at` are discarded by the store.
pub type NoteMutation = Box<dyn FnOnce(&mut Note) + Send>;

/// Counters reported by [`NoteStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_notes: usize,
    pub unique_owners: usize,
}

/// Abstract note storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](NoteStore::insert) | Store a new note (id must be unused) |
/// | [`get`](NoteStore::get) | Exact id lookup, no ownership check |
/// | [`list_by_owner`](NoteStore::list_by_owner) | Owner's notes, newest first |
/// | [`update`](NoteStore::update) | Atomic read-modify-write, stamps `updated_at` |
/// | [`delete`](NoteStore::delete) | Remove by id |
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Short storage label, e.g. `"in_memory"`.
    fn kind(&self) -> &'static str;

    /// Store a new note and return it unchanged.
    async fn insert(&self, note: Note) -> Result<Note, StoreError>;

    async fn get(&self, id: &NoteId) -> Result<Note, StoreError>;

    /// All notes of `owner_id`, most recently created first.
    async fn list_by_owner(&self, owner_id: &str) -> Vec<Note>;

    /// Apply `mutation` to the stored note and stamp a new `updated_at`
    /// strictly later than the previous one. The whole read-modify-write is
    /// atomic with respect to other store calls.
    async fn update(&self, id: &NoteId, mutation: NoteMutation) -> Result<Note, StoreError>;

    /// Remove the note; returns whether anything was removed.
    async fn delete(&self, id: &NoteId) -> bool;

    async fn stats(&self) -> StoreStats;
}

//! Notes service: the single entry point for the boundary layer.
//!
//! Owns no state of its own. It validates input, enforces that every
//! operation on an existing note comes from the note's owner, and drives
//! the [`EnrichmentBackend`] for enrichment.
//!
//! # Enrichment and locking
//!
//! `enrich_note` reads the note, calls the backend, then writes the new
//! metadata, each store call taking its own short lock. The backend call,
//! which may take seconds, never runs while the store is locked. If the
//! backend fails, nothing is written.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::enrichment::EnrichmentBackend;
use crate::error::NoteError;
use crate::models::{Note, NoteId, NoteMetadata, NoteUpdate};
use crate::store::NoteStore;

/// Summary returned by [`NotesService::get_stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub total_notes: usize,
    pub unique_users: usize,
    pub storage_type: String,
}

/// Owner-scoped note operations over a [`NoteStore`] and an
/// [`EnrichmentBackend`].
///
/// Cheap to clone; clones share the same store and backend.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use note_enricher_core::{InMemoryNoteStore, NotesService, StubBackend};
///
/// # tokio_test_block(async {
/// let service = NotesService::new(Arc::new(InMemoryNoteStore::new()), Arc::new(StubBackend));
/// let note = service.create_note("Buy milk", "u1").await.unwrap();
/// let enriched = service.enrich_note(&note.id, "u1").await.unwrap();
/// assert_eq!(enriched.metadata.model_identifier.as_deref(), Some("stub"));
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct NotesService {
    store: Arc<dyn NoteStore>,
    backend: Arc<dyn EnrichmentBackend>,
}

impl NotesService {
    pub fn new(store: Arc<dyn NoteStore>, backend: Arc<dyn EnrichmentBackend>) -> Self {
        Self { store, backend }
    }

    /// Create and store a new note owned by `owner_id`.
    ///
    /// Content is stored as given but must contain something other than
    /// whitespace.
    pub async fn create_note(&self, content: &str, owner_id: &str) -> Result<Note, NoteError> {
        require_content(content)?;
        if owner_id.trim().is_empty() {
            return Err(NoteError::validation("user_id must not be empty"));
        }
        let note = Note::new(content, owner_id, Utc::now());
        Ok(self.store.insert(note).await?)
    }

    /// All notes of `owner_id`, newest first. Unknown owners get an empty list.
    pub async fn get_notes(&self, owner_id: &str) -> Vec<Note> {
        self.store.list_by_owner(owner_id).await
    }

    /// Fetch one note, checking ownership.
    pub async fn get_note(&self, id: &NoteId, owner_id: &str) -> Result<Note, NoteError> {
        let note = self.store.get(id).await?;
        if !note.is_owned_by(owner_id) {
            return Err(NoteError::Forbidden {
                id: *id,
                owner_id: owner_id.to_string(),
            });
        }
        Ok(note)
    }

    /// Replace content and/or metadata of an owned note.
    ///
    /// Metadata, when given, replaces the existing metadata entirely and
    /// must keep `complexity_score` within `[0.0, 1.0]`. Content edits leave
    /// metadata alone. Input is validated before ownership is checked.
    pub async fn update_note(
        &self,
        id: &NoteId,
        owner_id: &str,
        update: NoteUpdate,
    ) -> Result<Note, NoteError> {
        if update.is_empty() {
            return Err(NoteError::validation("update must change content or metadata"));
        }
        if let Some(content) = &update.content {
            require_content(content)?;
        }
        if let Some(metadata) = &update.metadata {
            require_valid_metadata(metadata)?;
        }
        self.get_note(id, owner_id).await?;

        let NoteUpdate { content, metadata } = update;
        let note = self
            .store
            .update(
                id,
                Box::new(move |note: &mut Note| {
                    if let Some(content) = content {
                        note.content = content;
                    }
                    if let Some(metadata) = metadata {
                        note.metadata = metadata;
                    }
                }),
            )
            .await?;
        Ok(note)
    }

    /// Delete an owned note. Returns `true` once the note is gone.
    pub async fn delete_note(&self, id: &NoteId, owner_id: &str) -> Result<bool, NoteError> {
        self.get_note(id, owner_id).await?;
        if self.store.delete(id).await {
            Ok(true)
        } else {
            // Removed by someone else between the check and the delete.
            Err(NoteError::NotFound(*id))
        }
    }

    /// Run the enrichment backend on an owned note and replace its metadata
    /// with the result.
    ///
    /// On backend failure the stored note is unchanged and
    /// [`NoteError::EnrichmentFailed`] is returned.
    pub async fn enrich_note(&self, id: &NoteId, owner_id: &str) -> Result<Note, NoteError> {
        let note = self.get_note(id, owner_id).await?;

        let enrichment = self
            .backend
            .enrich(&note.content)
            .await
            .map_err(NoteError::EnrichmentFailed)?;
        let metadata = enrichment.into_metadata(Utc::now());

        let note = self
            .store
            .update(id, Box::new(move |note: &mut Note| note.metadata = metadata))
            .await?;
        Ok(note)
    }

    pub async fn get_stats(&self) -> ServiceStats {
        let stats = self.store.stats().await;
        ServiceStats {
            total_notes: stats.total_notes,
            unique_users: stats.unique_owners,
            storage_type: self.store.kind().to_string(),
        }
    }
}

fn require_content(content: &str) -> Result<(), NoteError> {
    if content.trim().is_empty() {
        Err(NoteError::validation("content must not be empty"))
    } else {
        Ok(())
    }
}

fn require_valid_metadata(metadata: &NoteMetadata) -> Result<(), NoteError> {
    match metadata.complexity_score {
        Some(score) if !(0.0..=1.0).contains(&score) => Err(NoteError::validation(format!(
            "complexity_score must be in [0.0, 1.0], got {}",
            score
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::StubBackend;
    use crate::store::memory::InMemoryNoteStore;

    fn service() -> NotesService {
        NotesService::new(Arc::new(InMemoryNoteStore::new()), Arc::new(StubBackend))
    }

    #[tokio::test]
    async fn test_create_rejects_blank_owner() {
        let svc = service();
        let err = svc.create_note("hello", "  ").await.unwrap_err();
        assert!(matches!(err, NoteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_keeps_content_verbatim() {
        let svc = service();
        let note = svc.create_note("  padded  ", "u1").await.unwrap();
        assert_eq!(note.content, "  padded  ");
    }

    #[tokio::test]
    async fn test_empty_update_rejected() {
        let svc = service();
        let note = svc.create_note("hello", "u1").await.unwrap();
        let err = svc
            .update_note(&note.id, "u1", NoteUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_blank_content_update_rejected_before_ownership() {
        let svc = service();
        let note = svc.create_note("hello", "u1").await.unwrap();
        for owner in ["u1", "u2"] {
            let err = svc
                .update_note(&note.id, owner, NoteUpdate::content("\t\n"))
                .await
                .unwrap_err();
            assert!(matches!(err, NoteError::Validation(_)), "{owner}: {err}");
        }
        assert_eq!(svc.get_note(&note.id, "u1").await.unwrap().content, "hello");
    }

    #[tokio::test]
    async fn test_out_of_range_complexity_update_rejected() {
        let svc = service();
        let note = svc.create_note("hello", "u1").await.unwrap();
        for score in [7.5, -0.1, f64::NAN] {
            let metadata = NoteMetadata {
                complexity_score: Some(score),
                ..Default::default()
            };
            let err = svc
                .update_note(&note.id, "u1", NoteUpdate::metadata(metadata))
                .await
                .unwrap_err();
            assert!(matches!(err, NoteError::Validation(_)), "{score}: {err}");
        }
        assert!(svc.get_note(&note.id, "u1").await.unwrap().metadata.is_empty());

        let bounds = NoteMetadata {
            complexity_score: Some(1.0),
            ..Default::default()
        };
        let updated = svc
            .update_note(&note.id, "u1", NoteUpdate::metadata(bounds))
            .await
            .unwrap();
        assert_eq!(updated.metadata.complexity_score, Some(1.0));
    }

    #[tokio::test]
    async fn test_update_foreign_note_forbidden() {
        let svc = service();
        let note = svc.create_note("hello", "u1").await.unwrap();
        let err = svc
            .update_note(&note.id, "u2", NoteUpdate::metadata(NoteMetadata::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_delete_foreign_note_forbidden_and_kept() {
        let svc = service();
        let note = svc.create_note("hello", "u1").await.unwrap();
        let err = svc.delete_note(&note.id, "u2").await.unwrap_err();
        assert!(matches!(err, NoteError::Forbidden { .. }));
        assert!(svc.get_note(&note.id, "u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_enrich_foreign_note_forbidden() {
        let svc = service();
        let note = svc.create_note("hello", "u1").await.unwrap();
        let err = svc.enrich_note(&note.id, "u2").await.unwrap_err();
        assert!(matches!(err, NoteError::Forbidden { .. }));
        assert!(svc.get_note(&note.id, "u1").await.unwrap().metadata.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let svc = service();
        svc.create_note("a", "u1").await.unwrap();
        svc.create_note("b", "u2").await.unwrap();
        let stats = svc.get_stats().await;
        assert_eq!(
            stats,
            ServiceStats {
                total_notes: 2,
                unique_users: 2,
                storage_type: "in_memory".to_string(),
            }
        );
    }
}

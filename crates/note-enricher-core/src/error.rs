//! Error taxonomy for the notes core.
//!
//! [`NoteError`] is what the service hands back to the boundary layer. Its
//! variants classify the failure; mapping them to transport statuses is the
//! caller's job.

use thiserror::Error;

use crate::models::NoteId;

/// Failure of a notes service operation.
#[derive(Debug, Error)]
pub enum NoteError {
    /// Malformed input, e.g. blank content.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No note with this id exists.
    #[error("note not found: {0}")]
    NotFound(NoteId),

    /// The note exists but belongs to someone else.
    #[error("note {id} does not belong to user {owner_id}")]
    Forbidden { id: NoteId, owner_id: String },

    /// The enrichment backend did not produce a usable result.
    #[error("enrichment failed: {0}")]
    EnrichmentFailed(#[source] EnrichmentError),

    /// Store failure other than a missing note.
    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl NoteError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<StoreError> for NoteError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl From<EnrichmentError> for NoteError {
    fn from(value: EnrichmentError) -> Self {
        Self::EnrichmentFailed(value)
    }
}

/// Failure reported by a [`NoteStore`](crate::store::NoteStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("note not found: {0}")]
    NotFound(NoteId),

    #[error("note already exists: {0}")]
    Duplicate(NoteId),
}

/// A JSON value that does not conform to the enrichment schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct SchemaError {
    /// JSON-pointer-like location of the offending value (e.g. `/topics/2`).
    pub path: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of an [`EnrichmentBackend`](crate::enrichment::EnrichmentBackend) call.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Transport failure: connect, TLS, timeout or reading the body.
    #[error("request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The API answered with a non-success status.
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered successfully but with no generated text.
    #[error("empty response from model")]
    EmptyResponse,

    /// The generated text is not JSON.
    #[error("response is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The generated JSON does not match the enrichment schema.
    #[error("response does not match schema: {0}")]
    Schema(#[from] SchemaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_note_not_found() {
        let id = NoteId::new();
        let err: NoteError = StoreError::NotFound(id).into();
        assert!(matches!(err, NoteError::NotFound(got) if got == id));
    }

    #[test]
    fn test_store_duplicate_maps_to_storage() {
        let err: NoteError = StoreError::Duplicate(NoteId::new()).into();
        assert!(matches!(err, NoteError::Storage(StoreError::Duplicate(_))));
    }

    #[test]
    fn test_enrichment_error_keeps_source() {
        let err: NoteError = EnrichmentError::EmptyResponse.into();
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("empty response from model"));
    }

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::new("/sentiment", "must be one of [positive, neutral, negative]");
        assert_eq!(
            err.to_string(),
            "/sentiment: must be one of [positive, neutral, negative]"
        );
    }
}

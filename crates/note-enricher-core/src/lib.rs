//! # note-enricher core
//!
//! Shared logic for note-enricher: the note data model, the owner-scoped
//! store abstraction, the enrichment schema with its validating parse, the
//! enrichment backend trait with a deterministic stub, and the
//! [`service::NotesService`] that ties them together.
//!
//! This crate contains no HTTP client, no async runtime and no logging.
//! Concrete network backends and the HTTP boundary live in the
//! `note-enricher` app crate.

pub mod enrichment;
pub mod error;
pub mod models;
pub mod service;
pub mod store;

pub use enrichment::{Enrichment, EnrichmentBackend, EnrichmentFields, StubBackend};
pub use error::{EnrichmentError, NoteError, SchemaError, StoreError};
pub use models::{Note, NoteId, NoteMetadata, NoteUpdate, Sentiment};
pub use service::{NotesService, ServiceStats};
pub use store::{memory::InMemoryNoteStore, NoteStore, StoreStats};

//! # Note Enricher
//!
//! An in-memory notes service whose notes can be enriched with AI-derived
//! metadata (summary, topics, sentiment, key entities, tags, complexity).
//!
//! The domain logic lives in [`note_enricher_core`]; its main types are
//! re-exported here. This crate adds what needs a runtime or the network:
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────────┐
//! │   HTTP   │──▶│ NotesService │──▶│ InMemoryNoteStore  │
//! │  (axum)  │   │    (core)    │   └────────────────────┘
//! └──────────┘   └──────┬───────┘
//!                       ▼
//!              ┌──────────────────┐
//!              │ EnrichmentBackend│  stub | gemini
//!              └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`backend`] | Gemini backend and backend selection |
//! | [`server`] | HTTP routes and error mapping |

pub mod backend;
pub mod config;
pub mod server;

pub use note_enricher_core::{
    Enrichment, EnrichmentBackend, EnrichmentError, InMemoryNoteStore, Note, NoteError, NoteId,
    NoteMetadata, NoteUpdate, NotesService, Sentiment, ServiceStats, StubBackend,
};

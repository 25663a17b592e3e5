//! Core data models: notes and their enrichment metadata.
//!
//! These types flow unchanged from the store through the service to the
//! HTTP boundary, so they carry their own serde representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque note identifier (random UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Generate a fresh, never-before-used identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Overall tone of a note as judged by the enrichment backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// All values, in the order they appear in the enrichment schema.
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI-derived metadata attached to a note.
///
/// Every field is optional. A note whose metadata has any field set has
/// been enriched at least once. Enrichment replaces the whole object; there
/// is no per-field merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_entities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_tags: Option<Vec<String>>,
    /// In `[0.0, 1.0]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_identifier: Option<String>,
}

impl NoteMetadata {
    /// True when no field is set, i.e. the note was never enriched.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Metadata with the timestamp cleared, for comparing the content of two
    /// enrichments.
    pub fn without_timestamp(&self) -> Self {
        Self {
            enrichment_timestamp: None,
            ..self.clone()
        }
    }
}

/// A user-owned piece of text with optional enrichment metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: NoteMetadata,
}

impl Note {
    /// Build a brand-new note with a fresh id, `created_at == updated_at`
    /// and empty metadata.
    pub fn new(
        content: impl Into<String>,
        owner_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NoteId::new(),
            content: content.into(),
            owner_id: owner_id.into(),
            created_at: now,
            updated_at: now,
            metadata: NoteMetadata::default(),
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

/// Partial update applied by [`NotesService::update_note`](crate::service::NotesService::update_note).
///
/// `metadata`, when present, replaces the note's metadata wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<NoteMetadata>,
}

impl NoteUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            metadata: None,
        }
    }

    pub fn metadata(metadata: NoteMetadata) -> Self {
        Self {
            content: None,
            metadata: Some(metadata),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.metadata.is_none()
    }
}

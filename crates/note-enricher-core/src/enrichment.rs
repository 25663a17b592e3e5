//! Enrichment backend trait, output schema and validating parse.
//!
//! Every backend produces the same [`EnrichmentFields`] shape. The shape is
//! described once, as a JSON Schema ([`enrichment_schema`]), and every raw
//! backend answer goes through [`parse_enrichment`], which checks the value
//! against that schema before deserializing it. The check is independent of
//! how the value was obtained, so the stub and the network backends share it.
//!
//! # Pipeline
//!
//! ```text
//! note text ──▶ backend ──▶ raw JSON ──▶ validate(schema) ──▶ EnrichmentFields
//!                                                                │
//!                          NotesService stamps model + time ◀────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{EnrichmentError, SchemaError};
use crate::models::{NoteMetadata, Sentiment};

/// Model identifier reported by [`StubBackend`].
pub const STUB_MODEL: &str = "stub";

/// Validated output of one enrichment call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFields {
    pub summary: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub key_entities: Vec<String>,
    pub suggested_tags: Vec<String>,
    pub complexity_score: f64,
}

/// Result of [`EnrichmentBackend::enrich`]: the fields plus the model that
/// produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub fields: EnrichmentFields,
    pub model: String,
}

impl Enrichment {
    /// Convert into note metadata stamped with `at`.
    pub fn into_metadata(self, at: DateTime<Utc>) -> NoteMetadata {
        let Enrichment { fields, model } = self;
        NoteMetadata {
            summary: Some(fields.summary),
            topics: Some(fields.topics),
            sentiment: Some(fields.sentiment),
            key_entities: Some(fields.key_entities),
            suggested_tags: Some(fields.suggested_tags),
            complexity_score: Some(fields.complexity_score),
            enrichment_timestamp: Some(at),
            model_identifier: Some(model),
        }
    }
}

/// A source of note enrichments.
///
/// Implementations are selected once at startup and shared behind an
/// `Arc`. A call either returns a complete, schema-valid result or an
/// error; there is no partial output and no retry.
#[async_trait]
pub trait EnrichmentBackend: Send + Sync {
    async fn enrich(&self, text: &str) -> Result<Enrichment, EnrichmentError>;
}

// ============ Schema ============

/// JSON Schema for [`EnrichmentFields`].
///
/// All properties are required, `sentiment` is enumerated, and
/// `complexity_score` is bounded to `[0, 1]`. Unknown properties are
/// rejected.
pub fn enrichment_schema() -> Value {
    let sentiments: Vec<&str> = Sentiment::ALL.iter().map(Sentiment::as_str).collect();
    json!({
        "title": "NoteEnrichment",
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "description": "Concise summary of the note content (2-3 sentences)"
            },
            "topics": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Key topics and themes of the note"
            },
            "sentiment": {
                "type": "string",
                "enum": sentiments,
                "description": "Overall sentiment of the note"
            },
            "key_entities": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Important entities: people, places, concepts"
            },
            "suggested_tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Short tags for categorizing the note"
            },
            "complexity_score": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0,
                "description": "Complexity of the content from 0.0 (trivial) to 1.0 (very complex)"
            }
        },
        "required": [
            "summary",
            "topics",
            "sentiment",
            "key_entities",
            "suggested_tags",
            "complexity_score"
        ],
        "additionalProperties": false
    })
}

/// Check `value` against `schema`.
///
/// Supports the subset of JSON Schema used by [`enrichment_schema`]:
/// `type`, `enum`, `minimum`, `maximum`, `items`, `properties`, `required`
/// and `additionalProperties: false`.
pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaError> {
    validate_at(schema, value, "")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaError> {
    let here = if path.is_empty() { "/" } else { path };

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        let type_ok = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            _ => true,
        };
        if !type_ok {
            return Err(SchemaError::new(
                here,
                format!("expected {}, got {}", expected, json_type_name(value)),
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let names: Vec<String> = allowed
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect();
            return Err(SchemaError::new(
                here,
                format!("must be one of [{}], got {}", names.join(", "), value),
            ));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(SchemaError::new(here, format!("{} is below minimum {}", n, min)));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err(SchemaError::new(here, format!("{} is above maximum {}", n, max)));
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            validate_at(items, item, &format!("{}/{}", path, i))?;
        }
    }

    if let Some(object) = value.as_object() {
        validate_object(schema, object, path)?;
    }

    Ok(())
}

fn validate_object(
    schema: &Value,
    object: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaError> {
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                return Err(SchemaError::new(
                    format!("{}/{}", path, name),
                    "missing required property",
                ));
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (name, child) in object {
        let child_path = format!("{}/{}", path, name);
        match properties.get(name) {
            Some(child_schema) => validate_at(child_schema, child, &child_path)?,
            None if closed => {
                return Err(SchemaError::new(child_path, "unexpected property"));
            }
            None => {}
        }
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============ Parsing ============

/// Validate `value` against [`enrichment_schema`] and deserialize it.
pub fn parse_enrichment(value: &Value) -> Result<EnrichmentFields, EnrichmentError> {
    validate(&enrichment_schema(), value)?;
    Ok(EnrichmentFields::deserialize(value)?)
}

/// Parse raw model output into [`EnrichmentFields`].
///
/// Accepts bare JSON or JSON wrapped in a markdown code fence
/// (```` ```json ... ``` ````).
pub fn parse_enrichment_str(raw: &str) -> Result<EnrichmentFields, EnrichmentError> {
    let payload = strip_code_fence(raw);
    if payload.is_empty() {
        return Err(EnrichmentError::EmptyResponse);
    }
    let value: Value = serde_json::from_str(payload)?;
    parse_enrichment(&value)
}

/// Return the body of the first markdown code fence in `raw`, or `raw`
/// trimmed if there is none. An unterminated fence runs to the end.
pub fn strip_code_fence(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw.trim();
    };
    let after = &raw[open + 3..];
    // Skip an info string such as `json` up to the end of the line.
    let body = match after.find('\n') {
        Some(nl) if after[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => &after[nl + 1..],
        _ => after,
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Instruction prompt asking a model to analyze `text` and answer with JSON
/// matching `schema`.
pub fn analysis_prompt(text: &str, schema: &Value) -> String {
    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "You are an assistant that analyzes personal notes and produces structured enrichments.\n\
         \n\
         Analyze the note below and provide:\n\
         - a concise summary (2-3 sentences)\n\
         - key topics and themes\n\
         - the overall sentiment (positive, neutral or negative)\n\
         - important entities (people, places, concepts)\n\
         - short tags for categorization\n\
         - a complexity score between 0.0 and 1.0\n\
         \n\
         Note content:\n\
         \"\"\"\n\
         {text}\n\
         \"\"\"\n\
         \n\
         Respond with a single JSON object that matches this schema exactly, \
         with no surrounding text:\n\
         {schema_text}\n"
    )
}

// ============ Stub Backend ============

/// Deterministic offline backend.
///
/// Derives every field from simple text heuristics: no network, no clock,
/// no randomness. The same text always yields the same [`Enrichment`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StubBackend;

const SUMMARY_MAX_CHARS: usize = 160;
const MAX_ENTITIES: usize = 5;

const TOPIC_RULES: &[(&str, &[&str])] = &[
    ("meeting", &["meeting", "agenda"]),
    ("task", &["todo", "task"]),
    ("idea", &["idea", "concept"]),
    ("project", &["project"]),
    ("research", &["research"]),
];

const TAG_RULES: &[(&str, &[&str])] = &[
    ("priority", &["urgent", "important", "priority"]),
    ("work", &["work", "job", "career"]),
    ("personal", &["personal", "family", "home"]),
    ("creative", &["idea", "inspiration", "creative"]),
];

const POSITIVE_WORDS: &[&str] = &[
    "good",
    "great",
    "excellent",
    "amazing",
    "wonderful",
    "love",
    "happy",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "terrible",
    "awful",
    "hate",
    "sad",
    "angry",
    "frustrated",
];

impl StubBackend {
    pub fn new() -> Self {
        Self
    }

    /// Raw JSON answer for `text`, before schema validation.
    pub fn analyze(text: &str) -> Value {
        let lower = text.to_lowercase();
        json!({
            "summary": stub_summary(text),
            "topics": stub_topics(&lower),
            "sentiment": stub_sentiment(&lower),
            "key_entities": stub_entities(text),
            "suggested_tags": stub_tags(&lower),
            "complexity_score": stub_complexity(text),
        })
    }
}

#[async_trait]
impl EnrichmentBackend for StubBackend {
    async fn enrich(&self, text: &str) -> Result<Enrichment, EnrichmentError> {
        let fields = parse_enrichment(&Self::analyze(text))?;
        Ok(Enrichment {
            fields,
            model: STUB_MODEL.to_string(),
        })
    }
}

fn stub_summary(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(empty note)".to_string();
    }
    let first_sentence = match trimmed.find(['.', '!', '?']) {
        Some(end) => &trimmed[..=end],
        None => trimmed,
    };
    if first_sentence.chars().count() <= SUMMARY_MAX_CHARS {
        first_sentence.to_string()
    } else {
        let cut: String = first_sentence.chars().take(SUMMARY_MAX_CHARS - 1).collect();
        format!("{}…", cut.trim_end())
    }
}

fn matching_labels(lower: &str, rules: &[(&str, &[&str])]) -> Vec<String> {
    rules
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(label, _)| label.to_string())
        .collect()
}

fn stub_topics(lower: &str) -> Vec<String> {
    let topics = matching_labels(lower, TOPIC_RULES);
    if topics.is_empty() {
        vec!["general".to_string()]
    } else {
        topics
    }
}

fn stub_tags(lower: &str) -> Vec<String> {
    matching_labels(lower, TAG_RULES)
}

fn stub_sentiment(lower: &str) -> &'static str {
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    if positive > negative {
        Sentiment::Positive.as_str()
    } else if negative > positive {
        Sentiment::Negative.as_str()
    } else {
        Sentiment::Neutral.as_str()
    }
}

/// Capitalized words that do not open a sentence, plus `@mentions` and
/// `#hashtags`, deduplicated in order of appearance.
fn stub_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut sentence_start = true;

    for raw in text.split_whitespace() {
        let ends_sentence = raw.ends_with(['.', '!', '?']);
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '#');
        let tagged = (word.starts_with('@') || word.starts_with('#')) && word.chars().count() > 1;
        let proper = !sentence_start
            && word.chars().count() > 2
            && word.chars().next().is_some_and(char::is_uppercase);

        if (tagged || proper) && !entities.iter().any(|e| e == word) {
            entities.push(word.to_string());
            if entities.len() == MAX_ENTITIES {
                break;
            }
        }
        sentence_start = ends_sentence;
    }
    entities
}

/// Mean word length and mean sentence length folded into `[0, 1]`,
/// rounded to two decimals.
fn stub_complexity(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let letters: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_word_len = letters as f64 / words.len() as f64;
    let avg_sentence_len = words.len() as f64 / sentences as f64;

    let raw = avg_word_len * 0.3 + avg_sentence_len * 0.1;
    let score = (raw / 10.0).clamp(0.0, 1.0);
    (score * 100.0).round() / 100.0
}

//! HTTP boundary for the notes service.
//!
//! Translates JSON requests into [`NotesService`] calls and service errors
//! into status codes. No business rules live here.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/notes` | Create a note, `201` |
//! | `GET`    | `/notes?user_id=` | List a user's notes, newest first |
//! | `GET`    | `/notes/stats/info` | Store statistics |
//! | `GET`    | `/notes/{id}?user_id=` | Fetch one note |
//! | `PATCH`  | `/notes/{id}?user_id=` | Replace content and/or metadata |
//! | `PATCH`  | `/notes/{id}/enrich?user_id=` | Run the enrichment backend |
//! | `DELETE` | `/notes/{id}?user_id=` | Delete a note, `204` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "forbidden", "message": "note ... does not belong to user u2" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `enrichment_failed` (502), `internal` (500). With
//! `server.hide_foreign_notes` set, `forbidden` is reported as `not_found`.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use note_enricher_core::{
    InMemoryNoteStore, Note, NoteError, NoteId, NoteMetadata, NoteUpdate, NotesService,
    ServiceStats,
};

use crate::backend::create_backend;
use crate::config::{Config, ServerConfig};

/// Boundary-only settings for [`build_router`].
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    /// Browser origins allowed by CORS. Unparseable entries are skipped and
    /// `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Report notes owned by someone else as missing instead of forbidden.
    pub hide_foreign_notes: bool,
}

impl From<&ServerConfig> for RouterOptions {
    fn from(server: &ServerConfig) -> Self {
        Self {
            allowed_origins: server.allowed_origins.clone(),
            hide_foreign_notes: server.hide_foreign_notes,
        }
    }
}

#[derive(Clone)]
struct AppState {
    service: NotesService,
    hide_foreign_notes: bool,
}

/// Starts the HTTP server.
///
/// Builds the configured enrichment backend, wires it to a fresh
/// [`InMemoryNoteStore`], binds `[server].bind` and serves until the
/// process is terminated. Notes live only as long as the process.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let backend = create_backend(&config.enrichment)?;
    let service = NotesService::new(Arc::new(InMemoryNoteStore::new()), backend);
    let app = build_router(service, RouterOptions::from(&config.server));

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        backend = %config.enrichment.backend,
        "notes server listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the router over an existing service.
///
/// Exposed separately from [`run_server`] so callers can choose the
/// listener, e.g. an ephemeral port in tests.
pub fn build_router(service: NotesService, options: RouterOptions) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&options.allowed_origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    let state = AppState {
        service,
        hide_foreign_notes: options.hide_foreign_notes,
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/notes", post(handle_create).get(handle_list))
        .route("/notes/stats/info", get(handle_stats))
        .route(
            "/notes/{id}",
            get(handle_get).patch(handle_update).delete(handle_delete),
        )
        .route("/notes/{id}/enrich", patch(handle_enrich))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `"*"` anywhere in the list allows every origin.
fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.iter().any(|o| o == "*") {
        return AllowOrigin::any();
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(values)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// Map a service error, collapsing `Forbidden` into `NotFound` when the
    /// server hides foreign notes.
    fn from_note_error(err: NoteError, hide_foreign_notes: bool) -> Self {
        match &err {
            NoteError::Validation(_) => Self::bad_request(err.to_string()),
            NoteError::NotFound(_) => Self::not_found(err.to_string()),
            NoteError::Forbidden { id, .. } if hide_foreign_notes => {
                Self::not_found(NoteError::NotFound(*id).to_string())
            }
            NoteError::Forbidden { .. } => {
                Self::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
            }
            NoteError::EnrichmentFailed(source) => {
                tracing::warn!(error = %source, "enrichment failed");
                Self::new(StatusCode::BAD_GATEWAY, "enrichment_failed", err.to_string())
            }
            NoteError::Storage(source) => {
                tracing::warn!(error = %source, "store failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    err.to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

// ============ Request types ============

#[derive(Deserialize)]
struct OwnerQuery {
    #[serde(default)]
    user_id: String,
}

impl OwnerQuery {
    /// The owner id for operations on a single note; required there.
    fn required(&self) -> Result<&str, AppError> {
        if self.user_id.trim().is_empty() {
            Err(AppError::bad_request("user_id query parameter is required"))
        } else {
            Ok(&self.user_id)
        }
    }
}

#[derive(Deserialize)]
struct CreateNoteRequest {
    content: String,
    user_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateNoteRequest {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<NoteMetadata>,
}

/// A path id that is not a UUID cannot name a stored note.
fn parse_id(raw: &str) -> Result<NoteId, AppError> {
    raw.parse()
        .map_err(|_| AppError::not_found(format!("note not found: {}", raw)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ /notes ============

async fn handle_create(
    State(state): State<AppState>,
    body: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Note>), AppError> {
    let Json(req) = body?;
    let note = state
        .service
        .create_note(&req.content, &req.user_id)
        .await
        .map_err(|e| AppError::from_note_error(e, state.hide_foreign_notes))?;
    tracing::debug!(id = %note.id, "note created");
    Ok((StatusCode::CREATED, Json(note)))
}

/// An empty or missing `user_id` lists nothing.
async fn handle_list(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Json<Vec<Note>> {
    if query.user_id.trim().is_empty() {
        return Json(Vec::new());
    }
    Json(state.service.get_notes(&query.user_id).await)
}

async fn handle_stats(State(state): State<AppState>) -> Json<ServiceStats> {
    Json(state.service.get_stats().await)
}

// ============ /notes/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Note>, AppError> {
    let id = parse_id(&id)?;
    let note = state
        .service
        .get_note(&id, query.required()?)
        .await
        .map_err(|e| AppError::from_note_error(e, state.hide_foreign_notes))?;
    Ok(Json(note))
}

async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
    body: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> Result<Json<Note>, AppError> {
    let id = parse_id(&id)?;
    let owner_id = query.required()?;
    let Json(req) = body?;
    let update = NoteUpdate {
        content: req.content,
        metadata: req.metadata,
    };
    let note = state
        .service
        .update_note(&id, owner_id, update)
        .await
        .map_err(|e| AppError::from_note_error(e, state.hide_foreign_notes))?;
    Ok(Json(note))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    state
        .service
        .delete_note(&id, query.required()?)
        .await
        .map_err(|e| AppError::from_note_error(e, state.hide_foreign_notes))?;
    tracing::debug!(%id, "note deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_enrich(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Note>, AppError> {
    let id = parse_id(&id)?;
    let note = state
        .service
        .enrich_note(&id, query.required()?)
        .await
        .map_err(|e| AppError::from_note_error(e, state.hide_foreign_notes))?;
    tracing::info!(%id, model = ?note.metadata.model_identifier, "note enriched");
    Ok(Json(note))
}

#[cfg(test)]
mod tests {
    use super::*;
    use note_enricher_core::{EnrichmentError, StoreError};

    #[test]
    fn test_error_status_mapping() {
        let id = NoteId::new();
        let cases = [
            (NoteError::validation("bad"), StatusCode::BAD_REQUEST, "bad_request"),
            (NoteError::NotFound(id), StatusCode::NOT_FOUND, "not_found"),
            (
                NoteError::Forbidden {
                    id,
                    owner_id: "u2".to_string(),
                },
                StatusCode::FORBIDDEN,
                "forbidden",
            ),
            (
                NoteError::EnrichmentFailed(EnrichmentError::EmptyResponse),
                StatusCode::BAD_GATEWAY,
                "enrichment_failed",
            ),
            (
                NoteError::Storage(StoreError::Duplicate(id)),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
        ];
        for (err, status, code) in cases {
            let mapped = AppError::from_note_error(err, false);
            assert_eq!(mapped.status, status);
            assert_eq!(mapped.code, code);
        }
    }

    #[test]
    fn test_hidden_foreign_note_maps_to_not_found() {
        let err = NoteError::Forbidden {
            id: NoteId::new(),
            owner_id: "u2".to_string(),
        };
        let mapped = AppError::from_note_error(err, true);
        assert_eq!(mapped.status, StatusCode::NOT_FOUND);
        assert_eq!(mapped.code, "not_found");
        assert!(!mapped.message.contains("u2"));
    }

    #[test]
    fn test_non_uuid_id_is_not_found() {
        let err = parse_id("not-a-uuid").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}

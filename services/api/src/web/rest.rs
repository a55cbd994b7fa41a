//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    auth::{
        __path_login_handler, __path_logout_handler, __path_me_handler, __path_signup_handler,
        AuthResponse, LoginRequest, SignupRequest,
    },
    state::AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use intern_tracker_core::{
    catalog::{Competency, ALL_COMPETENCIES},
    domain::Document,
    mode::{load_session, SessionMode},
    ports::suggest_or_empty,
    summary::DashboardSummary,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        signup_handler,
        login_handler,
        logout_handler,
        me_handler,
        get_document_handler,
        list_competencies_handler,
        suggest_handler,
    ),
    components(
        schemas(SignupRequest, LoginRequest, AuthResponse, SuggestRequest, SuggestResponse)
    ),
    tags(
        (name = "Intern Tracker API", description = "API endpoints for the internship hours and competency tracker.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A read-only snapshot of someone's tracker.
#[derive(Serialize)]
pub struct DocumentResponse {
    pub owner: Uuid,
    pub document: Document,
    pub summary: DashboardSummary,
}

#[derive(Deserialize, ToSchema)]
pub struct SuggestRequest {
    /// The free-text activity description of a log entry.
    pub text: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    pub competency_ids: Vec<String>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Fetch a tracker document for read-only viewing.
///
/// Stored documents are migrated to the current shape before they are returned.
/// An owner with nothing stored gets the empty document.
#[utoipa::path(
    get,
    path = "/documents/{owner_id}",
    params(
        ("owner_id" = Uuid, Path, description = "The identity whose tracker to read.")
    ),
    responses(
        (status = 200, description = "The migrated document and its dashboard summary")
    )
)]
pub async fn get_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(owner_id): Path<Uuid>,
) -> Json<DocumentResponse> {
    let mode = SessionMode::Viewer { owner: owner_id };
    let document = match load_session(app_state.documents.as_ref(), mode, None).await {
        Some(loaded) => loaded.store.document().clone(),
        None => Document::default(),
    };
    let summary = DashboardSummary::from_document(&document);
    Json(DocumentResponse {
        owner: owner_id,
        document,
        summary,
    })
}

/// List the fixed competency catalog.
#[utoipa::path(
    get,
    path = "/competencies",
    responses(
        (status = 200, description = "Every competency, grouped by category order")
    )
)]
pub async fn list_competencies_handler() -> Json<&'static [Competency]> {
    Json(ALL_COMPETENCIES)
}

/// Suggest competencies for an activity description.
///
/// Suggestions are best-effort: any failure of the model yields an empty list.
#[utoipa::path(
    post,
    path = "/suggestions",
    request_body = SuggestRequest,
    responses(
        (status = 200, description = "Suggested competency ids, all from the catalog", body = SuggestResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn suggest_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<SuggestRequest>,
) -> Json<SuggestResponse> {
    let competency_ids = suggest_or_empty(app_state.suggester.as_deref(), &req.text).await;
    info!("Suggested {} competencies", competency_ids.len());
    Json(SuggestResponse { competency_ids })
}

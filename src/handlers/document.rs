use crate::{
    error::SyncError,
    models::{Document, DocumentQuery, DocumentWriteRequest, DocumentWriteResponse, ErrorResponse},
    AppState,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

/// Read the authoritative content of a document
pub async fn doc_read(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<DocumentQuery>,
) -> Result<(StatusCode, Json<Document>), (StatusCode, Json<ErrorResponse>)> {

    let id = match query.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(SyncError::Validation("id required".to_string()).into_response()),
    };

    let document = app_state
        .registry
        .document(&id)
        .await
        .map_err(SyncError::into_response)?;

    Ok((StatusCode::OK, Json(document)))
}

/// Write a document from outside the sync transport.
///
/// The write goes through the document's session, so every connected editor
/// receives it as a regular change.
pub async fn doc_write(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<DocumentWriteRequest>,
) -> Result<(StatusCode, Json<DocumentWriteResponse>), (StatusCode, Json<ErrorResponse>)> {

    let id = match request.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(SyncError::Validation("id required".to_string()).into_response()),
    };

    let session = app_state
        .registry
        .get_or_create(&id)
        .await
        .map_err(SyncError::into_response)?;

    let document = session
        .submit(None, request.content.unwrap_or_default(), None, false)
        .await
        .map_err(SyncError::into_response)?;
    info!("Document '{}' written over HTTP (version {})", id, document.version);

    Ok((
        StatusCode::OK,
        Json(DocumentWriteResponse {
            success: true,
            version: document.version,
        }),
    ))
}

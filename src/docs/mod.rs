use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Readiness and store probe", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Diagnostics endpoint
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Sessions, connections and resource usage", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Read a document
#[utoipa::path(
    get,
    path = "/api/v1/document",
    params(DocumentQuery),
    responses(
        (status = 200, description = "Authoritative document content", body = Document),
        (status = 400, description = "Missing or invalid id", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_read_doc() {}

/// Write a document and broadcast it to connected editors
#[utoipa::path(
    post,
    path = "/api/v1/document",
    request_body = DocumentWriteRequest,
    responses(
        (status = 200, description = "Document persisted and broadcast", body = DocumentWriteResponse),
        (status = 400, description = "Missing or invalid id", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_write_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        doc_read_doc,
        doc_write_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            DiagnosticsResponse,
            Document,
            DocumentWriteRequest,
            DocumentWriteResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "api", description = "Document sync API")
    )
)]
pub struct ApiDoc;

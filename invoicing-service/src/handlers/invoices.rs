//! Invoice handlers for invoicing-service.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::dtos::{
    ArtifactRequest, ArtifactResponse, BulkRequest, BulkResponse, InvoiceListParams,
    InvoiceListResponse, InvoiceRequest, PaymentRequest, PreviewRequest, PreviewResponse,
    SuggestionParams, UpdateInvoiceResponse,
};
use crate::middleware::UserId;
use crate::models::{Invoice, RateSuggestion};
use crate::startup::AppState;
use service_core::error::AppError;

/// Recalculate totals for an unsaved draft.
///
/// POST /invoices/preview
pub async fn preview_invoice(
    State(state): State<AppState>,
    _user: UserId,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    Ok(Json(state.invoices.preview(&req)?))
}

/// POST /invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<InvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    let invoice = state.invoices.create(user_id, req).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// GET /invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<InvoiceListParams>,
) -> Result<Json<InvoiceListResponse>, AppError> {
    Ok(Json(state.invoices.list(user_id, params).await?))
}

/// GET /invoices/{id}
pub async fn get_invoice(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.invoices.get(user_id, invoice_id).await?))
}

/// Full edit. Responds 200 even when the document could not be regenerated;
/// check `render_error`.
///
/// PUT /invoices/{id}
pub async fn update_invoice(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<InvoiceRequest>,
) -> Result<Json<UpdateInvoiceResponse>, AppError> {
    Ok(Json(state.invoices.update(user_id, invoice_id, req).await?))
}

/// Record a full or partial payment.
///
/// PATCH /invoices/{id}
pub async fn record_payment(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.invoices.pay(user_id, invoice_id, req).await?))
}

/// DELETE /invoices/{id}
pub async fn delete_invoice(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.invoices.delete(user_id, invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /invoices/{id}/artifacts
pub async fn render_artifact(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<ArtifactRequest>,
) -> Result<(StatusCode, Json<ArtifactResponse>), AppError> {
    let artifact = state
        .invoices
        .render_artifact(user_id, invoice_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

/// POST /invoices/bulk
pub async fn bulk_invoices(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<BulkRequest>,
) -> Result<Json<BulkResponse>, AppError> {
    Ok(Json(state.invoices.bulk(user_id, req).await?))
}

/// GET /line-items/suggestions?q=
pub async fn suggest_line_items(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Vec<RateSuggestion>>, AppError> {
    Ok(Json(state.invoices.suggestions(user_id, params).await?))
}

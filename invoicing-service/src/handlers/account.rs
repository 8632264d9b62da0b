//! Settings and template handlers for invoicing-service.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};

use crate::dtos::{
    ActiveTemplateRequest, TemplateCatalogResponse, UnlockTemplateRequest, UnlockTemplateResponse,
    UpdateSettingsRequest,
};
use crate::middleware::UserId;
use crate::models::BusinessProfile;
use crate::startup::AppState;
use service_core::error::AppError;

/// GET /settings
pub async fn get_settings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<BusinessProfile>, AppError> {
    Ok(Json(state.accounts.settings(user_id).await?))
}

/// PUT /settings
pub async fn update_settings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<BusinessProfile>, AppError> {
    Ok(Json(state.accounts.update_settings(user_id, req).await?))
}

/// GET /templates
pub async fn list_templates(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<TemplateCatalogResponse>, AppError> {
    Ok(Json(state.accounts.catalog(user_id).await?))
}

/// POST /templates/unlock
pub async fn unlock_template(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<UnlockTemplateRequest>,
) -> Result<(StatusCode, Json<UnlockTemplateResponse>), AppError> {
    let unlocked = state.accounts.unlock(user_id, req).await?;
    Ok((StatusCode::CREATED, Json(unlocked)))
}

/// PUT /templates/active
pub async fn set_active_template(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<ActiveTemplateRequest>,
) -> Result<Json<BusinessProfile>, AppError> {
    Ok(Json(state.accounts.set_active(user_id, req).await?))
}

/// DELETE /templates/{name}
pub async fn remove_template(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.accounts.remove(user_id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Dispute handlers for buyers, OPS, and admins

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::dispute::{
    AdminDisputeRequest, Dispute, DisputeStatus, DisputeStatusRequest, ListDisputesQuery,
    OpenDisputeRequest, RecommendRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

/// Open a dispute against an order
pub async fn open_dispute(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<OpenDisputeRequest>,
) -> ApiResult<(StatusCode, Json<Dispute>)> {
    let dispute = app_state.dispute_service.open(&user, request).await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// Get a single dispute
pub async fn get_dispute(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Dispute>> {
    let dispute = app_state
        .dispute_service
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Dispute not found".to_string()))?;

    Ok(Json(dispute))
}

/// List disputes for the admin dashboard
pub async fn list_disputes(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<ListDisputesQuery>,
) -> ApiResult<Json<Vec<Dispute>>> {
    let disputes = app_state.dispute_service.list(query).await?;
    Ok(Json(disputes))
}

/// OPS status update; the only legal target is INVESTIGATING
pub async fn update_dispute_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<DisputeStatusRequest>,
) -> ApiResult<Json<Dispute>> {
    if request.status != DisputeStatus::Investigating {
        return Err(ApiError::InvalidTransition(format!(
            "OPS can only move a dispute to INVESTIGATING, not {:?}",
            request.status
        )));
    }

    let dispute = app_state
        .dispute_service
        .mark_investigating(&id, &user)
        .await?;

    Ok(Json(dispute))
}

/// OPS advisory recommendation; never moves funds
pub async fn recommend_dispute(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RecommendRequest>,
) -> ApiResult<Json<Dispute>> {
    let dispute = app_state
        .dispute_service
        .recommend(&id, &user, request)
        .await?;

    Ok(Json(dispute))
}

/// Admin dispute action: investigate, resolve, or close
pub async fn admin_dispute_action(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AdminDisputeRequest>,
) -> ApiResult<Json<Dispute>> {
    let dispute = app_state
        .dispute_service
        .apply_admin_action(&id, &user, request)
        .await?;

    Ok(Json(dispute))
}

//! Escrow handlers for the finance dashboard

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::escrow::{Escrow, EscrowActionRequest, EscrowStatus};
use crate::middleware::AuthenticatedUser;
use crate::models::Pagination;
use crate::state::AppState;

/// Query parameters for listing escrow entries
#[derive(Debug, Deserialize)]
pub struct ListEscrowsQuery {
    pub status: Option<EscrowStatus>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// List escrow entries
pub async fn list_escrows(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<ListEscrowsQuery>,
) -> ApiResult<Json<Vec<Escrow>>> {
    let pagination = Pagination {
        page: query.page,
        limit: query.limit,
    };
    let escrows = app_state
        .escrow_service
        .list(query.status, pagination)
        .await?;

    Ok(Json(escrows))
}

/// Get a single escrow entry
pub async fn get_escrow(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Escrow>> {
    let escrow = app_state
        .escrow_service
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Escrow not found".to_string()))?;

    Ok(Json(escrow))
}

/// Apply a finance action to an escrow entry
pub async fn escrow_action(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<EscrowActionRequest>,
) -> ApiResult<Json<Escrow>> {
    let escrow = app_state
        .escrow_service
        .apply_action(&id, request, &user)
        .await?;

    Ok(Json(escrow))
}

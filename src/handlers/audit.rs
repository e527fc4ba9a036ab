//! Audit trail handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::audit::AuditEntry;
use crate::error::ApiResult;
use crate::middleware::AdminUser;
use crate::models::Pagination;
use crate::state::AppState;

/// Query parameters for listing audit entries
#[derive(Debug, Deserialize)]
pub struct ListAuditQuery {
    pub target_type: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// List audit entries, newest first (ADMIN only)
pub async fn list_audit_entries(
    State(app_state): State<AppState>,
    AdminUser(_user): AdminUser,
    Query(query): Query<ListAuditQuery>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    let pagination = Pagination {
        page: query.page,
        limit: query.limit,
    };
    let entries = app_state
        .audit_service
        .list(query.target_type, pagination)
        .await?;

    Ok(Json(entries))
}

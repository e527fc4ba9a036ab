//! Dispute route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn dispute_routes() -> Router<AppState> {
    Router::new()
        .route("/api/disputes", post(open_dispute))
        .route("/api/disputes/:id", get(get_dispute))
        .route("/api/ops/disputes/:id/status", patch(update_dispute_status))
        .route("/api/ops/disputes/:id/recommend", patch(recommend_dispute))
        .route("/api/admin/disputes", get(list_disputes))
        .route("/api/admin/disputes/:id", patch(admin_dispute_action))
}

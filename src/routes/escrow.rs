//! Finance escrow route definitions

use axum::{
    routing::{get, patch},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn escrow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/finance/escrow", get(list_escrows))
        .route("/api/admin/finance/escrow/:id", get(get_escrow))
        .route("/api/admin/finance/escrow/:id", patch(escrow_action))
}

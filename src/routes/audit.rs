//! Audit trail route definitions

use axum::{routing::get, Router};

use crate::handlers::*;
use crate::state::AppState;

pub fn audit_routes() -> Router<AppState> {
    Router::new().route("/api/admin/audit", get(list_audit_entries))
}

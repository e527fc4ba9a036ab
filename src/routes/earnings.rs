//! Growth/affiliate earnings route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn earnings_routes() -> Router<AppState> {
    Router::new()
        .route("/api/growth/earnings", get(list_my_earnings))
        .route("/api/growth/withdraw", get(withdrawal_info))
        .route("/api/growth/withdraw", post(request_withdrawal))
        .route("/api/growth/onboard-supplier", post(onboard_supplier))
        // Affiliates share the withdrawal flow and policy
        .route("/api/affiliate/withdraw", post(request_withdrawal))
        .route("/api/admin/finance/payouts/:id", patch(payout_action))
        .route("/api/admin/earnings/:id/reverse", post(reverse_earning))
}

//! Order, production, and shipment route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(create_order))
        .route("/api/orders/:id", get(get_order))
        .route(
            "/api/factory/production/:order_id",
            get(get_production),
        )
        .route(
            "/api/factory/production/:order_id/status",
            patch(update_production_status),
        )
        .route(
            "/api/ops/shipments/:order_id/status",
            post(update_shipment_status),
        )
}

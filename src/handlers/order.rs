//! Order, production, and shipment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::order::{
    CreateOrderRequest, Order, Production, ProductionStatusRequest, Shipment,
    ShipmentStatusRequest,
};
use crate::state::AppState;

/// Create an order from a confirmed quote, locking its escrow
pub async fn create_order(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = app_state.order_service.create_order(&user, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Get a single order
pub async fn get_order(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    let order = app_state
        .order_service
        .get_order(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

    Ok(Json(order))
}

/// Get the production record for an order (supplier-scoped)
pub async fn get_production(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Production>> {
    let production = app_state
        .order_service
        .get_production(&order_id, &user)
        .await?;

    Ok(Json(production))
}

/// Advance the production track for an order
pub async fn update_production_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ProductionStatusRequest>,
) -> ApiResult<Json<Production>> {
    let production = app_state
        .order_service
        .advance_production(&order_id, &user, request)
        .await?;

    Ok(Json(production))
}

/// Advance the logistics track for an order
pub async fn update_shipment_status(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<ShipmentStatusRequest>,
) -> ApiResult<Json<Shipment>> {
    let shipment = app_state
        .order_service
        .advance_shipment(&order_id, &user, request)
        .await?;

    Ok(Json(shipment))
}

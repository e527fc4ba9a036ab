//! Order service layer - order lifecycle and track advancement
//!
//! Status writes run inside a transaction with the track row locked, so a
//! racing re-post cannot skip a stage. The delivered hook (escrow
//! auto-release, earnings progress) runs after the status commit; each hook
//! serializes its own writes.

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::audit;
use crate::earnings::EarningsService;
use crate::error::{ApiError, ApiResult};
use crate::escrow::EscrowService;
use crate::middleware::AuthenticatedUser;
use crate::models::UserRole;
use crate::order::{
    CreateOrderRequest, Order, OrderStatus, Production, ProductionStatus,
    ProductionStatusRequest, Shipment, ShipmentStatus, ShipmentStatusRequest, StatusEvent,
};

/// Order service for managing the order lifecycle
#[derive(Clone)]
pub struct OrderService {
    db_pool: PgPool,
    escrow_service: EscrowService,
    earnings_service: EarningsService,
}

impl OrderService {
    pub fn new(
        db_pool: PgPool,
        escrow_service: EscrowService,
        earnings_service: EarningsService,
    ) -> Self {
        Self {
            db_pool,
            escrow_service,
            earnings_service,
        }
    }

    /// Create an order from a confirmed quote and lock its escrow
    ///
    /// The order, escrow entry, production record, and shipment record are
    /// created in one transaction.
    pub async fn create_order(
        &self,
        actor: &AuthenticatedUser,
        request: CreateOrderRequest,
    ) -> ApiResult<Order> {
        if !matches!(actor.role, UserRole::Buyer | UserRole::Admin) {
            return Err(ApiError::Forbidden(
                "Only buyers can confirm orders".to_string(),
            ));
        }
        request.validate()?;

        let mut tx = self.db_pool.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                id, buyer_id, supplier_id, product_name, quantity,
                total_amount, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'confirmed', $7, $7)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(actor.user_id)
        .bind(request.supplier_id)
        .bind(&request.product_name)
        .bind(request.quantity)
        .bind(request.total_amount)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        self.escrow_service
            .lock_in_tx(
                &mut tx,
                order.id,
                order.buyer_id,
                order.supplier_id,
                order.total_amount,
            )
            .await?;

        sqlx::query(
            r#"
            INSERT INTO productions (id, order_id, supplier_id, status, updates, created_at, updated_at)
            VALUES ($1, $2, $3, 'not_started', '[]'::jsonb, $4, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(order.supplier_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO shipments (id, order_id, status, events, created_at, updated_at)
            VALUES ($1, $2, 'pending', '[]'::jsonb, $3, $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor.user_id,
            "ORDER_CREATE",
            "ORDER",
            &order.id.to_string(),
            None,
            Some(audit::snapshot(&order)),
            None,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(order_id = %order.id, amount = order.total_amount, "Order created, escrow locked");

        Ok(order)
    }

    /// Get a single order
    pub async fn get_order(&self, id: &Uuid) -> ApiResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(order)
    }

    /// Get the production record for an order, scoped to its supplier
    pub async fn get_production(
        &self,
        order_id: &Uuid,
        actor: &AuthenticatedUser,
    ) -> ApiResult<Production> {
        let production = sqlx::query_as::<_, Production>(
            "SELECT * FROM productions WHERE order_id = $1 AND supplier_id = $2",
        )
        .bind(order_id)
        .bind(actor.user_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Production record not found".to_string()))?;

        Ok(production)
    }

    /// Advance the production track for an order
    pub async fn advance_production(
        &self,
        order_id: &Uuid,
        actor: &AuthenticatedUser,
        request: ProductionStatusRequest,
    ) -> ApiResult<Production> {
        if !actor.role.can_update_production() {
            return Err(ApiError::Forbidden(
                "Only the supplier or factory can update production".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let production = sqlx::query_as::<_, Production>(
            "SELECT * FROM productions WHERE order_id = $1 AND supplier_id = $2 FOR UPDATE",
        )
        .bind(order_id)
        .bind(actor.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Production record not found".to_string()))?;

        if !production.status.can_accept(request.status) {
            return Err(ApiError::InvalidTransition(format!(
                "Cannot move production from {:?} to {:?}; must follow the production flow",
                production.status, request.status
            )));
        }

        // Idempotent re-post of the current stage changes nothing
        if request.status == production.status {
            tx.commit().await?;
            return Ok(production);
        }

        let now = Utc::now();
        let updates = prepend_event(
            &production.updates,
            StatusEvent {
                status: format!("{:?}", request.status),
                note: request.note.clone().unwrap_or_default(),
                timestamp: now,
                updated_by: actor.user_id,
            },
        );

        let updated = sqlx::query_as::<_, Production>(
            r#"
            UPDATE productions
            SET status = $2,
                produced_quantity = COALESCE($3, produced_quantity),
                updates = $4,
                actual_start_date = CASE
                    WHEN $2 = 'in_production' AND actual_start_date IS NULL THEN $5
                    ELSE actual_start_date
                END,
                qc_date = CASE WHEN $2 = 'quality_check' THEN $5 ELSE qc_date END,
                ready_for_pickup_at = CASE WHEN $2 = 'ready_to_ship' THEN $5 ELSE ready_for_pickup_at END,
                shipped_at = CASE WHEN $2 = 'shipped' THEN $5 ELSE shipped_at END,
                updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(production.id)
        .bind(request.status)
        .bind(request.produced_quantity)
        .bind(&updates)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(order_status) = request.status.order_status() {
            sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(order_id)
                .bind(order_status)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        audit::record(
            &mut *tx,
            actor.user_id,
            "FACTORY_PRODUCTION_UPDATE",
            "FACTORY_PRODUCTION",
            &updated.id.to_string(),
            Some(audit::snapshot(&production)),
            Some(audit::snapshot(&updated)),
            Some(json!({ "new_status": request.status, "note": request.note })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            status = ?request.status,
            "Production status advanced"
        );

        Ok(updated)
    }

    /// Advance the logistics track for an order
    ///
    /// DELIVERED stamps the delivery time, marks the order delivered, and
    /// then runs the delivery hooks: escrow auto-release (unless an open
    /// dispute suppresses it) and earnings unlock progress.
    pub async fn advance_shipment(
        &self,
        order_id: &Uuid,
        actor: &AuthenticatedUser,
        request: ShipmentStatusRequest,
    ) -> ApiResult<Shipment> {
        if !matches!(actor.role, UserRole::Ops | UserRole::Admin) {
            return Err(ApiError::Forbidden(
                "Only OPS can update shipments".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let shipment = sqlx::query_as::<_, Shipment>(
            "SELECT * FROM shipments WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Shipment not found".to_string()))?;

        if !shipment.status.can_accept(request.status) {
            return Err(ApiError::InvalidTransition(format!(
                "Cannot move shipment from {:?} to {:?}; must follow the logistics flow",
                shipment.status, request.status
            )));
        }

        if request.status == shipment.status {
            tx.commit().await?;
            return Ok(shipment);
        }

        let now = Utc::now();
        let events = prepend_event(
            &shipment.events,
            StatusEvent {
                status: format!("{:?}", request.status),
                note: request.note.clone().unwrap_or_default(),
                timestamp: now,
                updated_by: actor.user_id,
            },
        );

        let updated = sqlx::query_as::<_, Shipment>(
            r#"
            UPDATE shipments
            SET status = $2,
                events = $3,
                picked_up_at = CASE WHEN $2 = 'picked_up' THEN $4 ELSE picked_up_at END,
                delivered_at = CASE WHEN $2 = 'delivered' THEN $4 ELSE delivered_at END,
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(shipment.id)
        .bind(request.status)
        .bind(&events)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let delivered = request.status == ShipmentStatus::Delivered;
        if delivered {
            sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(order_id)
                .bind(OrderStatus::Delivered)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        audit::record(
            &mut *tx,
            actor.user_id,
            "SHIPMENT_STATUS_UPDATE",
            "SHIPMENT",
            &updated.id.to_string(),
            Some(audit::snapshot(&shipment)),
            Some(audit::snapshot(&updated)),
            Some(json!({ "new_status": request.status, "note": request.note })),
        )
        .await?;

        tx.commit().await?;

        if delivered {
            self.on_order_delivered(order_id, actor.user_id).await?;
        }

        Ok(updated)
    }

    /// Delivery hooks: auto-release escrow and advance earnings unlock
    async fn on_order_delivered(&self, order_id: &Uuid, actor_id: Uuid) -> ApiResult<()> {
        let released = self
            .escrow_service
            .auto_release_on_delivery(order_id, actor_id)
            .await?;

        if let Some(order) = self.get_order(order_id).await? {
            self.earnings_service
                .on_qualifying_order_completed(&order.supplier_id)
                .await?;
        }

        tracing::info!(
            order_id = %order_id,
            auto_released = released.is_some(),
            "Order delivered"
        );

        Ok(())
    }
}

/// Prepend an event to an append-only jsonb history, newest first
fn prepend_event(history: &Value, event: StatusEvent) -> Value {
    let mut entries = match history {
        Value::Array(entries) => entries.clone(),
        _ => Vec::new(),
    };
    entries.insert(0, serde_json::to_value(&event).unwrap_or(Value::Null));
    Value::Array(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_event_newest_first() {
        let history = json!([{ "status": "InProduction" }]);
        let out = prepend_event(
            &history,
            StatusEvent {
                status: "QualityCheck".to_string(),
                note: String::new(),
                timestamp: Utc::now(),
                updated_by: Uuid::new_v4(),
            },
        );

        let entries = out.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["status"], "QualityCheck");
        assert_eq!(entries[1]["status"], "InProduction");
    }

    #[test]
    fn test_prepend_event_handles_non_array() {
        let out = prepend_event(
            &Value::Null,
            StatusEvent {
                status: "PickedUp".to_string(),
                note: "van 3".to_string(),
                timestamp: Utc::now(),
                updated_by: Uuid::new_v4(),
            },
        );
        assert_eq!(out.as_array().unwrap().len(), 1);
    }
}

//! Order models and the status transition tables
//!
//! Each track is a closed enumeration with an explicit `next()` table.
//! A requested status is legal iff it equals the current status (idempotent
//! re-post) or the immediate next stage; everything else is an invalid
//! transition and leaves the record untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A confirmed purchase
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub supplier_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    /// Total in kobo
    pub total_amount: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Overall order lifecycle
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    InProduction,
    QualityCheck,
    ReadyToShip,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The next stage in the forward flow, if any
    pub fn next(self) -> Option<Self> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::InProduction),
            OrderStatus::InProduction => Some(OrderStatus::QualityCheck),
            OrderStatus::QualityCheck => Some(OrderStatus::ReadyToShip),
            OrderStatus::ReadyToShip => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }
}

/// Factory production track
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "production_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionStatus {
    NotStarted,
    InProduction,
    QualityCheck,
    ReadyToShip,
    Shipped,
}

impl ProductionStatus {
    pub fn next(self) -> Option<Self> {
        match self {
            ProductionStatus::NotStarted => Some(ProductionStatus::InProduction),
            ProductionStatus::InProduction => Some(ProductionStatus::QualityCheck),
            ProductionStatus::QualityCheck => Some(ProductionStatus::ReadyToShip),
            ProductionStatus::ReadyToShip => Some(ProductionStatus::Shipped),
            ProductionStatus::Shipped => None,
        }
    }

    /// Current-or-next rule shared by both tracks
    pub fn can_accept(self, requested: Self) -> bool {
        requested == self || Some(requested) == self.next()
    }

    /// Order status mirrored from this production stage
    pub fn order_status(self) -> Option<OrderStatus> {
        match self {
            ProductionStatus::NotStarted => None,
            ProductionStatus::InProduction => Some(OrderStatus::InProduction),
            ProductionStatus::QualityCheck => Some(OrderStatus::QualityCheck),
            ProductionStatus::ReadyToShip => Some(OrderStatus::ReadyToShip),
            ProductionStatus::Shipped => Some(OrderStatus::Shipped),
        }
    }
}

/// Logistics track
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "shipment_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
}

impl ShipmentStatus {
    pub fn next(self) -> Option<Self> {
        match self {
            ShipmentStatus::Pending => Some(ShipmentStatus::PickedUp),
            ShipmentStatus::PickedUp => Some(ShipmentStatus::InTransit),
            ShipmentStatus::InTransit => Some(ShipmentStatus::OutForDelivery),
            ShipmentStatus::OutForDelivery => Some(ShipmentStatus::Delivered),
            ShipmentStatus::Delivered => None,
        }
    }

    pub fn can_accept(self, requested: Self) -> bool {
        requested == self || Some(requested) == self.next()
    }
}

/// Factory production record for an order
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Production {
    pub id: Uuid,
    pub order_id: Uuid,
    pub supplier_id: Uuid,
    pub status: ProductionStatus,
    pub produced_quantity: Option<i32>,
    /// Append-only update history, newest first
    pub updates: serde_json::Value,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub qc_date: Option<DateTime<Utc>>,
    pub ready_for_pickup_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Logistics record for an order
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Shipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: ShipmentStatus,
    /// Append-only event history, newest first
    pub events: serde_json::Value,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a production or shipment history
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusEvent {
    pub status: String,
    pub note: String,
    pub timestamp: DateTime<Utc>,
    pub updated_by: Uuid,
}

/// Request DTO for creating an order from a confirmed quote
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub supplier_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub product_name: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(range(min = 1))]
    pub total_amount: i64,
}

/// Request DTO for a production status update
#[derive(Debug, Deserialize)]
pub struct ProductionStatusRequest {
    pub status: ProductionStatus,
    pub note: Option<String>,
    pub produced_quantity: Option<i32>,
}

/// Request DTO for a shipment status update
#[derive(Debug, Deserialize)]
pub struct ShipmentStatusRequest {
    pub status: ShipmentStatus,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_flow_is_forward_only() {
        use ProductionStatus::*;

        let flow = [NotStarted, InProduction, QualityCheck, ReadyToShip, Shipped];
        for pair in flow.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert!(pair[0].can_accept(pair[1]));
        }
        assert_eq!(Shipped.next(), None);
    }

    #[test]
    fn test_production_rejects_stage_skip() {
        use ProductionStatus::*;

        assert!(!NotStarted.can_accept(QualityCheck));
        assert!(!NotStarted.can_accept(Shipped));
        assert!(!InProduction.can_accept(ReadyToShip));
        // Backwards is also illegal
        assert!(!QualityCheck.can_accept(InProduction));
    }

    #[test]
    fn test_production_accepts_idempotent_repost() {
        use ProductionStatus::*;

        for status in [NotStarted, InProduction, QualityCheck, ReadyToShip, Shipped] {
            assert!(status.can_accept(status));
        }
    }

    #[test]
    fn test_shipment_flow() {
        use ShipmentStatus::*;

        let flow = [Pending, PickedUp, InTransit, OutForDelivery, Delivered];
        for pair in flow.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert_eq!(Delivered.next(), None);

        assert!(!Pending.can_accept(Delivered));
        assert!(!PickedUp.can_accept(OutForDelivery));
        assert!(Delivered.can_accept(Delivered));
    }

    #[test]
    fn test_order_terminal_states() {
        assert_eq!(OrderStatus::Delivered.next(), None);
        assert_eq!(OrderStatus::Cancelled.next(), None);
        assert_eq!(OrderStatus::Shipped.next(), Some(OrderStatus::Delivered));
    }

    #[test]
    fn test_production_order_status_mapping() {
        assert_eq!(ProductionStatus::NotStarted.order_status(), None);
        assert_eq!(
            ProductionStatus::QualityCheck.order_status(),
            Some(OrderStatus::QualityCheck)
        );
        assert_eq!(
            ProductionStatus::Shipped.order_status(),
            Some(OrderStatus::Shipped)
        );
    }
}

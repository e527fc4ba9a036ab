//! Dispute models and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A dispute raised against an order
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: Uuid,
    pub raised_by: Uuid,
    pub dispute_type: DisputeType,
    pub status: DisputeStatus,
    pub description: String,
    /// Advisory only; never moves funds
    pub ops_recommendation: Option<OpsRecommendation>,
    pub ops_notes: Option<String>,
    pub resolution_type: Option<ResolutionType>,
    pub resolution_notes: Option<String>,
    /// Kobo amounts set at resolution
    pub refund_amount: Option<i64>,
    pub supplier_penalty: Option<i64>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    /// Whether the dispute can still be recommended on or resolved
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            DisputeStatus::Open | DisputeStatus::Investigating
        )
    }
}

/// Dispute categories
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "dispute_type", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeType {
    NonDelivery,
    QualityIssue,
    WrongItem,
    PricingDispute,
    ShippingDamage,
    Other,
}

/// Dispute lifecycle
///
/// OPEN → INVESTIGATING → RESOLVED_* → CLOSED. A resolved or closed dispute
/// is never resolved again.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "dispute_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    Investigating,
    ResolvedBuyerFavor,
    ResolvedSupplierFavor,
    ResolvedPartial,
    Closed,
}

/// OPS advisory recommendation values
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "ops_recommendation", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpsRecommendation {
    Release,
    PartialRelease,
    Hold,
    RefundBuyer,
    Escalate,
}

/// Binding resolution chosen by ADMIN/FINANCE_ADMIN
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "resolution_type", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionType {
    FullRefund,
    PartialRefund,
    NoAction,
}

impl ResolutionType {
    /// The resolved status this resolution lands the dispute in
    pub fn resolved_status(self) -> DisputeStatus {
        match self {
            ResolutionType::FullRefund => DisputeStatus::ResolvedBuyerFavor,
            ResolutionType::PartialRefund => DisputeStatus::ResolvedPartial,
            ResolutionType::NoAction => DisputeStatus::ResolvedSupplierFavor,
        }
    }
}

/// Request DTO for opening a dispute
#[derive(Debug, Deserialize, Validate)]
pub struct OpenDisputeRequest {
    pub order_id: Uuid,
    pub dispute_type: DisputeType,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
}

/// Request DTO for the OPS status endpoint (OPEN → INVESTIGATING only)
#[derive(Debug, Deserialize)]
pub struct DisputeStatusRequest {
    pub status: DisputeStatus,
}

/// Request DTO for the OPS recommendation endpoint
#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub recommendation: OpsRecommendation,
    pub ops_notes: Option<String>,
}

/// Admin dispute action: investigate, resolve, or close
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisputeAction {
    Investigate,
    Resolve,
    Close,
}

/// Request DTO for the admin dispute endpoint
#[derive(Debug, Deserialize)]
pub struct AdminDisputeRequest {
    pub action: DisputeAction,
    pub resolution_type: Option<ResolutionType>,
    pub refund_amount: Option<i64>,
    pub supplier_penalty: Option<i64>,
    pub notes: Option<String>,
}

/// Query parameters for listing disputes
#[derive(Debug, Deserialize)]
pub struct ListDisputesQuery {
    pub status: Option<DisputeStatus>,
    pub order_id: Option<Uuid>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_status_mapping() {
        assert_eq!(
            ResolutionType::FullRefund.resolved_status(),
            DisputeStatus::ResolvedBuyerFavor
        );
        assert_eq!(
            ResolutionType::PartialRefund.resolved_status(),
            DisputeStatus::ResolvedPartial
        );
        assert_eq!(
            ResolutionType::NoAction.resolved_status(),
            DisputeStatus::ResolvedSupplierFavor
        );
    }

    #[test]
    fn test_open_states() {
        let mut dispute = Dispute {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            raised_by: Uuid::new_v4(),
            dispute_type: DisputeType::QualityIssue,
            status: DisputeStatus::Open,
            description: "items arrived chipped".to_string(),
            ops_recommendation: None,
            ops_notes: None,
            resolution_type: None,
            resolution_notes: None,
            refund_amount: None,
            supplier_penalty: None,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(dispute.is_open());
        dispute.status = DisputeStatus::Investigating;
        assert!(dispute.is_open());
        dispute.status = DisputeStatus::ResolvedPartial;
        assert!(!dispute.is_open());
        dispute.status = DisputeStatus::Closed;
        assert!(!dispute.is_open());
    }
}

//! Escrow models and data structures

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Escrow ledger entry: funds locked against an order
///
/// Amounts are integers in kobo. Conservation invariant:
/// `released_amount + refunded_amount <= locked_amount`, and a terminal entry
/// is never mutated again.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Escrow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub supplier_id: Uuid,
    pub locked_amount: i64,
    pub released_amount: i64,
    pub refunded_amount: i64,
    pub status: EscrowStatus,
    pub notes: Option<String>,
    pub locked_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escrow {
    /// Amount still held by the platform
    pub fn available(&self) -> i64 {
        self.locked_amount - self.released_amount - self.refunded_amount
    }

    /// Terminal entries are immutable
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            EscrowStatus::Released | EscrowStatus::Refunded | EscrowStatus::PartiallyRefunded
        )
    }
}

/// Escrow ledger entry state
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "escrow_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    Locked,
    OnHold,
    Released,
    Refunded,
    PartiallyRefunded,
}

/// Finance action on an escrow entry
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscrowAction {
    Release,
    PartialRelease,
    Refund,
    PartialRefund,
    Hold,
    Resume,
}

/// Request DTO for the finance escrow endpoint
#[derive(Debug, Deserialize)]
pub struct EscrowActionRequest {
    pub action: EscrowAction,
    pub amount: Option<i64>,
    pub reason: String,
    /// For partial refunds: release the remainder to the supplier
    #[serde(default)]
    pub release_remainder: bool,
}

impl EscrowActionRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("Reason is required for all escrow actions".to_string());
        }
        match self.action {
            EscrowAction::PartialRelease | EscrowAction::PartialRefund => match self.amount {
                Some(a) if a > 0 => Ok(()),
                _ => Err("A positive amount is required for partial actions".to_string()),
            },
            _ => Ok(()),
        }
    }
}

//! Earnings and payout models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A growth or affiliate commission record
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Earning {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub earning_type: EarningType,
    /// Kobo
    pub amount: i64,
    pub status: EarningStatus,
    /// Supplier whose order activity unlocks this earning
    pub supplier_ref: Option<Uuid>,
    pub description: Option<String>,
    pub unlock_progress: i32,
    pub unlock_target: i32,
    pub payout_id: Option<Uuid>,
    pub reversal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How the commission was earned
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "earning_type", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarningType {
    Onboard,
    FirstOrder,
    OrderCommission,
}

/// Earning lifecycle
///
/// PENDING → UNLOCKED → PAID; REVERSED is terminal and excluded from every
/// withdrawable sum.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "earning_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarningStatus {
    Pending,
    Unlocked,
    Paid,
    Reversed,
}

/// A withdrawal request awaiting finance action
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Payout {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub amount: i64,
    pub status: PayoutStatus,
    pub notes: Option<String>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payout lifecycle
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    PendingFinance,
    Approved,
    Rejected,
    OnHold,
    Completed,
}

/// Request DTO for a growth/affiliate withdrawal
#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: i64,
}

/// Withdrawal info shown on the agent dashboard
#[derive(Debug, Serialize)]
pub struct WithdrawalInfo {
    pub available_balance: i64,
    pub minimum_payout: i64,
    pub pending_payouts: Vec<Payout>,
}

/// Finance action on a payout
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutAction {
    Approve,
    Reject,
    Hold,
}

/// Request DTO for the finance payout endpoint
#[derive(Debug, Deserialize)]
pub struct PayoutActionRequest {
    pub action: PayoutAction,
    pub notes: Option<String>,
}

/// Request DTO for growth-agent supplier onboarding
#[derive(Debug, Deserialize, Validate)]
pub struct OnboardSupplierRequest {
    pub supplier_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub business_name: String,
    #[validate(email)]
    pub supplier_email: Option<String>,
    pub notes: Option<String>,
}

/// Request DTO for reversing an earning
#[derive(Debug, Deserialize)]
pub struct ReverseEarningRequest {
    pub reason: String,
}

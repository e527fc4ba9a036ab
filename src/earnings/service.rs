//! Earnings service layer - commission unlock and payout workflow
//!
//! Withdrawal reserves earnings oldest-first under row locks; finance
//! approval and rejection race through conditional updates on the payout
//! status. Unlock progress and the PENDING→UNLOCKED flip happen in one
//! statement so no intermediate state is observable.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::audit;
use crate::config::MarketplaceSettings;
use crate::earnings::{
    Earning, EarningStatus, EarningType, OnboardSupplierRequest, Payout, PayoutAction,
    PayoutActionRequest, PayoutStatus, ReverseEarningRequest, WithdrawRequest, WithdrawalInfo,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::UserRole;

/// Earnings service for growth and affiliate commissions
#[derive(Clone)]
pub struct EarningsService {
    db_pool: PgPool,
    settings: MarketplaceSettings,
}

impl EarningsService {
    pub fn new(db_pool: PgPool, settings: MarketplaceSettings) -> Self {
        Self { db_pool, settings }
    }

    /// Create a PENDING earning with zero unlock progress
    pub async fn record_earning(
        &self,
        agent_id: Uuid,
        earning_type: EarningType,
        amount: i64,
        supplier_ref: Option<Uuid>,
        description: Option<String>,
        unlock_target: i32,
    ) -> ApiResult<Earning> {
        if amount <= 0 {
            return Err(ApiError::BadRequest(
                "Earning amount must be greater than 0".to_string(),
            ));
        }

        let now = Utc::now();
        let earning = sqlx::query_as::<_, Earning>(
            r#"
            INSERT INTO earnings (
                id, agent_id, earning_type, amount, status, supplier_ref,
                description, unlock_progress, unlock_target, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, 0, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(agent_id)
        .bind(earning_type)
        .bind(amount)
        .bind(supplier_ref)
        .bind(description)
        .bind(unlock_target.max(0))
        .bind(now)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(earning)
    }

    /// Growth agent onboards a supplier, earning a pending commission
    pub async fn onboard_supplier(
        &self,
        actor: &AuthenticatedUser,
        request: OnboardSupplierRequest,
    ) -> ApiResult<Earning> {
        if !matches!(actor.role, UserRole::GrowthAgent) {
            return Err(ApiError::Forbidden(
                "Only growth agents can onboard suppliers".to_string(),
            ));
        }
        request.validate()?;

        // Anti-fraud: an agent cannot onboard themselves
        if self.settings.block_self_onboard {
            if let (Some(agent_email), Some(supplier_email)) =
                (&actor.email, &request.supplier_email)
            {
                if agent_email.eq_ignore_ascii_case(supplier_email) {
                    return Err(ApiError::Forbidden(
                        "You cannot onboard yourself as a supplier".to_string(),
                    ));
                }
            }
        }

        let earning = self
            .record_earning(
                actor.user_id,
                EarningType::Onboard,
                self.settings.supplier_onboard_commission,
                Some(request.supplier_id),
                Some(format!("Onboarded: {}", request.business_name)),
                self.settings.orders_required_to_unlock,
            )
            .await?;

        audit::record(
            &self.db_pool,
            actor.user_id,
            "GROWTH_ONBOARD_SUPPLIER",
            "EARNING",
            &earning.id.to_string(),
            None,
            Some(audit::snapshot(&earning)),
            Some(json!({ "supplier_id": request.supplier_id, "notes": request.notes })),
        )
        .await?;

        tracing::info!(
            agent_id = %actor.user_id,
            supplier_id = %request.supplier_id,
            amount = earning.amount,
            "Supplier onboarded, commission pending unlock"
        );

        Ok(earning)
    }

    /// Advance unlock progress for every pending earning tied to a supplier
    ///
    /// Progress increment and the PENDING→UNLOCKED flip happen in the same
    /// statement; an earning whose progress reaches its target is never
    /// observable as pending-at-target.
    pub async fn on_qualifying_order_completed(&self, supplier_ref: &Uuid) -> ApiResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE earnings
            SET unlock_progress = unlock_progress + 1,
                status = CASE
                    WHEN unlock_progress + 1 >= unlock_target THEN 'unlocked'::earning_status
                    ELSE status
                END,
                updated_at = $2
            WHERE supplier_ref = $1 AND status = 'pending'
            "#,
        )
        .bind(supplier_ref)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        let advanced = result.rows_affected();
        if advanced > 0 {
            tracing::info!(
                supplier_ref = %supplier_ref,
                earnings = advanced,
                "Qualifying order advanced earning unlock progress"
            );
        }

        Ok(advanced)
    }

    /// List an agent's earnings, newest first
    pub async fn list_for_agent(&self, agent_id: &Uuid) -> ApiResult<Vec<Earning>> {
        let earnings = sqlx::query_as::<_, Earning>(
            "SELECT * FROM earnings WHERE agent_id = $1 ORDER BY created_at DESC",
        )
        .bind(agent_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(earnings)
    }

    /// Withdrawal info for the agent dashboard
    pub async fn withdrawal_info(&self, agent_id: &Uuid) -> ApiResult<WithdrawalInfo> {
        let available_balance: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM earnings WHERE agent_id = $1 AND status = 'unlocked'",
        )
        .bind(agent_id)
        .fetch_one(&self.db_pool)
        .await?;

        let pending_payouts = sqlx::query_as::<_, Payout>(
            r#"
            SELECT * FROM payouts
            WHERE agent_id = $1 AND status IN ('pending_finance', 'on_hold')
            ORDER BY created_at DESC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(WithdrawalInfo {
            available_balance,
            minimum_payout: self.settings.minimum_payout,
            pending_payouts,
        })
    }

    /// Request a withdrawal of unlocked earnings
    ///
    /// Reserves covering earnings oldest-first as PAID and creates a payout
    /// in PENDING_FINANCE. On any failure nothing is reserved. The payout
    /// settles on earning granularity, so its amount is the covered sum
    /// (never less than requested).
    pub async fn request_withdrawal(
        &self,
        actor: &AuthenticatedUser,
        request: WithdrawRequest,
    ) -> ApiResult<Payout> {
        if !matches!(actor.role, UserRole::GrowthAgent | UserRole::Affiliate) {
            return Err(ApiError::Forbidden(
                "Only growth agents and affiliates can withdraw earnings".to_string(),
            ));
        }
        if request.amount <= 0 {
            return Err(ApiError::BadRequest("Valid amount required".to_string()));
        }
        if request.amount < self.settings.minimum_payout {
            return Err(ApiError::BelowMinimum {
                requested: request.amount,
                minimum: self.settings.minimum_payout,
            });
        }

        let mut tx = self.db_pool.begin().await?;

        let unlocked = sqlx::query_as::<_, Earning>(
            r#"
            SELECT * FROM earnings
            WHERE agent_id = $1 AND status = 'unlocked'
            ORDER BY created_at ASC
            FOR UPDATE
            "#,
        )
        .bind(actor.user_id)
        .fetch_all(&mut *tx)
        .await?;

        let total_unlocked: i64 = unlocked.iter().map(|e| e.amount).sum();
        if request.amount > total_unlocked {
            return Err(ApiError::InsufficientUnlocked {
                requested: request.amount,
                available: total_unlocked,
            });
        }

        // Cover the requested amount oldest-first
        let mut covered: i64 = 0;
        let mut reserved_ids: Vec<Uuid> = Vec::new();
        for earning in &unlocked {
            if covered >= request.amount {
                break;
            }
            covered += earning.amount;
            reserved_ids.push(earning.id);
        }

        let now = Utc::now();
        let payout_id = Uuid::new_v4();

        let payout = sqlx::query_as::<_, Payout>(
            r#"
            INSERT INTO payouts (id, agent_id, amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending_finance', $4, $4)
            RETURNING *
            "#,
        )
        .bind(payout_id)
        .bind(actor.user_id)
        .bind(covered)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE earnings
            SET status = 'paid', payout_id = $2, updated_at = $3
            WHERE id = ANY($1)
            "#,
        )
        .bind(&reserved_ids)
        .bind(payout_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        audit::record(
            &mut *tx,
            actor.user_id,
            "EARNINGS_WITHDRAWAL_REQUEST",
            "PAYOUT",
            &payout.id.to_string(),
            None,
            Some(audit::snapshot(&payout)),
            Some(json!({ "requested": request.amount, "reserved_earnings": reserved_ids.len() })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            agent_id = %actor.user_id,
            payout_id = %payout.id,
            amount = payout.amount,
            "Withdrawal submitted for finance approval"
        );

        Ok(payout)
    }

    /// Finance action on a payout: approve, reject, or hold
    ///
    /// Rejection returns the reserved earnings to UNLOCKED.
    pub async fn apply_payout_action(
        &self,
        payout_id: &Uuid,
        actor: &AuthenticatedUser,
        request: PayoutActionRequest,
    ) -> ApiResult<Payout> {
        if !actor.role.can_move_funds() {
            return Err(ApiError::Forbidden(
                "Only FINANCE_ADMIN can approve or reject payouts".to_string(),
            ));
        }

        let before = sqlx::query_as::<_, Payout>("SELECT * FROM payouts WHERE id = $1")
            .bind(payout_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Payout not found".to_string()))?;

        let new_status = match request.action {
            PayoutAction::Approve => PayoutStatus::Approved,
            PayoutAction::Reject => PayoutStatus::Rejected,
            PayoutAction::Hold => PayoutStatus::OnHold,
        };

        let mut tx = self.db_pool.begin().await?;

        let updated = sqlx::query_as::<_, Payout>(
            r#"
            UPDATE payouts
            SET status = $2, notes = $3, decided_by = $4, decided_at = $5, updated_at = $5
            WHERE id = $1 AND status IN ('pending_finance', 'on_hold')
            RETURNING *
            "#,
        )
        .bind(payout_id)
        .bind(new_status)
        .bind(&request.notes)
        .bind(actor.user_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!("Payout {} has already been decided", payout_id))
        })?;

        if request.action == PayoutAction::Reject {
            sqlx::query(
                r#"
                UPDATE earnings
                SET status = 'unlocked', payout_id = NULL, updated_at = $2
                WHERE payout_id = $1 AND status = 'paid'
                "#,
            )
            .bind(payout_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        audit::record(
            &mut *tx,
            actor.user_id,
            match request.action {
                PayoutAction::Approve => "PAYOUT_APPROVE",
                PayoutAction::Reject => "PAYOUT_REJECT",
                PayoutAction::Hold => "PAYOUT_HOLD",
            },
            "PAYOUT",
            &payout_id.to_string(),
            Some(audit::snapshot(&before)),
            Some(audit::snapshot(&updated)),
            Some(json!({ "notes": request.notes })),
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Reverse an earning for fraud or clawback
    ///
    /// Legal only while PENDING or UNLOCKED. REVERSED is terminal: the
    /// amount leaves every withdrawable sum for good.
    pub async fn reverse_earning(
        &self,
        earning_id: &Uuid,
        actor: &AuthenticatedUser,
        request: ReverseEarningRequest,
    ) -> ApiResult<Earning> {
        if !actor.role.can_resolve_disputes() {
            return Err(ApiError::Forbidden(
                "Only ADMIN or FINANCE_ADMIN can reverse earnings".to_string(),
            ));
        }
        if request.reason.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "A reason is required to reverse an earning".to_string(),
            ));
        }

        let before = sqlx::query_as::<_, Earning>("SELECT * FROM earnings WHERE id = $1")
            .bind(earning_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Earning not found".to_string()))?;

        if !matches!(before.status, EarningStatus::Pending | EarningStatus::Unlocked) {
            return Err(ApiError::InvalidTransition(format!(
                "Cannot reverse an earning in state {:?}",
                before.status
            )));
        }

        let mut tx = self.db_pool.begin().await?;

        let updated = sqlx::query_as::<_, Earning>(
            r#"
            UPDATE earnings
            SET status = 'reversed', reversal_reason = $2, updated_at = $3
            WHERE id = $1 AND status IN ('pending', 'unlocked')
            RETURNING *
            "#,
        )
        .bind(earning_id)
        .bind(&request.reason)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("Earning status changed concurrently".to_string())
        })?;

        audit::record(
            &mut *tx,
            actor.user_id,
            "EARNING_REVERSE",
            "EARNING",
            &earning_id.to_string(),
            Some(audit::snapshot(&before)),
            Some(audit::snapshot(&updated)),
            Some(json!({ "reason": request.reason })),
        )
        .await?;

        tx.commit().await?;

        tracing::warn!(
            earning_id = %earning_id,
            reason = %request.reason,
            "Earning reversed"
        );

        Ok(updated)
    }
}

//! Escrow service layer - fund movement with at-most-once semantics
//!
//! All mutations run inside a transaction with the escrow row locked
//! (`SELECT ... FOR UPDATE`) or guarded by a conditional update on the
//! current status, so racing requests cannot both pass a stale read. The
//! audit entry is written on the same transaction as the mutation.

use chrono::Utc;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::audit;
use crate::error::{ApiError, ApiResult};
use crate::escrow::{Escrow, EscrowAction, EscrowActionRequest, EscrowStatus};
use crate::middleware::AuthenticatedUser;
use crate::models::Pagination;

/// Escrow service for managing the order escrow ledger
#[derive(Clone)]
pub struct EscrowService {
    db_pool: PgPool,
}

impl EscrowService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Get a single escrow entry by ID
    pub async fn get(&self, id: &Uuid) -> ApiResult<Option<Escrow>> {
        let escrow = sqlx::query_as::<_, Escrow>("SELECT * FROM escrows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(escrow)
    }

    /// Get the escrow entry for an order
    pub async fn get_by_order(&self, order_id: &Uuid) -> ApiResult<Option<Escrow>> {
        let escrow = sqlx::query_as::<_, Escrow>("SELECT * FROM escrows WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(escrow)
    }

    /// List escrow entries for the finance dashboard
    pub async fn list(
        &self,
        status: Option<EscrowStatus>,
        pagination: Pagination,
    ) -> ApiResult<Vec<Escrow>> {
        let (limit, offset) = pagination.resolve();

        let mut query_builder: sqlx::QueryBuilder<Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM escrows WHERE 1=1");

        if let Some(status) = status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let escrows = query_builder
            .build_query_as::<Escrow>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(escrows)
    }

    /// Lock funds for a newly confirmed order (runs on the caller's transaction)
    pub async fn lock_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        buyer_id: Uuid,
        supplier_id: Uuid,
        amount: i64,
    ) -> ApiResult<Escrow> {
        if amount <= 0 {
            return Err(ApiError::BadRequest(
                "Escrow amount must be greater than 0".to_string(),
            ));
        }

        let now = Utc::now();
        let escrow = sqlx::query_as::<_, Escrow>(
            r#"
            INSERT INTO escrows (
                id, order_id, buyer_id, supplier_id, locked_amount,
                released_amount, refunded_amount, status, locked_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 0, 0, 'locked', $6, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(buyer_id)
        .bind(supplier_id)
        .bind(amount)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(escrow)
    }

    /// Dispatch a finance escrow action
    pub async fn apply_action(
        &self,
        escrow_id: &Uuid,
        request: EscrowActionRequest,
        actor: &AuthenticatedUser,
    ) -> ApiResult<Escrow> {
        if !actor.role.can_move_funds() {
            return Err(ApiError::Forbidden(
                "Only FINANCE_ADMIN can perform escrow actions".to_string(),
            ));
        }
        request.validate().map_err(ApiError::ValidationError)?;

        let escrow = self
            .get(escrow_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Escrow not found".to_string()))?;

        match request.action {
            EscrowAction::Release => {
                self.release(&escrow.order_id, actor.user_id, &request.reason, false)
                    .await
            }
            EscrowAction::PartialRelease => {
                // A partial release is a partial refund with the remainder
                // kept locked, seen from the supplier side: pay out `amount`
                // and leave the rest held for a later decision.
                self.partial_release(
                    &escrow.order_id,
                    request.amount.unwrap_or(0),
                    actor.user_id,
                    &request.reason,
                )
                .await
            }
            EscrowAction::Refund => {
                self.refund(&escrow.order_id, None, false, actor.user_id, &request.reason)
                    .await
            }
            EscrowAction::PartialRefund => {
                self.refund(
                    &escrow.order_id,
                    request.amount,
                    request.release_remainder,
                    actor.user_id,
                    &request.reason,
                )
                .await
            }
            EscrowAction::Hold => self.hold(&escrow.order_id, actor.user_id, &request.reason).await,
            EscrowAction::Resume => {
                self.resume(&escrow.order_id, actor.user_id, &request.reason)
                    .await
            }
        }
    }

    /// Release the full locked amount to the supplier
    pub async fn release(
        &self,
        order_id: &Uuid,
        actor_id: Uuid,
        note: &str,
        auto: bool,
    ) -> ApiResult<Escrow> {
        let mut tx = self.db_pool.begin().await?;
        let escrow = self.release_in_tx(&mut tx, order_id, actor_id, note, auto).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            amount = escrow.released_amount,
            auto = auto,
            "Escrow released to supplier"
        );

        Ok(escrow)
    }

    /// Release on an open transaction (used by dispute resolution)
    pub async fn release_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: &Uuid,
        actor_id: Uuid,
        note: &str,
        auto: bool,
    ) -> ApiResult<Escrow> {
        let before = sqlx::query_as::<_, Escrow>(
            "SELECT * FROM escrows WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Escrow not found".to_string()))?;

        if before.is_terminal() {
            return Err(ApiError::AlreadyReleased(format!(
                "Escrow for order {} is already settled",
                order_id
            )));
        }

        // Release requires LOCKED; a held entry must be resumed first.
        let updated = sqlx::query_as::<_, Escrow>(
            r#"
            UPDATE escrows
            SET status = 'released',
                released_amount = locked_amount - refunded_amount,
                released_at = $2,
                notes = $3,
                updated_at = $2
            WHERE order_id = $1 AND status = 'locked'
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(Utc::now())
        .bind(note)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!(
                "Escrow for order {} is not in a releasable state",
                order_id
            ))
        })?;

        // Credit only what was still held; earlier partial payouts are
        // already in the supplier's wallet.
        let newly_released = before.available();
        credit_wallet(tx, updated.supplier_id, newly_released).await?;

        audit::record(
            &mut **tx,
            actor_id,
            if auto { "ESCROW_AUTO_RELEASE" } else { "ESCROW_RELEASE" },
            "ESCROW",
            &updated.id.to_string(),
            Some(audit::snapshot(&before)),
            Some(audit::snapshot(&updated)),
            Some(json!({ "note": note })),
        )
        .await?;

        Ok(updated)
    }

    /// Pay out part of the escrow to the supplier, keeping the rest locked
    async fn partial_release(
        &self,
        order_id: &Uuid,
        amount: i64,
        actor_id: Uuid,
        note: &str,
    ) -> ApiResult<Escrow> {
        let mut tx = self.db_pool.begin().await?;

        let before = lock_row(&mut tx, order_id).await?;
        if before.is_terminal() {
            return Err(ApiError::AlreadyReleased(format!(
                "Escrow for order {} is already settled",
                order_id
            )));
        }
        if amount <= 0 || amount >= before.available() {
            return Err(ApiError::BadRequest(
                "Partial release amount must be positive and below the held amount".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Escrow>(
            r#"
            UPDATE escrows
            SET released_amount = released_amount + $2,
                released_at = $3,
                notes = $4,
                updated_at = $3
            WHERE order_id = $1 AND status IN ('locked', 'on_hold')
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(amount)
        .bind(Utc::now())
        .bind(note)
        .fetch_one(&mut *tx)
        .await?;

        credit_wallet(&mut tx, updated.supplier_id, amount).await?;

        audit::record(
            &mut *tx,
            actor_id,
            "ESCROW_PARTIAL_RELEASE",
            "ESCROW",
            &updated.id.to_string(),
            Some(audit::snapshot(&before)),
            Some(audit::snapshot(&updated)),
            Some(json!({ "amount": amount, "note": note })),
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Refund to the buyer; `None` refunds everything still held
    pub async fn refund(
        &self,
        order_id: &Uuid,
        amount: Option<i64>,
        release_remainder: bool,
        actor_id: Uuid,
        note: &str,
    ) -> ApiResult<Escrow> {
        let mut tx = self.db_pool.begin().await?;
        let escrow = self
            .refund_in_tx(&mut tx, order_id, amount, release_remainder, actor_id, note)
            .await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            amount = escrow.refunded_amount,
            release_remainder = release_remainder,
            "Escrow refunded to buyer"
        );

        Ok(escrow)
    }

    /// Refund on an open transaction (used by dispute resolution)
    ///
    /// `amount = None` refunds the full held amount, computed under the row
    /// lock so racing requests cannot disagree about what is available.
    pub async fn refund_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: &Uuid,
        amount: Option<i64>,
        release_remainder: bool,
        actor_id: Uuid,
        note: &str,
    ) -> ApiResult<Escrow> {
        let before = lock_row(tx, order_id).await?;

        if before.is_terminal() {
            return Err(ApiError::AlreadyReleased(format!(
                "Escrow for order {} is already settled",
                order_id
            )));
        }

        let amount = amount.unwrap_or_else(|| before.available());
        if amount <= 0 {
            return Err(ApiError::BadRequest(
                "Refund amount must be greater than 0".to_string(),
            ));
        }
        if amount > before.available() {
            return Err(ApiError::AmountExceedsLocked {
                requested: amount,
                available: before.available(),
            });
        }

        let full = amount == before.available() && before.released_amount == 0;
        let remainder = before.available() - amount;
        let released_extra = if release_remainder { remainder } else { 0 };

        let status = if full {
            EscrowStatus::Refunded
        } else {
            EscrowStatus::PartiallyRefunded
        };

        let now = Utc::now();
        let updated = sqlx::query_as::<_, Escrow>(
            r#"
            UPDATE escrows
            SET status = $2,
                refunded_amount = refunded_amount + $3,
                released_amount = released_amount + $4,
                refunded_at = $5,
                released_at = CASE WHEN $4 > 0 THEN $5 ELSE released_at END,
                notes = $6,
                updated_at = $5
            WHERE order_id = $1 AND status IN ('locked', 'on_hold')
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(status)
        .bind(amount)
        .bind(released_extra)
        .bind(now)
        .bind(note)
        .fetch_one(&mut **tx)
        .await?;

        credit_wallet(tx, updated.buyer_id, amount).await?;
        if released_extra > 0 {
            credit_wallet(tx, updated.supplier_id, released_extra).await?;
        }

        audit::record(
            &mut **tx,
            actor_id,
            "ESCROW_REFUND",
            "ESCROW",
            &updated.id.to_string(),
            Some(audit::snapshot(&before)),
            Some(audit::snapshot(&updated)),
            Some(json!({
                "amount": amount,
                "released_remainder": released_extra,
                "note": note,
            })),
        )
        .await?;

        Ok(updated)
    }

    /// Place a locked entry on hold, blocking auto-release
    async fn hold(&self, order_id: &Uuid, actor_id: Uuid, reason: &str) -> ApiResult<Escrow> {
        self.flip_hold(order_id, actor_id, reason, EscrowStatus::Locked, EscrowStatus::OnHold)
            .await
    }

    /// Return a held entry to locked
    async fn resume(&self, order_id: &Uuid, actor_id: Uuid, reason: &str) -> ApiResult<Escrow> {
        self.flip_hold(order_id, actor_id, reason, EscrowStatus::OnHold, EscrowStatus::Locked)
            .await
    }

    async fn flip_hold(
        &self,
        order_id: &Uuid,
        actor_id: Uuid,
        reason: &str,
        from: EscrowStatus,
        to: EscrowStatus,
    ) -> ApiResult<Escrow> {
        let mut tx = self.db_pool.begin().await?;

        let before = lock_row(&mut tx, order_id).await?;
        if before.is_terminal() {
            return Err(ApiError::AlreadyReleased(format!(
                "Escrow for order {} is already settled",
                order_id
            )));
        }

        let updated = sqlx::query_as::<_, Escrow>(
            r#"
            UPDATE escrows
            SET status = $2, notes = $3, updated_at = $4
            WHERE order_id = $1 AND status = $5
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(to)
        .bind(reason)
        .bind(Utc::now())
        .bind(from)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!("Escrow for order {} is not {:?}", order_id, from))
        })?;

        audit::record(
            &mut *tx,
            actor_id,
            "ESCROW_HOLD_TOGGLE",
            "ESCROW",
            &updated.id.to_string(),
            Some(audit::snapshot(&before)),
            Some(audit::snapshot(&updated)),
            Some(json!({ "reason": reason })),
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Lock the escrow row for an order on the caller's transaction
    ///
    /// Dispute opening and resolution take this lock so their writes order
    /// against escrow settlement instead of racing a stale read.
    pub async fn lock_by_order_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: &Uuid,
    ) -> ApiResult<Escrow> {
        lock_row(tx, order_id).await
    }

    /// Auto-release on delivery confirmation
    ///
    /// Buyer confirmation implies release: a DELIVERED order with no open
    /// dispute pays the supplier without explicit finance action. An open or
    /// investigating dispute suppresses this until resolved, and a held
    /// entry stays held. The dispute check runs with the escrow row locked,
    /// so a dispute being opened concurrently either commits before the
    /// check sees it or waits until this decision has committed.
    pub async fn auto_release_on_delivery(
        &self,
        order_id: &Uuid,
        actor_id: Uuid,
    ) -> ApiResult<Option<Escrow>> {
        let mut tx = self.db_pool.begin().await?;

        let before = lock_row(&mut tx, order_id).await?;
        if before.is_terminal() {
            tracing::info!(order_id = %order_id, "Auto-release skipped; escrow already settled");
            return Ok(None);
        }

        let open_dispute: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM disputes
                WHERE order_id = $1 AND status IN ('open', 'investigating')
            )
            "#,
        )
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        if open_dispute {
            tracing::info!(order_id = %order_id, "Auto-release suppressed by open dispute");
            return Ok(None);
        }

        match self
            .release_in_tx(
                &mut tx,
                order_id,
                actor_id,
                "Auto-release on delivery confirmation",
                true,
            )
            .await
        {
            Ok(escrow) => {
                tx.commit().await?;
                tracing::info!(
                    order_id = %order_id,
                    amount = escrow.released_amount,
                    "Escrow auto-released to supplier"
                );
                Ok(Some(escrow))
            }
            // A held entry is not an error for the delivery path; finance
            // owns it from here.
            Err(ApiError::Conflict(_)) | Err(ApiError::AlreadyReleased(_)) => {
                tracing::info!(order_id = %order_id, "Auto-release skipped; escrow not locked");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Lock the escrow row for an order
async fn lock_row(tx: &mut Transaction<'_, Postgres>, order_id: &Uuid) -> ApiResult<Escrow> {
    sqlx::query_as::<_, Escrow>("SELECT * FROM escrows WHERE order_id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Escrow not found".to_string()))
}

/// Credit a user's withdrawable wallet balance
async fn credit_wallet(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO wallet_balances (user_id, balance, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id)
        DO UPDATE SET balance = wallet_balances.balance + EXCLUDED.balance, updated_at = $3
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

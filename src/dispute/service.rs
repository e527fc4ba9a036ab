//! Dispute service layer - investigation, recommendation, resolution
//!
//! Authority separation is a hard invariant here: OPS writes only the
//! recommendation fields, never escrow state. Resolution updates the dispute
//! and mutates escrow on one transaction; the conditional update on the
//! dispute status serializes racing resolution attempts.

use chrono::Utc;
use serde_json::json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use validator::Validate;

use crate::audit;
use crate::dispute::{
    AdminDisputeRequest, Dispute, DisputeAction, DisputeStatus, ListDisputesQuery,
    OpenDisputeRequest, RecommendRequest, ResolutionType,
};
use crate::error::{ApiError, ApiResult};
use crate::escrow::EscrowService;
use crate::middleware::AuthenticatedUser;
use crate::models::{Pagination, UserRole};

/// Dispute service for the resolution workflow
#[derive(Clone)]
pub struct DisputeService {
    db_pool: PgPool,
    escrow_service: EscrowService,
}

impl DisputeService {
    pub fn new(db_pool: PgPool, escrow_service: EscrowService) -> Self {
        Self {
            db_pool,
            escrow_service,
        }
    }

    /// Get a single dispute
    pub async fn get(&self, id: &Uuid) -> ApiResult<Option<Dispute>> {
        let dispute = sqlx::query_as::<_, Dispute>("SELECT * FROM disputes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(dispute)
    }

    /// List disputes with filtering and pagination
    pub async fn list(&self, query: ListDisputesQuery) -> ApiResult<Vec<Dispute>> {
        let (limit, offset) = Pagination {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut query_builder: sqlx::QueryBuilder<Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM disputes WHERE 1=1");

        if let Some(status) = query.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }
        if let Some(order_id) = query.order_id {
            query_builder.push(" AND order_id = ");
            query_builder.push_bind(order_id);
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let disputes = query_builder
            .build_query_as::<Dispute>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(disputes)
    }

    /// Open a dispute against an order
    ///
    /// The mere existence of an OPEN dispute suppresses escrow auto-release
    /// for the order until resolution.
    pub async fn open(
        &self,
        actor: &AuthenticatedUser,
        request: OpenDisputeRequest,
    ) -> ApiResult<Dispute> {
        if !matches!(actor.role, UserRole::Buyer | UserRole::Creator | UserRole::Ops) {
            return Err(ApiError::Forbidden(
                "Only the buyer or OPS can open a dispute".to_string(),
            ));
        }
        request.validate()?;

        let mut tx = self.db_pool.begin().await?;

        // Hold the escrow row while the dispute becomes visible; delivery
        // auto-release takes the same lock before its no-dispute check, so
        // one of the two always sees the other's committed write. Every
        // order carries an escrow row, so this doubles as the existence
        // check.
        self.escrow_service
            .lock_by_order_in_tx(&mut tx, &request.order_id)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => ApiError::NotFound("Order not found".to_string()),
                other => other,
            })?;

        let already_open: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM disputes
                WHERE order_id = $1 AND status IN ('open', 'investigating')
            )
            "#,
        )
        .bind(request.order_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_open {
            return Err(ApiError::Conflict(
                "An open dispute already exists for this order".to_string(),
            ));
        }

        let now = Utc::now();
        let dispute = sqlx::query_as::<_, Dispute>(
            r#"
            INSERT INTO disputes (
                id, order_id, raised_by, dispute_type, status, description,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'open', $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.order_id)
        .bind(actor.user_id)
        .bind(request.dispute_type)
        .bind(&request.description)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            dispute_id = %dispute.id,
            order_id = %dispute.order_id,
            dispute_type = ?dispute.dispute_type,
            "Dispute opened"
        );

        Ok(dispute)
    }

    /// OPS: move a dispute from OPEN to INVESTIGATING
    ///
    /// Idempotent no-op when already INVESTIGATING; any other target or
    /// source state is rejected.
    pub async fn mark_investigating(
        &self,
        id: &Uuid,
        actor: &AuthenticatedUser,
    ) -> ApiResult<Dispute> {
        if !matches!(actor.role, UserRole::Ops) {
            return Err(ApiError::Forbidden(
                "Only OPS can update dispute status".to_string(),
            ));
        }

        let dispute = self
            .get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Dispute not found".to_string()))?;

        match dispute.status {
            DisputeStatus::Investigating => return Ok(dispute),
            DisputeStatus::Open => {}
            _ => {
                return Err(ApiError::InvalidTransition(format!(
                    "Cannot investigate a dispute in state {:?}",
                    dispute.status
                )))
            }
        }

        let updated = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET status = 'investigating', updated_at = $2
            WHERE id = $1 AND status = 'open'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?
        // Zero rows means the status moved under us between read and write
        .ok_or_else(|| {
            ApiError::Conflict("Dispute status changed concurrently".to_string())
        })?;

        Ok(updated)
    }

    /// OPS: attach an advisory recommendation
    ///
    /// Stored as metadata only. No escrow field is touched on this path.
    pub async fn recommend(
        &self,
        id: &Uuid,
        actor: &AuthenticatedUser,
        request: RecommendRequest,
    ) -> ApiResult<Dispute> {
        if !matches!(actor.role, UserRole::Ops) {
            return Err(ApiError::Forbidden(
                "Only OPS can record recommendations".to_string(),
            ));
        }

        let dispute = self
            .get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Dispute not found".to_string()))?;

        if !dispute.is_open() {
            return Err(ApiError::AlreadyResolved(format!(
                "Dispute {} is already {:?}",
                id, dispute.status
            )));
        }

        let updated = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET ops_recommendation = $2, ops_notes = $3, updated_at = $4
            WHERE id = $1 AND status IN ('open', 'investigating')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.recommendation)
        .bind(&request.ops_notes)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::AlreadyResolved("Dispute was resolved concurrently".to_string())
        })?;

        tracing::info!(
            dispute_id = %id,
            recommendation = ?request.recommendation,
            "OPS recommendation recorded"
        );

        Ok(updated)
    }

    /// ADMIN/FINANCE_ADMIN: apply an admin action to a dispute
    pub async fn apply_admin_action(
        &self,
        id: &Uuid,
        actor: &AuthenticatedUser,
        request: AdminDisputeRequest,
    ) -> ApiResult<Dispute> {
        if !actor.role.can_resolve_disputes() {
            return Err(ApiError::Forbidden(
                "Only ADMIN or FINANCE_ADMIN can act on disputes".to_string(),
            ));
        }

        match request.action {
            DisputeAction::Investigate => self.admin_investigate(id, actor).await,
            DisputeAction::Resolve => {
                let resolution_type = request.resolution_type.ok_or_else(|| {
                    ApiError::BadRequest("Resolution type required".to_string())
                })?;
                self.resolve(
                    id,
                    actor,
                    resolution_type,
                    request.refund_amount,
                    request.supplier_penalty,
                    request.notes,
                )
                .await
            }
            DisputeAction::Close => self.close(id, actor).await,
        }
    }

    async fn admin_investigate(
        &self,
        id: &Uuid,
        actor: &AuthenticatedUser,
    ) -> ApiResult<Dispute> {
        let updated = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET status = 'investigating', updated_at = $2
            WHERE id = $1 AND status IN ('open', 'investigating')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::AlreadyResolved(format!("Dispute {} is already resolved", id))
        })?;

        tracing::info!(dispute_id = %id, admin = %actor.user_id, "Dispute under investigation");
        Ok(updated)
    }

    /// Resolve a dispute and settle its escrow atomically
    ///
    /// The dispute status change and the escrow mutation commit together or
    /// not at all; a resolved-but-unpaid or paid-but-unresolved state cannot
    /// be observed. `AlreadyResolved` on any re-entry.
    pub async fn resolve(
        &self,
        id: &Uuid,
        actor: &AuthenticatedUser,
        resolution_type: ResolutionType,
        refund_amount: Option<i64>,
        supplier_penalty: Option<i64>,
        notes: Option<String>,
    ) -> ApiResult<Dispute> {
        let before = self
            .get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Dispute not found".to_string()))?;

        if !before.is_open() {
            return Err(ApiError::AlreadyResolved(format!(
                "Dispute {} is already {:?}",
                id, before.status
            )));
        }

        if resolution_type == ResolutionType::PartialRefund && refund_amount.is_none() {
            return Err(ApiError::BadRequest(
                "Refund amount required for a partial refund".to_string(),
            ));
        }

        let resolved_status = resolution_type.resolved_status();
        let now = Utc::now();

        let mut tx = self.db_pool.begin().await?;

        // Conditional update serializes racing resolutions: exactly one
        // request moves the row out of the open states.
        let updated = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET status = $2,
                resolution_type = $3,
                resolution_notes = $4,
                refund_amount = $5,
                supplier_penalty = $6,
                resolved_by = $7,
                resolved_at = $8,
                updated_at = $8
            WHERE id = $1 AND status IN ('open', 'investigating')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(resolved_status)
        .bind(resolution_type)
        .bind(&notes)
        .bind(refund_amount)
        .bind(supplier_penalty)
        .bind(actor.user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ApiError::AlreadyResolved(format!("Dispute {} was resolved concurrently", id))
        })?;

        let note = notes.unwrap_or_else(|| format!("Dispute resolution: {:?}", resolution_type));

        let escrow = self
            .escrow_service
            .lock_by_order_in_tx(&mut tx, &updated.order_id)
            .await?;

        if escrow.is_terminal() {
            // Disputes raised after settlement (post-delivery quality
            // complaints) are resolved on the record only; the platform no
            // longer holds the money, so refund resolutions are rejected
            // rather than silently skipped.
            if resolution_type != ResolutionType::NoAction {
                return Err(ApiError::AlreadyReleased(format!(
                    "Escrow for order {} is already settled; resolve with no_action and handle any refund as a manual adjustment",
                    updated.order_id
                )));
            }
            tracing::info!(
                dispute_id = %id,
                order_id = %updated.order_id,
                "Escrow already settled; dispute resolved without fund movement"
            );
        } else {
            match resolution_type {
                ResolutionType::FullRefund => {
                    self.escrow_service
                        .refund_in_tx(
                            &mut tx,
                            &updated.order_id,
                            refund_amount,
                            false,
                            actor.user_id,
                            &note,
                        )
                        .await?;
                }
                ResolutionType::PartialRefund => {
                    // Refund the buyer and release the remainder to the supplier
                    self.escrow_service
                        .refund_in_tx(
                            &mut tx,
                            &updated.order_id,
                            refund_amount,
                            true,
                            actor.user_id,
                            &note,
                        )
                        .await?;
                }
                ResolutionType::NoAction => {
                    self.escrow_service
                        .release_in_tx(&mut tx, &updated.order_id, actor.user_id, &note, false)
                        .await?;
                }
            }
        }

        audit::record(
            &mut *tx,
            actor.user_id,
            "RESOLVE_DISPUTE",
            "DISPUTE",
            &id.to_string(),
            Some(audit::snapshot(&before)),
            Some(audit::snapshot(&updated)),
            Some(json!({
                "resolution_type": resolution_type,
                "refund_amount": refund_amount,
                "supplier_penalty": supplier_penalty,
            })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            dispute_id = %id,
            resolution = ?resolution_type,
            "Dispute resolved and escrow settled"
        );

        Ok(updated)
    }

    /// ADMIN: close a resolved dispute; CLOSED is terminal
    pub async fn close(&self, id: &Uuid, actor: &AuthenticatedUser) -> ApiResult<Dispute> {
        let before = self
            .get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Dispute not found".to_string()))?;

        if before.status == DisputeStatus::Closed {
            return Err(ApiError::AlreadyResolved(format!(
                "Dispute {} is already closed",
                id
            )));
        }
        if before.is_open() {
            return Err(ApiError::InvalidTransition(
                "Only a resolved dispute can be closed".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let updated = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes
            SET status = 'closed', updated_at = $2
            WHERE id = $1 AND status IN (
                'resolved_buyer_favor', 'resolved_supplier_favor', 'resolved_partial'
            )
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            ApiError::AlreadyResolved("Dispute was closed concurrently".to_string())
        })?;

        audit::record(
            &mut *tx,
            actor.user_id,
            "CLOSE_DISPUTE",
            "DISPUTE",
            &id.to_string(),
            Some(audit::snapshot(&before)),
            Some(audit::snapshot(&updated)),
            None,
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }
}

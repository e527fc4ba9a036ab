//! Append-only audit trail
//!
//! Every state-mutating core operation records who acted, what changed, and a
//! JSON before/after snapshot of the mutated row. Writers pass the executor
//! they are mutating on (usually an open transaction) so the audit entry and
//! the mutation commit together.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::Pagination;

/// A persisted audit trail entry
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Capture a JSON snapshot of a record for before/after comparison
pub fn snapshot<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Write an audit entry on the given executor
///
/// Callers mutating inside a transaction must pass that transaction here so
/// the mutation cannot commit without its audit record.
pub async fn record<'e, E>(
    executor: E,
    actor_id: Uuid,
    action: &str,
    target_type: &str,
    target_id: &str,
    before: Option<Value>,
    after: Option<Value>,
    metadata: Option<Value>,
) -> ApiResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, actor_id, action, target_type, target_id, before, after, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(actor_id)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(before)
    .bind(after)
    .bind(metadata)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}

/// Read side of the audit trail
pub struct AuditService {
    db_pool: PgPool,
}

impl AuditService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// List audit entries, newest first
    pub async fn list(
        &self,
        target_type: Option<String>,
        pagination: Pagination,
    ) -> ApiResult<Vec<AuditEntry>> {
        let (limit, offset) = pagination.resolve();

        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM audit_log WHERE 1=1");

        if let Some(target_type) = target_type {
            query_builder.push(" AND target_type = ");
            query_builder.push_bind(target_type);
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let entries = query_builder
            .build_query_as::<AuditEntry>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        amount: i64,
        status: &'static str,
    }

    #[test]
    fn test_snapshot_captures_fields() {
        let snap = snapshot(&Sample {
            amount: 2_500_000,
            status: "locked",
        });
        assert_eq!(snap["amount"], 2_500_000);
        assert_eq!(snap["status"], "locked");
    }
}

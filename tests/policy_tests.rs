//! Authorization and payout policy tests
//!
//! These run against services built on a lazy pool: every asserted rejection
//! fires before any query, so no database is needed.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use banadama_server::config::MarketplaceSettings;
use banadama_server::dispute::{AdminDisputeRequest, DisputeAction, DisputeService};
use banadama_server::earnings::{
    EarningsService, PayoutAction, PayoutActionRequest, ReverseEarningRequest, WithdrawRequest,
};
use banadama_server::error::ApiError;
use banadama_server::escrow::{EscrowAction, EscrowActionRequest, EscrowService};
use banadama_server::middleware::AuthenticatedUser;
use banadama_server::models::UserRole;
use banadama_server::order::{OrderService, ProductionStatus, ProductionStatusRequest};

fn lazy_pool() -> PgPool {
    PgPoolOptions::new()
        .connect_lazy("postgresql://localhost/banadama_test")
        .expect("lazy pool")
}

fn user(role: UserRole) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        role,
        email: None,
    }
}

fn earnings_service() -> EarningsService {
    EarningsService::new(lazy_pool(), MarketplaceSettings::default())
}

#[tokio::test]
async fn test_withdrawal_below_minimum_rejected() {
    let service = earnings_service();

    let err = service
        .request_withdrawal(
            &user(UserRole::GrowthAgent),
            WithdrawRequest { amount: 400_000 },
        )
        .await
        .unwrap_err();

    match err {
        ApiError::BelowMinimum { requested, minimum } => {
            assert_eq!(requested, 400_000);
            assert_eq!(minimum, 500_000);
        }
        other => panic!("expected BelowMinimum, got {:?}", other),
    }
}

#[tokio::test]
async fn test_withdrawal_requires_agent_role() {
    let service = earnings_service();

    let err = service
        .request_withdrawal(&user(UserRole::Buyer), WithdrawRequest { amount: 600_000 })
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn test_payout_decision_requires_finance_admin() {
    let service = earnings_service();

    // ADMIN can resolve disputes but cannot move payout money
    let err = service
        .apply_payout_action(
            &Uuid::new_v4(),
            &user(UserRole::Admin),
            PayoutActionRequest {
                action: PayoutAction::Approve,
                notes: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn test_reverse_earning_requires_admin() {
    let service = earnings_service();

    let err = service
        .reverse_earning(
            &Uuid::new_v4(),
            &user(UserRole::Ops),
            ReverseEarningRequest {
                reason: "fraud ring".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn test_reverse_earning_requires_reason() {
    let service = earnings_service();

    let err = service
        .reverse_earning(
            &Uuid::new_v4(),
            &user(UserRole::FinanceAdmin),
            ReverseEarningRequest {
                reason: "   ".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn test_escrow_action_requires_finance_admin() {
    let service = EscrowService::new(lazy_pool());

    for role in [UserRole::Ops, UserRole::Admin, UserRole::Buyer] {
        let err = service
            .apply_action(
                &Uuid::new_v4(),
                EscrowActionRequest {
                    action: EscrowAction::Release,
                    amount: None,
                    reason: "manual release".to_string(),
                    release_remainder: false,
                },
                &user(role),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Forbidden(_)), "role {:?}", role);
    }
}

#[tokio::test]
async fn test_escrow_partial_action_requires_amount() {
    let service = EscrowService::new(lazy_pool());

    let err = service
        .apply_action(
            &Uuid::new_v4(),
            EscrowActionRequest {
                action: EscrowAction::PartialRefund,
                amount: None,
                reason: "split decision".to_string(),
                release_remainder: true,
            },
            &user(UserRole::FinanceAdmin),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::ValidationError(_)));
}

#[tokio::test]
async fn test_ops_cannot_resolve_disputes() {
    let pool = lazy_pool();
    let service = DisputeService::new(pool.clone(), EscrowService::new(pool));

    let err = service
        .apply_admin_action(
            &Uuid::new_v4(),
            &user(UserRole::Ops),
            AdminDisputeRequest {
                action: DisputeAction::Resolve,
                resolution_type: None,
                refund_amount: None,
                supplier_penalty: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn test_production_update_requires_supplier_or_factory() {
    let pool = lazy_pool();
    let escrow = EscrowService::new(pool.clone());
    let earnings = EarningsService::new(pool.clone(), MarketplaceSettings::default());
    let service = OrderService::new(pool, escrow, earnings);

    let err = service
        .advance_production(
            &Uuid::new_v4(),
            &user(UserRole::Buyer),
            ProductionStatusRequest {
                status: ProductionStatus::InProduction,
                note: None,
                produced_quantity: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Forbidden(_)));
}

//! End-to-end workflow tests against a live database
//!
//! Run with a scratch Postgres and `cargo test -- --ignored`:
//! `TEST_DATABASE_URL=postgresql://localhost/banadama_test`

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use banadama_server::config::MarketplaceSettings;
use banadama_server::db;
use banadama_server::dispute::{
    DisputeService, DisputeType, OpenDisputeRequest, OpsRecommendation, RecommendRequest,
    ResolutionType,
};
use banadama_server::earnings::{
    EarningStatus, EarningType, EarningsService, PayoutAction, PayoutActionRequest, PayoutStatus,
    ReverseEarningRequest, WithdrawRequest,
};
use banadama_server::error::ApiError;
use banadama_server::escrow::{EscrowService, EscrowStatus};
use banadama_server::middleware::AuthenticatedUser;
use banadama_server::models::UserRole;
use banadama_server::order::{
    CreateOrderRequest, Order, OrderService, ProductionStatus, ProductionStatusRequest,
    ShipmentStatus, ShipmentStatusRequest,
};

struct TestContext {
    pool: PgPool,
    orders: OrderService,
    escrow: EscrowService,
    disputes: DisputeService,
    earnings: EarningsService,
}

async fn setup() -> TestContext {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/banadama_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    db::run_migrations(&pool).await.expect("migrations");

    let escrow = EscrowService::new(pool.clone());
    let earnings = EarningsService::new(pool.clone(), MarketplaceSettings::default());
    let orders = OrderService::new(pool.clone(), escrow.clone(), earnings.clone());
    let disputes = DisputeService::new(pool.clone(), escrow.clone());

    TestContext {
        pool,
        orders,
        escrow,
        disputes,
        earnings,
    }
}

fn user(role: UserRole) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        role,
        email: None,
    }
}

async fn create_order(ctx: &TestContext, buyer: &AuthenticatedUser, amount: i64) -> Order {
    ctx.orders
        .create_order(
            buyer,
            CreateOrderRequest {
                supplier_id: Uuid::new_v4(),
                product_name: "Shea butter, 25kg drums".to_string(),
                quantity: 40,
                total_amount: amount,
            },
        )
        .await
        .expect("order creation")
}

async fn deliver(ctx: &TestContext, ops: &AuthenticatedUser, order_id: &Uuid) {
    for status in [
        ShipmentStatus::PickedUp,
        ShipmentStatus::InTransit,
        ShipmentStatus::OutForDelivery,
        ShipmentStatus::Delivered,
    ] {
        ctx.orders
            .advance_shipment(
                order_id,
                ops,
                ShipmentStatusRequest {
                    status,
                    note: None,
                },
            )
            .await
            .expect("shipment advance");
    }
}

async fn wallet_balance(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COALESCE(balance, 0) FROM wallet_balances WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .expect("wallet query")
        .unwrap_or(0)
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_delivery_auto_releases_escrow() {
    let ctx = setup().await;
    let buyer = user(UserRole::Buyer);
    let ops = user(UserRole::Ops);

    let order = create_order(&ctx, &buyer, 2_500_000).await;

    let escrow = ctx.escrow.get_by_order(&order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Locked);
    assert_eq!(escrow.locked_amount, 2_500_000);

    deliver(&ctx, &ops, &order.id).await;

    let escrow = ctx.escrow.get_by_order(&order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Released);
    assert_eq!(escrow.released_amount, 2_500_000);
    assert_eq!(
        wallet_balance(&ctx.pool, order.supplier_id).await,
        2_500_000
    );
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_release_happens_at_most_once() {
    let ctx = setup().await;
    let buyer = user(UserRole::Buyer);
    let ops = user(UserRole::Ops);
    let finance = user(UserRole::FinanceAdmin);

    let order = create_order(&ctx, &buyer, 1_000_000).await;
    deliver(&ctx, &ops, &order.id).await;

    let err = ctx
        .escrow
        .release(&order.id, finance.user_id, "manual re-release", false)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AlreadyReleased(_)));

    // Supplier was paid exactly once
    assert_eq!(
        wallet_balance(&ctx.pool, order.supplier_id).await,
        1_000_000
    );
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_production_rejects_stage_skip() {
    let ctx = setup().await;
    let buyer = user(UserRole::Buyer);

    let order = create_order(&ctx, &buyer, 800_000).await;

    // Production is supplier-scoped; act as the order's supplier
    let supplier = AuthenticatedUser {
        user_id: order.supplier_id,
        role: UserRole::Supplier,
        email: None,
    };

    let err = ctx
        .orders
        .advance_production(
            &order.id,
            &supplier,
            ProductionStatusRequest {
                status: ProductionStatus::QualityCheck,
                note: None,
                produced_quantity: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidTransition(_)));

    // The single forward step still works
    let production = ctx
        .orders
        .advance_production(
            &order.id,
            &supplier,
            ProductionStatusRequest {
                status: ProductionStatus::InProduction,
                note: Some("line started".to_string()),
                produced_quantity: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(production.status, ProductionStatus::InProduction);
    assert!(production.actual_start_date.is_some());
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_open_dispute_suppresses_auto_release() {
    let ctx = setup().await;
    let buyer = user(UserRole::Buyer);
    let ops = user(UserRole::Ops);
    let admin = user(UserRole::Admin);

    let order = create_order(&ctx, &buyer, 2_500_000).await;

    ctx.disputes
        .open(
            &buyer,
            OpenDisputeRequest {
                order_id: order.id,
                dispute_type: DisputeType::QualityIssue,
                description: "Half the drums arrived rancid".to_string(),
            },
        )
        .await
        .unwrap();

    deliver(&ctx, &ops, &order.id).await;

    // Delivery completed but funds stayed locked
    let escrow = ctx.escrow.get_by_order(&order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Locked);
    assert_eq!(wallet_balance(&ctx.pool, order.supplier_id).await, 0);

    let dispute = ctx
        .disputes
        .list(banadama_server::dispute::ListDisputesQuery {
            status: None,
            order_id: Some(order.id),
            page: None,
            limit: None,
        })
        .await
        .unwrap()
        .remove(0);

    ctx.disputes
        .resolve(
            &dispute.id,
            &admin,
            ResolutionType::FullRefund,
            None,
            None,
            Some("Verified spoilage".to_string()),
        )
        .await
        .unwrap();

    let escrow = ctx.escrow.get_by_order(&order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Refunded);
    assert_eq!(escrow.refunded_amount, 2_500_000);
    assert_eq!(wallet_balance(&ctx.pool, order.buyer_id).await, 2_500_000);

    // Second resolution attempt is rejected
    let err = ctx
        .disputes
        .resolve(&dispute.id, &admin, ResolutionType::NoAction, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AlreadyResolved(_)));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_ops_recommendation_never_moves_funds() {
    let ctx = setup().await;
    let buyer = user(UserRole::Buyer);
    let ops = user(UserRole::Ops);

    let order = create_order(&ctx, &buyer, 1_200_000).await;
    let dispute = ctx
        .disputes
        .open(
            &buyer,
            OpenDisputeRequest {
                order_id: order.id,
                dispute_type: DisputeType::WrongItem,
                description: "Received groundnut oil instead of shea".to_string(),
            },
        )
        .await
        .unwrap();

    ctx.disputes
        .mark_investigating(&dispute.id, &ops)
        .await
        .unwrap();

    let updated = ctx
        .disputes
        .recommend(
            &dispute.id,
            &ops,
            RecommendRequest {
                recommendation: OpsRecommendation::RefundBuyer,
                ops_notes: Some("Photos confirm wrong product".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        updated.ops_recommendation,
        Some(OpsRecommendation::RefundBuyer)
    );

    // Advisory only: escrow untouched, nobody paid
    let escrow = ctx.escrow.get_by_order(&order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Locked);
    assert_eq!(escrow.released_amount, 0);
    assert_eq!(escrow.refunded_amount, 0);
    assert_eq!(wallet_balance(&ctx.pool, order.buyer_id).await, 0);
    assert_eq!(wallet_balance(&ctx.pool, order.supplier_id).await, 0);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_withdrawal_reserve_and_reject_cycle() {
    let ctx = setup().await;
    let agent = user(UserRole::GrowthAgent);
    let finance = user(UserRole::FinanceAdmin);
    let supplier_ref = Uuid::new_v4();

    let earning = ctx
        .earnings
        .record_earning(
            agent.user_id,
            EarningType::Onboard,
            600_000,
            Some(supplier_ref),
            None,
            1,
        )
        .await
        .unwrap();
    assert_eq!(earning.status, EarningStatus::Pending);

    // A qualifying completed order unlocks the commission
    ctx.earnings
        .on_qualifying_order_completed(&supplier_ref)
        .await
        .unwrap();

    let info = ctx.earnings.withdrawal_info(&agent.user_id).await.unwrap();
    assert_eq!(info.available_balance, 600_000);
    assert_eq!(info.minimum_payout, 500_000);

    let payout = ctx
        .earnings
        .request_withdrawal(&agent, WithdrawRequest { amount: 500_000 })
        .await
        .unwrap();
    // Settlement is earning-granular: the whole covering earning is reserved
    assert_eq!(payout.amount, 600_000);
    assert_eq!(payout.status, PayoutStatus::PendingFinance);

    // Reserved earnings leave the withdrawable balance
    let info = ctx.earnings.withdrawal_info(&agent.user_id).await.unwrap();
    assert_eq!(info.available_balance, 0);
    assert_eq!(info.pending_payouts.len(), 1);

    // Rejection returns the earnings to UNLOCKED
    ctx.earnings
        .apply_payout_action(
            &payout.id,
            &finance,
            PayoutActionRequest {
                action: PayoutAction::Reject,
                notes: Some("bank details mismatch".to_string()),
            },
        )
        .await
        .unwrap();

    let info = ctx.earnings.withdrawal_info(&agent.user_id).await.unwrap();
    assert_eq!(info.available_balance, 600_000);

    // A decided payout cannot be decided again
    let err = ctx
        .earnings
        .apply_payout_action(
            &payout.id,
            &finance,
            PayoutActionRequest {
                action: PayoutAction::Approve,
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_reversed_earning_is_terminal() {
    let ctx = setup().await;
    let agent = user(UserRole::GrowthAgent);
    let finance = user(UserRole::FinanceAdmin);

    let earning = ctx
        .earnings
        .record_earning(agent.user_id, EarningType::OrderCommission, 75_000, None, None, 1)
        .await
        .unwrap();

    let reversed = ctx
        .earnings
        .reverse_earning(
            &earning.id,
            &finance,
            ReverseEarningRequest {
                reason: "self-dealing pattern".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reversed.status, EarningStatus::Reversed);

    let err = ctx
        .earnings
        .reverse_earning(
            &earning.id,
            &finance,
            ReverseEarningRequest {
                reason: "again".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidTransition(_)));

    // Reversed amounts never reappear in the withdrawable balance
    let info = ctx.earnings.withdrawal_info(&agent.user_id).await.unwrap();
    assert_eq!(info.available_balance, 0);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_resolve_after_auto_release_records_outcome() {
    let ctx = setup().await;
    let buyer = user(UserRole::Buyer);
    let ops = user(UserRole::Ops);
    let admin = user(UserRole::Admin);

    let order = create_order(&ctx, &buyer, 1_500_000).await;
    deliver(&ctx, &ops, &order.id).await;

    let escrow = ctx.escrow.get_by_order(&order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Released);

    // Post-delivery quality complaint against a settled escrow
    let dispute = ctx
        .disputes
        .open(
            &buyer,
            OpenDisputeRequest {
                order_id: order.id,
                dispute_type: DisputeType::QualityIssue,
                description: "Moisture damage found after unpacking".to_string(),
            },
        )
        .await
        .unwrap();

    // The money is gone, so refund resolutions are rejected outright
    let err = ctx
        .disputes
        .resolve(&dispute.id, &admin, ResolutionType::FullRefund, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AlreadyReleased(_)));

    // The failed attempt must not strand the dispute
    let still_open = ctx.disputes.get(&dispute.id).await.unwrap().unwrap();
    assert!(still_open.is_open());

    // No-action resolution records the outcome without moving funds
    let resolved = ctx
        .disputes
        .resolve(
            &dispute.id,
            &admin,
            ResolutionType::NoAction,
            None,
            None,
            Some("Damage occurred after delivery".to_string()),
        )
        .await
        .unwrap();
    assert!(!resolved.is_open());

    let escrow = ctx.escrow.get_by_order(&order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Released);
    assert_eq!(
        wallet_balance(&ctx.pool, order.supplier_id).await,
        1_500_000
    );
    assert_eq!(wallet_balance(&ctx.pool, order.buyer_id).await, 0);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_concurrent_dispute_open_and_delivery_settles_once() {
    let ctx = setup().await;
    let buyer = user(UserRole::Buyer);
    let ops = user(UserRole::Ops);
    let admin = user(UserRole::Admin);

    let order = create_order(&ctx, &buyer, 2_000_000).await;

    // Race the buyer's dispute against the final delivery scan
    let open_fut = ctx.disputes.open(
        &buyer,
        OpenDisputeRequest {
            order_id: order.id,
            dispute_type: DisputeType::QualityIssue,
            description: "Seals broken on arrival".to_string(),
        },
    );
    let deliver_fut = deliver(&ctx, &ops, &order.id);

    let (open_res, _) = tokio::join!(open_fut, deliver_fut);
    let dispute = open_res.expect("dispute opens in either ordering");

    // Whichever side won the escrow row lock, the outcome is consistent:
    // funds still held with the dispute blocking them, or already paid out
    let escrow = ctx.escrow.get_by_order(&order.id).await.unwrap().unwrap();
    match escrow.status {
        EscrowStatus::Locked => {
            assert_eq!(wallet_balance(&ctx.pool, order.supplier_id).await, 0);
        }
        EscrowStatus::Released => {
            assert_eq!(
                wallet_balance(&ctx.pool, order.supplier_id).await,
                2_000_000
            );
        }
        other => panic!("unexpected escrow state {:?}", other),
    }

    // Either way the dispute can be driven to a resolution
    let resolved = match ctx
        .disputes
        .resolve(&dispute.id, &admin, ResolutionType::FullRefund, None, None, None)
        .await
    {
        Ok(d) => d,
        Err(ApiError::AlreadyReleased(_)) => ctx
            .disputes
            .resolve(&dispute.id, &admin, ResolutionType::NoAction, None, None, None)
            .await
            .unwrap(),
        Err(e) => panic!("resolution failed: {:?}", e),
    };
    assert!(!resolved.is_open());

    // Money moved exactly once in total
    let total = wallet_balance(&ctx.pool, order.supplier_id).await
        + wallet_balance(&ctx.pool, order.buyer_id).await;
    assert_eq!(total, 2_000_000);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_idempotent_status_repost_is_a_noop() {
    let ctx = setup().await;
    let buyer = user(UserRole::Buyer);
    let ops = user(UserRole::Ops);

    let order = create_order(&ctx, &buyer, 900_000).await;

    ctx.orders
        .advance_shipment(
            &order.id,
            &ops,
            ShipmentStatusRequest {
                status: ShipmentStatus::PickedUp,
                note: None,
            },
        )
        .await
        .unwrap();

    // Re-posting the current status succeeds and changes nothing
    let shipment = ctx
        .orders
        .advance_shipment(
            &order.id,
            &ops,
            ShipmentStatusRequest {
                status: ShipmentStatus::PickedUp,
                note: Some("duplicate webhook".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::PickedUp);
    assert_eq!(shipment.events.as_array().unwrap().len(), 1);
}

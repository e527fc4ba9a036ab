//! Growth/affiliate earnings and payout handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::earnings::{
    Earning, OnboardSupplierRequest, Payout, PayoutActionRequest, ReverseEarningRequest,
    WithdrawRequest, WithdrawalInfo,
};
use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

/// List the acting agent's earnings
pub async fn list_my_earnings(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Earning>>> {
    let earnings = app_state
        .earnings_service
        .list_for_agent(&user.user_id)
        .await?;

    Ok(Json(earnings))
}

/// Balance, minimum, and pending payouts for the withdrawal screen
pub async fn withdrawal_info(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<WithdrawalInfo>> {
    let info = app_state
        .earnings_service
        .withdrawal_info(&user.user_id)
        .await?;

    Ok(Json(info))
}

/// Request a withdrawal of unlocked earnings
pub async fn request_withdrawal(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<WithdrawRequest>,
) -> ApiResult<(StatusCode, Json<Payout>)> {
    let payout = app_state
        .earnings_service
        .request_withdrawal(&user, request)
        .await?;

    Ok((StatusCode::CREATED, Json(payout)))
}

/// Growth agent onboards a supplier
pub async fn onboard_supplier(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<OnboardSupplierRequest>,
) -> ApiResult<(StatusCode, Json<Earning>)> {
    let earning = app_state
        .earnings_service
        .onboard_supplier(&user, request)
        .await?;

    Ok((StatusCode::CREATED, Json(earning)))
}

/// Finance decision on a payout
pub async fn payout_action(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<PayoutActionRequest>,
) -> ApiResult<Json<Payout>> {
    let payout = app_state
        .earnings_service
        .apply_payout_action(&id, &user, request)
        .await?;

    Ok(Json(payout))
}

/// Reverse an earning for fraud or clawback
pub async fn reverse_earning(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ReverseEarningRequest>,
) -> ApiResult<Json<Earning>> {
    let earning = app_state
        .earnings_service
        .reverse_earning(&id, &user, request)
        .await?;

    Ok(Json(earning))
}

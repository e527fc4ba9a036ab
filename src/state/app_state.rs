//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::audit::AuditService;
use crate::dispute::DisputeService;
use crate::earnings::EarningsService;
use crate::escrow::EscrowService;
use crate::middleware::AuthConfig;
use crate::order::OrderService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub order_service: Arc<OrderService>,
    pub escrow_service: Arc<EscrowService>,
    pub dispute_service: Arc<DisputeService>,
    pub earnings_service: Arc<EarningsService>,
    pub audit_service: Arc<AuditService>,
    pub auth_config: AuthConfig,
}

impl AppState {
    pub fn new(
        order_service: Arc<OrderService>,
        escrow_service: Arc<EscrowService>,
        dispute_service: Arc<DisputeService>,
        earnings_service: Arc<EarningsService>,
        audit_service: Arc<AuditService>,
        auth_config: AuthConfig,
    ) -> Self {
        Self {
            order_service,
            escrow_service,
            dispute_service,
            earnings_service,
            audit_service,
            auth_config,
        }
    }
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_config.clone()
    }
}

impl FromRef<AppState> for Arc<OrderService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.order_service.clone()
    }
}

impl FromRef<AppState> for Arc<EscrowService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.escrow_service.clone()
    }
}

impl FromRef<AppState> for Arc<DisputeService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.dispute_service.clone()
    }
}

impl FromRef<AppState> for Arc<EarningsService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.earnings_service.clone()
    }
}

impl FromRef<AppState> for Arc<AuditService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.audit_service.clone()
    }
}

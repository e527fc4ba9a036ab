//! Shared models for the Banadama marketplace core

use serde::{Deserialize, Serialize};

/// Marketplace roles carried in access tokens
///
/// Every core operation takes the acting user (and thus the role) as an
/// explicit argument; authorization is a checked precondition, never
/// ambient state.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Buyer,
    Supplier,
    Factory,
    Creator,
    Affiliate,
    GrowthAgent,
    Ops,
    FinanceAdmin,
    Admin,
}

impl UserRole {
    /// Parse a role from its token claim representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUYER" => Some(UserRole::Buyer),
            "SUPPLIER" => Some(UserRole::Supplier),
            "FACTORY" => Some(UserRole::Factory),
            "CREATOR" => Some(UserRole::Creator),
            "AFFILIATE" => Some(UserRole::Affiliate),
            "GROWTH_AGENT" => Some(UserRole::GrowthAgent),
            "OPS" => Some(UserRole::Ops),
            "FINANCE_ADMIN" => Some(UserRole::FinanceAdmin),
            "ADMIN" => Some(UserRole::Admin),
            _ => None,
        }
    }

    /// Get the role name as used in token claims
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Buyer => "BUYER",
            UserRole::Supplier => "SUPPLIER",
            UserRole::Factory => "FACTORY",
            UserRole::Creator => "CREATOR",
            UserRole::Affiliate => "AFFILIATE",
            UserRole::GrowthAgent => "GROWTH_AGENT",
            UserRole::Ops => "OPS",
            UserRole::FinanceAdmin => "FINANCE_ADMIN",
            UserRole::Admin => "ADMIN",
        }
    }

    /// Roles allowed to move escrowed funds
    pub fn can_move_funds(&self) -> bool {
        matches!(self, UserRole::FinanceAdmin)
    }

    /// Roles allowed to finalize dispute resolutions
    pub fn can_resolve_disputes(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::FinanceAdmin)
    }

    /// Roles allowed to post production updates
    pub fn can_update_production(&self) -> bool {
        matches!(self, UserRole::Supplier | UserRole::Factory)
    }
}

/// Pagination query parameters shared by list endpoints
#[derive(Debug, Deserialize, Default)]
pub struct Pagination {
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

impl Pagination {
    /// Resolve to a (limit, offset) pair with sane bounds
    ///
    /// Widened to i64 before multiplying; `page` is caller-supplied and
    /// `(page - 1) * limit` overflows i32.
    pub fn resolve(&self) -> (i64, i64) {
        let page = i64::from(self.page.unwrap_or(1).max(1));
        let limit = i64::from(self.limit.unwrap_or(20).clamp(1, 100));
        let offset = (page - 1) * limit;
        (limit, offset)
    }
}

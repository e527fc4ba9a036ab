//! Growth/affiliate earnings domain module
//!
//! Commission records stay PENDING behind a fraud-prevention unlock tied to
//! real order activity, then become withdrawable through finance-approved
//! payouts.

mod model;
mod service;

pub use model::*;
pub use service::EarningsService;

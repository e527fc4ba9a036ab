//! Dispute domain module
//!
//! Buyer complaints against an order. OPS investigates and recommends;
//! only ADMIN/FINANCE_ADMIN resolutions move escrowed funds.

mod model;
mod service;

pub use model::*;
pub use service::DisputeService;

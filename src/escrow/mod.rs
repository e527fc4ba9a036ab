//! Escrow domain module
//!
//! Platform-held funds for an order, released to the supplier or refunded to
//! the buyer only under the conditions enforced by `EscrowService`.

mod model;
mod service;

pub use model::*;
pub use service::EscrowService;

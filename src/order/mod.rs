//! Order domain module
//!
//! Orders, their production and logistics tracks, and the state machine
//! that keeps the escrow ledger consistent with the order's outcome.

mod model;
mod service;

pub use model::*;
pub use service::OrderService;

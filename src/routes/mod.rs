//! Route definitions

mod audit;
mod dispute;
mod earnings;
mod escrow;
mod order;

pub use audit::audit_routes;
pub use dispute::dispute_routes;
pub use earnings::earnings_routes;
pub use escrow::escrow_routes;
pub use order::order_routes;

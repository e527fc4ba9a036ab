//! API handlers
//!
//! Handlers stay thin: extract the acting user, hand the request to the
//! owning service, and map the result through `ApiError`. Role checks live
//! in the services, next to the state they guard.

mod audit;
mod dispute;
mod earnings;
mod escrow;
mod order;

pub use audit::*;
pub use dispute::*;
pub use earnings::*;
pub use escrow::*;
pub use order::*;

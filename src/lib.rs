//! Banadama Marketplace Core
//!
//! Backend server for the Banadama B2B marketplace: order lifecycle and
//! escrow settlement, dispute resolution, and growth/affiliate earnings.

pub mod audit;
pub mod config;
pub mod db;
pub mod dispute;
pub mod earnings;
pub mod error;
pub mod escrow;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod order;
pub mod routes;
pub mod state;

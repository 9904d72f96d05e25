//! Multi-gateway payment core for the mandi marketplace.
//!
//! PayU, SabPaisa and Airpay V4 adapters sign outbound payment requests and
//! authenticate callbacks; the orchestrator applies verified callbacks to
//! orders exactly once.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;

//! HTTP handlers for the gateway.

pub mod admin;
pub mod metrics;
pub mod org;
pub mod user;

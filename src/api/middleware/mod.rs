//! API Middleware Module
//!
//! Provides authentication, rate limiting, and usage tracking middleware
//! for the tutoring API.

pub mod auth;
pub mod rate_limit;
pub mod service;
pub mod usage;

pub use auth::ClientExt;
pub use service::{GatewayContext, GatewayMiddleware};
pub use usage::with_cost;

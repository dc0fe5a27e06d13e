//! Quota-aware rate limiting for calls to the remote service.
//!
//! The remote service enforces three rolling budgets at once. This module
//! tracks all of them in sliding windows and makes callers wait until a call
//! fits into every budget.
//!
//! - [`RateLimiter`]: the three-window gate
//! - [`RateLimitConfig`]: budgets of a limiter
//! - [`estimate_tokens`]: cost estimate callers pass into the gate

mod config;
mod estimate;
mod limiter;
mod window;

pub use config::{DEFAULT_RPD_LIMIT, DEFAULT_RPM_LIMIT, DEFAULT_TPM_BUDGET, RateLimitConfig};
pub use estimate::estimate_tokens;
pub use limiter::{Gate, RateLimiter, RateUsage};

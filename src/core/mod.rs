//! Core gateway components

pub mod cache;
pub mod cost;
pub mod gateway;
pub mod health;
pub mod rate_limit;
pub mod retry;
pub mod router;
pub mod streaming;
pub mod traits;
pub mod types;

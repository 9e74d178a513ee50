//! Floodgate - Request Rate Limiting Service
//!
//! This crate implements a fixed-window request rate limiter behind an HTTP
//! decision API. Counters are keyed by `prefix:identity` strings and advanced
//! through a single atomic store operation, so the limiter itself holds no
//! shared state and can run in any number of processes against the same
//! backing store. Store failures degrade to fail-open: availability is
//! prioritized over strict enforcement.

pub mod config;
pub mod error;
pub mod http;
pub mod limiter;
pub mod store;

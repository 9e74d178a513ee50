//! HTTP server module: the decision API and the consumer-facing adapter.

pub mod middleware;
mod routes;
mod server;

pub use routes::{router, AppState};
pub use server::HttpServer;

//! HTTP surface of the service.
//!
//! - `routes`: axum router and per-route async glue
//! - `handlers`: the blocking handlers the routes dispatch to
//! - `error`: mapping of dispatch outcomes onto HTTP statuses

pub mod error;
pub mod handlers;
pub mod routes;

//! PostProof Server Library - REST API components for post timestamping
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;

pub use config::Config;
pub use db::PgRecordStore;
pub use error::ApiError;
pub use fetcher::{HttpContentFetcher, UnconfiguredFetcher};
pub use openapi::ApiDoc;
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;

//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod sweep;
pub mod timestamps;
pub mod verify;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use sweep::{maturation_sweep_handler, SweepResponse};
pub use timestamps::{
    create_timestamp_handler, get_proof_handler, get_timestamp_handler, CreateTimestampRequest,
    TimestampResponse,
};
pub use verify::{
    record_attestation_handler, verify_content_handler, verify_proof_handler,
    verify_record_handler, AttestationResponse, VerifyContentRequest, VerifyProofRequest,
    VerifyResponse,
};

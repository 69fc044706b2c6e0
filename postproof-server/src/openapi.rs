//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 document for the PostProof API.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::{
    AttestationResponse, CreateTimestampRequest, HealthResponse, ReadyResponse, SweepResponse,
    TimestampResponse, VerifyContentRequest, VerifyProofRequest, VerifyResponse,
};

/// PostProof API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "PostProof API",
        version = "0.1.0",
        description = r#"
## Proof-of-existence for social media posts

PostProof fingerprints a captured post and timestamps the fingerprint on a public chain:

- **Bitcoin** through OpenTimestamps calendar servers (matures in hours)
- **Solana** memo transactions (matures in seconds)

### How It Works

1. **Timestamp** a post via `POST /api/v1/timestamps`
2. Calendar records start `pending`; a periodic sweep upgrades them to `confirmed`
3. **Download** the proof via `GET /api/v1/timestamps/{id}/proof`; calendar proofs are standard `.ots` files
4. **Verify** later via `POST /api/v1/verify`: the live post is re-fetched and classified as
   `verified`, `modified` (with a similarity score) or `deleted`

Engagement counters (likes, reposts, replies, views) are captured but never fingerprinted.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Timestamps", description = "Submit posts for timestamping and download proofs"),
        (name = "Verification", description = "Drift checks against the live post and independent proof checks"),
        (name = "Maturation", description = "Background upgrade of pending proofs"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::timestamps::create_timestamp_handler,
        crate::handlers::timestamps::get_timestamp_handler,
        crate::handlers::timestamps::get_proof_handler,
        crate::handlers::verify::verify_record_handler,
        crate::handlers::verify::verify_content_handler,
        crate::handlers::verify::record_attestation_handler,
        crate::handlers::verify::verify_proof_handler,
        crate::handlers::sweep::maturation_sweep_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            CreateTimestampRequest,
            TimestampResponse,
            VerifyContentRequest,
            VerifyResponse,
            VerifyProofRequest,
            AttestationResponse,
            SweepResponse,
        )
    ),
    modifiers(&CronSecurity)
)]
pub struct ApiDoc;

/// Registers the bearer scheme guarding the sweep trigger.
struct CronSecurity;

impl Modify for CronSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cron_secret",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

//! Tollgate Gateway - HTTP admission layer
//!
//! This crate wraps an `axum` router with distributed rate limiting backed by
//! `tollgate-core`.
//!
//! # Features
//!
//! - **Admission middleware** — one credit per request, 429 with `Retry-After` when empty
//! - **Rate limit headers** — `X-RateLimit-Limit`, `X-RateLimit-Remaining`, `X-RateLimit-Reset`
//! - **Identity extraction** — organization, user or client IP keys
//! - **Introspection** — read-only bucket status and policy listing
//!
//! # Architecture
//!
//! ```text
//! tollgate-gateway/
//! └── presentation/     # HTTP layer
//!     ├── controllers/  # Health and rate limit handlers
//!     ├── middleware.rs # Identity extraction, admission
//!     ├── models.rs     # DTOs with OpenAPI schemas
//!     └── routes.rs     # Router and layer stack
//! ```
//!
//! # API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/v1/rate-limit/status` | GET | Caller's bucket under a policy (`?limit_type=`) |
//! | `/api/v1/rate-limit/policies` | GET | Configured policy table |
//! | `/health` | GET | Health check |
//! | `/api-docs/openapi.json` | GET | OpenAPI document |

pub mod presentation;

pub use presentation::{AppState, create_router};

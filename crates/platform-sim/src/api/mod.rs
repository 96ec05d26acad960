//! HTTP API of the mock GPU platform
//!
//! # Endpoints
//!
//! - `POST /api/v1/auth/login` - exchange credentials for an access token
//! - `GET /api/v1/auth/verify?token=` - check a token
//! - `POST /api/v1/gpu/instances` - create an instance (202)
//! - `GET /api/v1/gpu/instances?status=&region=` - list own instances
//! - `GET /api/v1/gpu/instances/:id` - instance details with current metrics
//! - `DELETE /api/v1/gpu/instances/:id` - terminate an instance
//! - `POST /api/v1/jobs` - submit a job (201)
//! - `GET /api/v1/jobs/:id` - job status and progress
//! - `GET /api/v1/metrics?instance_id=&minutes=` - synthetic telemetry
//! - `GET /health` - service statistics
//!
//! # Authentication
//!
//! Everything except login, verify and health expects
//! ```text
//! Authorization: Bearer <access_token>
//! ```
//!
//! Errors are JSON bodies of the form
//! `{"error": "quota_exceeded", "message": "...", "available_units": 2}`.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod server;

pub use errors::ApiError;
pub use server::routes;
pub use server::ApiServer;

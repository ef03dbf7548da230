//! HTTP entry point.
//!
//! Exposes `POST /v1/exec` and a `GET /healthz` probe. Execution failures
//! are HTTP 200 with `ok = false`; non-2xx is reserved for malformed
//! requests and queue overflow (503).

mod handler;

pub use handler::{AppState, router, serve};

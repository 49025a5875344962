//! HTTP command surface for the command process.
//!
//! Every calibration operation maps 1:1 onto a `CalCommand`, so the HTTP
//! layer stays a thin adapter: deserialize, dispatch, wrap the reply.

mod routes;

pub use routes::{build_router, run_http_server, ApiState};

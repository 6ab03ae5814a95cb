//! REST API surface.

pub mod routes;

pub use routes::{api_routes, ApiState};

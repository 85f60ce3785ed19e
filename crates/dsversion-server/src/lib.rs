//! HTTP server for dsversion.
//!
//! Serves the versioned download redirect and a JSON API over the
//! versioning services.

pub mod routes;
pub mod state;

pub use routes::{create_router, ACTING_USER_HEADER};
pub use state::AppState;

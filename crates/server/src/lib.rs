//! HTTP server for the speech pipeline

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;

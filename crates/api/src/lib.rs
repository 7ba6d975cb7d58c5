//! HTTP surface of the ingestion worker: health probes and metrics scrape.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;

//! HTTP request handlers for the Supervision API.

pub mod health;
pub mod metrics;
pub mod verify;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use verify::verify;

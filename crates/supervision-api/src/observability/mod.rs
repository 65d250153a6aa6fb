//! Observability module for the Supervision API.
//!
//! Provides metrics definitions and the recorder setup.

pub mod metrics;

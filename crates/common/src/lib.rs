//! Common utilities and types shared across the supervision services.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, header parsing, time claims)
pub mod jwt;

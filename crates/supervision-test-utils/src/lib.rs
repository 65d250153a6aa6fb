//! # Supervision Test Utilities
//!
//! Shared test utilities for the Supervision API.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed RSA and Ed25519 keys)
//! - Token builders for signing arbitrary claim sets
//! - A wiremock-backed JWKS endpoint (MockJwksServer)
//! - Server test harness (TestSupervisionServer for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use supervision_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = RsaFixture::primary();
//!     let jwks = MockJwksServer::start(vec![key.jwk_json()]).await;
//!     let server = TestSupervisionServer::spawn(&jwks.url()).await?;
//!
//!     let token = TokenBuilder::new()
//!         .issuer(TEST_ISSUER)
//!         .audience(TEST_AUDIENCE)
//!         .scope("read:student")
//!         .sign_rs256(&key);
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use server_harness::*;
pub use token_builders::*;

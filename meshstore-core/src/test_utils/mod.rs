//! Test utilities and helpers for meshstore
//!
//! Fixtures for payloads, registries and keys, plus async helpers for event
//! subscriptions. Used by unit tests, integration tests and benches.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;

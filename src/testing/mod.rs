//! Testing utilities and mock implementations
//!
//! Exported so integration tests can drive agents and the orchestrator
//! without a real LLM provider.

pub mod mocks;

pub use mocks::*;

//! Integration tests for testsmith
//!
//! Run with: cargo test --features integration
//!
//! Harness tests need `python -m pytest` (or `python3`). Pipeline tests
//! also need a model endpoint, configured with environment variables:
//!   TESTSMITH_ENDPOINT - API endpoint (default: http://localhost:11434/v1)
//!   TESTSMITH_MODEL - Model name (default: qwen2.5-coder:7b)
//!   TESTSMITH_MODEL_TIMEOUT - Per-call timeout in seconds (default: 300)
//!   TESTSMITH_SKIP_SLOW - Set to "1" to skip slow tests

mod harness_tests;

pub use helpers::*;

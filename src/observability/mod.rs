//! Observability
//!
//! Tracing setup and log hygiene helpers shared by the generator, the
//! runner and the CLI.

pub mod telemetry;

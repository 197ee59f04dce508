//! Unit tests for testsmith modules
//!
//! These tests cover components across module boundaries without network
//! I/O or a Python install. Collaborators are scripted.

mod helpers;
mod test_cli;
mod test_config;
mod test_error_paths;
mod test_generator;
mod test_runner;
mod test_validator;

//! Testsmith - LLM-driven web test generation with a self-correction loop
//!
//! Turns test cases and captured page elements into a Playwright + pytest
//! file, then validates it, optionally runs it, and feeds the concrete
//! failures back to the model until it passes or the retry budget runs out.
//!
//! - **Locators**: ranked, deterministic locator choice per element
//! - **Validation**: structural syntax check plus advisory anti-pattern lint
//! - **Execution**: disposable workspace, bounded harness run, parsed report
//! - **Fallback**: model-free template so a result is always produced
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use testsmith::{api::ApiClient, generator::{GenerationRequest, Generator}, Config};
//!
//! let config = Config::load(None)?;
//! let llm = Arc::new(ApiClient::new(&config)?);
//! let generator = Generator::from_config(llm, &config)?;
//! let outcome = generator.generate(&GenerationRequest {
//!     url: "https://example.com",
//!     suite_name: "Smoke",
//!     cases: &cases,
//!     elements: &elements,
//! }).await;
//! println!("{}", outcome.code);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

// ─── Collaborators & configuration ────────────────────────────────
pub mod api;
pub mod config;
pub mod errors;
pub mod observability;

// ─── Inputs ───────────────────────────────────────────────────────
pub mod page;
pub mod testcase;

// ─── Analysis ─────────────────────────────────────────────────────
pub mod locator;
pub mod syntax;
pub mod validator;

// ─── Generation & execution ───────────────────────────────────────
pub mod designer;
pub mod extract;
pub mod generator;
pub mod prompt;
pub mod runner;

// ─── Front end ────────────────────────────────────────────────────
pub mod cli;

pub use config::Config;
pub use errors::{Result, TestsmithError};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Ask running generations to stop at their next state boundary.
pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

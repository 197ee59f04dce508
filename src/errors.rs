use std::path::PathBuf;
use thiserror::Error;

/// The central error type for testsmith.
///
/// Only the application edges (CLI, config loading, model transport) surface
/// these as `Err`. The generation core converts every failure into data
/// (issue lists, execution logs, fallback code) before it reaches a caller.
#[derive(Error, Debug)]
pub enum TestsmithError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API Request timed out")]
    Timeout,

    #[error("Rate limit exceeded. Retry after {retry_after_secs:?} seconds")]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model returned an empty completion")]
    EmptyCompletion,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to prepare test workspace: {0}")]
    Workspace(String),

    #[error("Failed to start harness '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("Test execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Harness failed: {0}")]
    Harness(String),

    #[error("Test file not found: {path}")]
    MissingFile { path: PathBuf },
}

/// Why a model reply could not be turned into a test file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("model reply was empty")]
    Empty,

    #[error("extracted code is too short ({len} chars, need at least {min})")]
    TooShort { len: usize, min: usize },

    #[error("reply does not look like source code (no import, def or class)")]
    NotCode,
}

pub type Result<T> = std::result::Result<T, TestsmithError>;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_INPUT_ERROR: u8 = 3;
pub const EXIT_API_ERROR: u8 = 4;
pub const EXIT_TESTS_FAILED: u8 = 5;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<TestsmithError>() {
        return match err {
            TestsmithError::Config(_) => EXIT_CONFIG_ERROR,
            TestsmithError::Input(_) => EXIT_INPUT_ERROR,
            TestsmithError::Api(_) => EXIT_API_ERROR,
            _ => EXIT_ERROR,
        };
    }

    // Direct enum unwraps fallback
    if e.downcast_ref::<ApiError>().is_some() {
        return EXIT_API_ERROR;
    }

    // String matching fallback for anyhow contexts from config loading
    let msg = e.to_string().to_lowercase();
    if msg.contains("config") {
        return EXIT_CONFIG_ERROR;
    }

    EXIT_ERROR
}

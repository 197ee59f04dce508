//! Telemetry & Observability
//!
//! Provides structured logging and tracing for generation runs.
//! Features:
//! - Collaborator call spans (model, harness) with timing and outcome
//! - Self-correction state transition logging
//! - Configurable log levels via RUST_LOG
//! - Control-character sanitising and secret redaction for logged text

use regex::Regex;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maximum characters of model or harness text echoed into a single log line.
pub const MAX_LOGGED_CHARS: usize = 200;

/// Sanitize a string for safe log output by escaping control characters.
/// Prevents log injection where model output embeds newlines to forge entries.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x1b' => out.push_str("\\e"),
            '\x00' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

/// Compiled regex patterns for secret redaction.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            // API keys: sk-..., key-..., token-..., hf_... followed by alphanumeric chars
            Regex::new(r"(?i)(sk-|key-|token-|hf_)[A-Za-z0-9_\-]{8,}").expect("invalid secret regex"),
            // Bearer tokens in Authorization headers
            Regex::new(r"(?i)Bearer\s+[A-Za-z0-9_\-\.]{8,}").expect("invalid bearer regex"),
            // Passwords in connection strings or generated fill() calls
            Regex::new(r"(?i)(password|passwd|pwd)\s*=\s*\S+").expect("invalid password regex"),
        ]
    })
}

/// Redact sensitive data patterns from a string before logging.
pub fn redact_secrets(input: &str) -> String {
    let mut result = input.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}

/// Sanitize, redact and shorten free text (model replies, harness output)
/// so it fits on one log line.
pub fn loggable(text: &str) -> String {
    let clipped: String = text.chars().take(MAX_LOGGED_CHARS).collect();
    let mut out = redact_secrets(&sanitize_for_log(&clipped));
    if text.chars().count() > MAX_LOGGED_CHARS {
        out.push_str("...");
    }
    out
}

/// Initialize global tracing subscriber.
/// Only enables output when RUST_LOG is set, keeping CLI output clean.
pub fn init_tracing() {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        init_tracing_with_filter(&filter);
    }
}

/// Initialize tracing for verbose mode
pub fn init_tracing_verbose() {
    init_tracing_with_filter("testsmith=debug,info")
}

/// Initialize with custom filter string
pub fn init_tracing_with_filter(filter: &str) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_level(true)
            .compact()
            .with_writer(std::io::stderr);

        let filter_layer = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// Run a collaborator call inside a span, recording duration and outcome.
pub async fn track_call<F, Fut, T, E>(collaborator: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let span = info_span!(
        "collaborator.call",
        collaborator = collaborator,
        duration_ms = tracing::field::Empty,
        success = tracing::field::Empty,
    );

    let result = f().instrument(span.clone()).await;
    let duration = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration);
    let _enter = span.enter();
    match &result {
        Ok(_) => {
            span.record("success", true);
            info!(duration_ms = duration, "{} call completed", collaborator);
        }
        Err(e) => {
            span.record("success", false);
            warn!(
                duration_ms = duration,
                error = loggable(&e.to_string()).as_str(),
                "{} call failed",
                collaborator
            );
        }
    }
    result
}

/// Record a self-correction state transition
pub fn record_state_transition(from: &str, to: &str) {
    info!(from = from, to = to, "Generation state transition");
}

/// Initialize tracing for tests with a simple subscriber
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

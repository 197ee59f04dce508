//! Code extraction from model replies.
//!
//! Replies arrive as bare code, markdown with one or more fenced blocks, or
//! reasoning-model output with `<think>` sections. The result must look like
//! Python source before the orchestrator spends a validation cycle on it.

use regex::Regex;
use std::sync::OnceLock;

use crate::api::types::Completion;
use crate::errors::ExtractionError;

/// Replies shorter than this are not a usable test file.
pub const MIN_CODE_CHARS: usize = 100;

static THINK_BLOCK: OnceLock<Regex> = OnceLock::new();
static FENCE: OnceLock<Regex> = OnceLock::new();
static CODE_KEYWORD: OnceLock<Regex> = OnceLock::new();

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid extraction regex"))
}

/// Remove `<think>...</think>` sections, including an unterminated trailing one.
pub fn strip_think_blocks(text: &str) -> String {
    let think = re(&THINK_BLOCK, r"(?s)<think>.*?(?:</think>|\z)");
    think.replace_all(text, "").into_owned()
}

/// Pick the code out of a markdown reply: a `python`/`py` fence wins, else
/// the longest fence, else the whole text with stray fence lines dropped.
pub fn strip_fences(text: &str) -> String {
    let fence = re(&FENCE, r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```");

    let mut python: Option<&str> = None;
    let mut longest: Option<&str> = None;
    for caps in fence.captures_iter(text) {
        let lang = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let Some(body) = caps.get(2).map(|m| m.as_str()) else {
            continue;
        };
        if python.is_none() && (lang == "python" || lang == "py" || lang == "python3") {
            python = Some(body);
        }
        if longest.map_or(true, |l| body.len() > l.len()) {
            longest = Some(body);
        }
    }

    if let Some(body) = python.or(longest) {
        return body.trim_matches('\n').trim_end().to_string();
    }

    // Unterminated fence or bare code.
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn looks_like_code(code: &str) -> bool {
    re(
        &CODE_KEYWORD,
        r"(?m)^\s*(?:import\s+\w|from\s+[\w.]+\s+import\b|def\s+\w+\s*\(|class\s+\w+)",
    )
    .is_match(code)
}

/// Extract source code from raw reply text.
pub fn extract_code(text: &str) -> Result<String, ExtractionError> {
    let without_think = strip_think_blocks(text);
    if without_think.trim().is_empty() {
        return Err(ExtractionError::Empty);
    }

    let code = strip_fences(&without_think);
    if code.is_empty() {
        return Err(ExtractionError::Empty);
    }
    if code.chars().count() < MIN_CODE_CHARS {
        return Err(ExtractionError::TooShort {
            len: code.chars().count(),
            min: MIN_CODE_CHARS,
        });
    }
    if !looks_like_code(&code) {
        return Err(ExtractionError::NotCode);
    }
    Ok(code)
}

/// Extract source code from any completion shape.
pub fn extract_from_completion(completion: &Completion) -> Result<String, ExtractionError> {
    match completion.text() {
        Some(text) => extract_code(text),
        None => Err(ExtractionError::Empty),
    }
}

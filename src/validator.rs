//! Code Validator
//!
//! Static checks on a generated test file. Only the syntax check decides
//! `ok`; anti-pattern and completeness findings are advisory and end up in
//! the repair prompt. Validation never fails or panics: every problem is
//! reported as an issue string.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::syntax::{self, SyntaxError};
use crate::testcase::{snake_case, TestCase};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Syntax result only.
    pub ok: bool,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_error: Option<SyntaxError>,
}

impl ValidationReport {
    /// Valid syntax and nothing to complain about.
    pub fn is_clean(&self) -> bool {
        self.ok && self.issues.is_empty()
    }

    /// Mark the report invalid; the syntax issue leads the list.
    pub fn record_syntax_error(&mut self, err: SyntaxError) {
        self.ok = false;
        self.issues.insert(0, format!("Syntax error at {}", err));
        self.syntax_error = Some(err);
    }
}

/// Run all checks against `code`.
pub fn validate(code: &str, cases: &[TestCase]) -> ValidationReport {
    let mut report = ValidationReport {
        ok: true,
        ..Default::default()
    };

    if let Err(e) = syntax::check(code) {
        report.record_syntax_error(e);
    }

    report.issues.extend(check_anti_patterns(code));
    report.issues.extend(check_completeness(code, cases));
    report
}

static RAW_ACTION: OnceLock<Regex> = OnceLock::new();
static HARD_SLEEP: OnceLock<Regex> = OnceLock::new();
static WAIT_FOR_NAV: OnceLock<Regex> = OnceLock::new();
static GOTO: OnceLock<Regex> = OnceLock::new();
static ANY_WAIT: OnceLock<Regex> = OnceLock::new();
static CLASS_DEF: OnceLock<Regex> = OnceLock::new();
static METHOD_DEF: OnceLock<Regex> = OnceLock::new();

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid validator regex"))
}

/// Advisory findings: raw page actions, hard-coded delays, deprecated
/// navigation waits, navigation with no wait at all, and `Test*` class
/// methods pytest will not collect.
pub fn check_anti_patterns(code: &str) -> Vec<String> {
    let raw_action = re(
        &RAW_ACTION,
        r"\bpage\.(click|fill|type|check|uncheck|hover|dblclick|press|select_option)\(",
    );
    let hard_sleep = re(&HARD_SLEEP, r"\btime\.sleep\(|\.wait_for_timeout\(");
    let wait_for_nav = re(&WAIT_FOR_NAV, r"\.wait_for_navigation\(|\bexpect_navigation\(");

    let mut issues = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let lineno = idx + 1;
        let content = line.split('#').next().unwrap_or("");
        if let Some(caps) = raw_action.captures(content) {
            issues.push(format!(
                "Line {}: raw page.{}() call; act through a locator (e.g. page.get_by_role(...).{}())",
                lineno, &caps[1], &caps[1]
            ));
        }
        if hard_sleep.is_match(content) {
            issues.push(format!(
                "Line {}: hard-coded delay; wait for a condition with expect() or wait_for_load_state() instead",
                lineno
            ));
        }
        if wait_for_nav.is_match(content) {
            issues.push(format!(
                "Line {}: deprecated navigation wait; use expect(page).to_have_url(...) or page.wait_for_url()",
                lineno
            ));
        }
    }

    let navigates = re(&GOTO, r"\.goto\(").is_match(code);
    let waits = re(
        &ANY_WAIT,
        r"\.wait_for_load_state\(|\.wait_for_url\(|\.wait_for_selector\(|\bexpect\(",
    )
    .is_match(code);
    if navigates && !waits {
        issues.push(
            "Navigation without an explicit wait; add wait_for_load_state() or an expect() assertion after goto()"
                .to_string(),
        );
    }

    issues.extend(check_test_method_names(code));
    issues
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn check_test_method_names(code: &str) -> Vec<String> {
    let class_def = re(&CLASS_DEF, r"^(\s*)class\s+([A-Za-z_][A-Za-z0-9_]*)");
    let method_def = re(&METHOD_DEF, r"^(\s*)(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(");

    let mut issues = Vec::new();
    // (class indent, class name, body indent once known)
    let mut current: Option<(usize, String, Option<usize>)> = None;
    let mut prev_decorator: Option<String> = None;

    for line in code.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = indent_of(line);

        if let Some((class_indent, _, _)) = &current {
            if indent <= *class_indent {
                current = None;
            }
        }

        if let Some(caps) = class_def.captures(line) {
            let name = caps[2].to_string();
            if name.starts_with("Test") {
                current = Some((indent, name, None));
            }
            prev_decorator = None;
            continue;
        }

        if let Some((_, class_name, body_indent)) = current.as_mut() {
            let body = *body_indent.get_or_insert(indent);
            if indent == body {
                if let Some(caps) = method_def.captures(line) {
                    let method = &caps[2];
                    let is_fixture = prev_decorator
                        .as_deref()
                        .is_some_and(|d| d.contains("fixture"));
                    let exempt = method.starts_with("test_")
                        || method.starts_with('_')
                        || is_fixture;
                    if !exempt {
                        issues.push(format!(
                            "Method '{}' in class {} is not collected by pytest; prefix test methods with test_",
                            method, class_name
                        ));
                    }
                }
            }
        }

        prev_decorator = if trimmed.starts_with('@') {
            Some(trimmed.to_string())
        } else {
            None
        };
    }
    issues
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "page", "test", "verify",
    "check", "should", "when", "then",
];

fn significant_words(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Best-effort check that each test case shows up in the code. A heuristic
/// signal for the repair prompt, never a gate.
pub fn check_completeness(code: &str, cases: &[TestCase]) -> Vec<String> {
    if !code.contains("def test_") {
        return vec!["No test methods (def test_...) found in the generated code".to_string()];
    }

    let lower = code.to_lowercase();
    let mut issues = Vec::new();
    for tc in cases {
        let snake = snake_case(&tc.name);
        let name_lower = tc.name.to_lowercase();
        if (!snake.is_empty() && lower.contains(&snake))
            || (!name_lower.trim().is_empty() && lower.contains(name_lower.trim()))
        {
            continue;
        }
        let words = significant_words(&tc.name);
        if !words.is_empty() {
            let needed = words.len().min(2);
            let present = words.iter().filter(|w| lower.contains(w.as_str())).count();
            if present >= needed {
                continue;
            }
        }
        issues.push(format!(
            "Test case {} '{}' does not appear to be implemented",
            tc.id, tc.name
        ));
    }
    issues
}

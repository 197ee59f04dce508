//! Test case records and the free-text test-case parser.
//!
//! Model-designed test cases arrive as loosely formatted text
//! (`Test 1: ...`, `### Test Case 2`, ...). The parser is lenient about
//! layout but guarantees contiguous ids starting at 1.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

const MAX_NAME_CHARS: usize = 100;
const MAX_TEXT_CHARS: usize = 300;
const MAX_STEPS: usize = 15;
const DEFAULT_EXPECTED: &str = "Test should complete successfully";
const DEFAULT_DESCRIPTION: &str = "Test case generated from page analysis";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(alias = "high", alias = "HIGH")]
    High,
    #[default]
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "low", alias = "LOW")]
    Low,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "High"),
            Priority::Medium => write!(f, "Medium"),
            Priority::Low => write!(f, "Low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, alias = "expected")]
    pub expected_outcome: String,
    #[serde(default)]
    pub priority: Priority,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
            expected_outcome: DEFAULT_EXPECTED.to_string(),
            priority: Priority::Medium,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_outcome = expected.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn dedup_key(&self) -> (String, String) {
        (
            self.name.to_lowercase(),
            self.steps
                .first()
                .map(|s| s.to_lowercase())
                .unwrap_or_default(),
        )
    }
}

/// Assign ids 1..=n in order.
pub fn renumber(cases: &mut [TestCase]) {
    for (idx, tc) in cases.iter_mut().enumerate() {
        tc.id = idx as u32 + 1;
    }
}

/// Drop repeats by (name, first step), case-insensitively, then renumber.
pub fn dedup(cases: Vec<TestCase>) -> Vec<TestCase> {
    let mut seen = HashSet::new();
    let mut unique: Vec<TestCase> = Vec::with_capacity(cases.len());
    for tc in cases {
        if seen.insert(tc.dedup_key()) {
            unique.push(tc);
        } else {
            debug!(name = %tc.name, "Skipping duplicate test case");
        }
    }
    renumber(&mut unique);
    unique
}

/// Returned when no test case can be recovered from model output.
pub fn placeholder_cases() -> Vec<TestCase> {
    vec![
        TestCase {
            id: 1,
            name: "Header Presence".into(),
            description: "Auto-generated test case".into(),
            steps: vec!["Navigate to page".into(), "Verify header exists".into()],
            expected_outcome: "Header element is visible".into(),
            priority: Priority::Medium,
        },
        TestCase {
            id: 2,
            name: "Footer Presence".into(),
            description: "Auto-generated test case".into(),
            steps: vec!["Navigate to page".into(), "Verify footer exists".into()],
            expected_outcome: "Footer element is visible".into(),
            priority: Priority::Medium,
        },
    ]
}

static BLOCK_START: OnceLock<Regex> = OnceLock::new();
static NAME_RE: OnceLock<Regex> = OnceLock::new();
static DESC_UNTIL_STEPS: OnceLock<Regex> = OnceLock::new();
static DESC_RE: OnceLock<Regex> = OnceLock::new();
static STEPS_RE: OnceLock<Regex> = OnceLock::new();
static EXPECTED_RE: OnceLock<Regex> = OnceLock::new();
static PRIORITY_TAIL: OnceLock<Regex> = OnceLock::new();
static PRIORITY_RE: OnceLock<Regex> = OnceLock::new();
static STEP_BULLET: OnceLock<Regex> = OnceLock::new();
static STEP_LABEL: OnceLock<Regex> = OnceLock::new();
static STEPS_TAIL: OnceLock<Regex> = OnceLock::new();

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid test-case regex"))
}

/// Parse model-written test cases.
///
/// Blocks start at `Test N` / `### Test Case N` headers. Missing fields fall
/// back to defaults; cases duplicated by (name, first step) are dropped and
/// ids renumbered. When nothing parses, [`placeholder_cases`] is returned.
pub fn parse_test_cases(text: &str) -> Vec<TestCase> {
    debug!(chars = text.len(), "Parsing test cases");
    let starts: Vec<usize> = re(&BLOCK_START, r"(?i)(?:Test|###)\s*(?:Case)?\s*#?\d+")
        .find_iter(text)
        .map(|m| m.start())
        .collect();

    let mut bounds = Vec::with_capacity(starts.len() + 1);
    if starts.first() != Some(&0) {
        bounds.push(0);
    }
    bounds.extend(starts.iter().copied());
    bounds.push(text.len());

    let mut cases = Vec::new();
    for window in bounds.windows(2) {
        let block = &text[window[0]..window[1]];
        if block.trim().is_empty() || block.len() < 20 {
            continue;
        }
        if let Some(tc) = parse_block(block) {
            cases.push(tc);
        }
    }

    let cases = dedup(cases);
    debug!(count = cases.len(), "Parsed unique test cases");
    if cases.is_empty() {
        return placeholder_cases();
    }
    cases
}

fn parse_block(block: &str) -> Option<TestCase> {
    let name_caps = re(
        &NAME_RE,
        r"(?i:(?:Test|###)\s*(?:Case)?\s*#?)(\d+):?\s*[:\-]?\s*(.+?)(?:\n|Description|Steps)",
    )
    .captures(block)?;
    let name = name_caps[2]
        .trim()
        .trim_end_matches(':')
        .trim_matches('*')
        .replace("\\n", "")
        .trim()
        .to_string();
    if name.is_empty() {
        return None;
    }

    let description = re(&DESC_UNTIL_STEPS, r"(?is)(?:Description|Desc):?\s*(.+?)Steps:")
        .captures(block)
        .or_else(|| {
            re(
                &DESC_RE,
                r"(?is)(?:Description|Desc):?\s*(.+?)(?:\n\s*(?:Expected|Priority)|$)",
            )
            .captures(block)
        })
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
    let description = flatten(&description);
    let description = re(&STEPS_TAIL, r"(?is)Steps:.*$")
        .replace(&description, "")
        .trim()
        .to_string();

    let steps_text = re(
        &STEPS_RE,
        r"(?is)Steps:\s*(.+?)(?:\n\s*(?:Expected|Priority)|$)",
    )
    .captures(block)
    .map(|c| c[1].trim().replace("\\n", "\n"))
    .unwrap_or_default();

    let mut steps: Vec<String> = steps_text
        .lines()
        .map(clean_step)
        .filter(|line| line.chars().count() > 5)
        .filter(|line| !re(&STEP_LABEL, r"(?i)^(Expected|Priority):").is_match(line))
        .take(MAX_STEPS)
        .collect();
    if steps.is_empty() {
        let first_sentence = description.split('.').next().unwrap_or("").trim();
        steps.push("Navigate to the page".to_string());
        if !first_sentence.is_empty() {
            steps.push(first_sentence.to_string());
        }
    }

    let expected = re(&EXPECTED_RE, r"(?is)Expected:?\s*(.+)")
        .captures(block)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let expected = re(&PRIORITY_TAIL, r"(?is)\s*Priority:.*$").replace(&expected, "");
    let expected = flatten(&expected)
        .trim_matches(|c| c == '"' || c == '\'' || c == ' ')
        .to_string();
    let expected = if expected.chars().count() < 5 {
        DEFAULT_EXPECTED.to_string()
    } else {
        expected
    };

    let priority = re(&PRIORITY_RE, r"(?i)Priority:?\s*(High|Medium|Low)")
        .captures(block)
        .and_then(|c| Priority::parse(&c[1]))
        .unwrap_or_default();

    Some(TestCase {
        id: 0,
        name: truncate(&name, MAX_NAME_CHARS),
        description: truncate(&description, MAX_TEXT_CHARS).trim().to_string(),
        steps,
        expected_outcome: truncate(&expected, MAX_TEXT_CHARS),
        priority,
    })
}

fn flatten(s: &str) -> String {
    s.replace("\\n", " ").replace('\n', " ").trim().to_string()
}

fn clean_step(line: &str) -> String {
    let line = line.trim();
    let line = re(&STEP_BULLET, r"^[-*•\d+.)\]]+\s*").replace(line, "");
    line.trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Lowercase identifier form of a test name: runs of non-alphanumerics
/// become a single `_`, trimmed at both ends.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Render cases as a numbered list for prompts.
pub fn format_for_prompt(cases: &[TestCase]) -> String {
    let mut out = String::new();
    for tc in cases {
        out.push_str(&format!("Test {}: {}\n", tc.id, tc.name));
        if !tc.description.is_empty() {
            out.push_str(&format!("  Description: {}\n", tc.description));
        }
        if !tc.steps.is_empty() {
            out.push_str("  Steps:\n");
            for (i, step) in tc.steps.iter().enumerate() {
                out.push_str(&format!("    {}. {}\n", i + 1, step));
            }
        }
        out.push_str(&format!("  Expected: {}\n", tc.expected_outcome));
        out.push_str(&format!("  Priority: {}\n\n", tc.priority));
    }
    out.trim_end().to_string()
}

/// Load test cases from a file: a JSON array, a JSON object with a
/// `test_cases` field, or free text. Ids are renumbered on load.
pub fn load_test_cases(path: &Path) -> anyhow::Result<Vec<TestCase>> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read test cases from {}", path.display()))?;
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        let value: serde_json::Value =
            serde_json::from_str(&content).context("Test case file is not valid JSON")?;
        let list = match value {
            serde_json::Value::Object(mut map) => map
                .remove("test_cases")
                .context("JSON object has no `test_cases` field")?,
            other => other,
        };
        let cases: Vec<TestCase> =
            serde_json::from_value(list).context("Failed to parse test cases")?;
        return Ok(dedup(cases));
    }
    Ok(parse_test_cases(&content))
}

//! Harness report parsing.
//!
//! Turns the harness's textual output into a [`TestExecutionLog`]. The
//! parser sits behind [`ReportParser`] so the harness can switch to a
//! structured report without touching the orchestrator.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Max characters kept from a failure's message line.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Raw result of one harness invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub return_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Error,
    Skipped,
}

impl TestOutcome {
    fn from_status(status: &str) -> Option<Self> {
        match status {
            "PASSED" | "XPASS" => Some(TestOutcome::Passed),
            "FAILED" => Some(TestOutcome::Failed),
            "ERROR" => Some(TestOutcome::Error),
            "SKIPPED" | "XFAIL" => Some(TestOutcome::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub outcome: TestOutcome,
    pub duration_secs: f64,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub error_line: Option<u32>,
}

impl TestResult {
    pub fn new(name: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            name: name.into(),
            passed: outcome == TestOutcome::Passed,
            outcome,
            duration_secs: 0.0,
            error_type: None,
            error_message: None,
            error_line: None,
        }
    }

    fn is_problem(&self) -> bool {
        matches!(self.outcome, TestOutcome::Failed | TestOutcome::Error)
    }
}

/// Aggregate of one execution attempt. Never merged across attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestExecutionLog {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub duration_secs: f64,
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
    pub results: Vec<TestResult>,
    /// Explanation when the run degraded (timeout, crash, nothing parsed).
    pub message: Option<String>,
}

impl TestExecutionLog {
    /// A run that produced no usable report.
    pub fn harness_failure(message: impl Into<String>, output: HarnessOutput, duration_secs: f64) -> Self {
        Self {
            errors: 1,
            duration_secs,
            stdout: output.stdout,
            stderr: output.stderr,
            return_code: output.return_code,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Always the sum of the four status buckets.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors + self.skipped
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    /// `passed / total`, 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.passed as f64 / total as f64
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.is_problem())
    }

    /// Structured failure evidence for a repair prompt, bounded to `budget`
    /// characters.
    pub fn failure_summary(&self, budget: usize) -> String {
        let mut lines = vec![format!(
            "{} passed, {} failed, {} errors, {} skipped (exit code {})",
            self.passed,
            self.failed,
            self.errors,
            self.skipped,
            self.return_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".into())
        )];
        if let Some(msg) = &self.message {
            lines.push(format!("Harness: {}", msg));
        }
        let mut structured = false;
        for result in self.failures() {
            structured = true;
            let mut line = format!(
                "- {}: {}",
                result.name,
                result.error_type.as_deref().unwrap_or("UnknownError")
            );
            if let Some(msg) = &result.error_message {
                line.push_str(&format!(": {}", msg));
            }
            if let Some(n) = result.error_line {
                line.push_str(&format!(" (line {})", n));
            }
            lines.push(line);
        }
        if !structured && !self.all_passed() {
            let tail = output_tail(&self.stdout, &self.stderr, 15);
            if !tail.is_empty() {
                lines.push("Output tail:".into());
                lines.push(tail);
            }
        }
        clip(&lines.join("\n"), budget)
    }
}

fn output_tail(stdout: &str, stderr: &str, max_lines: usize) -> String {
    let combined: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = combined.len().saturating_sub(max_lines);
    combined[start..].join("\n")
}

/// Cut `text` to `budget` characters, marking the cut.
pub fn clip(text: &str, budget: usize) -> String {
    const MARK: &str = "\n... (truncated)";
    if text.chars().count() <= budget {
        return text.to_string();
    }
    if budget <= MARK.len() {
        return text.chars().take(budget).collect();
    }
    let mut out: String = text.chars().take(budget - MARK.len()).collect();
    out.push_str(MARK);
    out
}

/// Swappable harness-report parser.
pub trait ReportParser: Send + Sync {
    fn parse(&self, output: &HarnessOutput) -> TestExecutionLog;
}

/// Parser for `pytest -v --tb=short --durations=0` text output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PytestTextParser;

static RESULT_LINE: OnceLock<Regex> = OnceLock::new();
static SUMMARY_LINE: OnceLock<Regex> = OnceLock::new();
static SUMMARY_COUNT: OnceLock<Regex> = OnceLock::new();
static DURATION_LINE: OnceLock<Regex> = OnceLock::new();
static SECTION_RULE: OnceLock<Regex> = OnceLock::new();
static BLOCK_HEADER: OnceLock<Regex> = OnceLock::new();
static E_EXCEPTION: OnceLock<Regex> = OnceLock::new();
static BARE_EXCEPTION: OnceLock<Regex> = OnceLock::new();
static E_ASSERT: OnceLock<Regex> = OnceLock::new();
static SOURCE_LINE: OnceLock<Regex> = OnceLock::new();
static TRAILER: OnceLock<Regex> = OnceLock::new();

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid report regex"))
}

fn short_name(node_id: &str) -> String {
    node_id.rsplit("::").next().unwrap_or(node_id).to_string()
}

impl ReportParser for PytestTextParser {
    fn parse(&self, output: &HarnessOutput) -> TestExecutionLog {
        let text = &output.stdout;
        let mut log = TestExecutionLog {
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            return_code: output.return_code,
            ..Default::default()
        };

        let result_line = re(
            &RESULT_LINE,
            r"(?m)^(?:\S+?::)*(\S+?)\s+(PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)\b",
        );
        let mut index: HashMap<String, usize> = HashMap::new();
        for caps in result_line.captures_iter(text) {
            let name = short_name(&caps[1]);
            if index.contains_key(&name) {
                continue;
            }
            let Some(outcome) = TestOutcome::from_status(&caps[2]) else {
                continue;
            };
            match outcome {
                TestOutcome::Passed => log.passed += 1,
                TestOutcome::Failed => log.failed += 1,
                TestOutcome::Error => log.errors += 1,
                TestOutcome::Skipped => log.skipped += 1,
            }
            index.insert(name.clone(), log.results.len());
            log.results.push(TestResult::new(name, outcome));
        }

        let summary = re(
            &SUMMARY_LINE,
            r"(?m)^=+ (.+?) in ([0-9]+(?:\.[0-9]+)?)s(?: \([^)]*\))? =+\s*$",
        )
        .captures_iter(text)
        .last();
        // counters come from the summary only when no result line was seen
        let mut summary_counted = false;
        if let Some(caps) = &summary {
            log.duration_secs = caps[2].parse().unwrap_or(0.0);
            if log.results.is_empty() {
                for count in re(&SUMMARY_COUNT, r"(\d+) (passed|failed|errors?|skipped|xfailed|xpassed)")
                    .captures_iter(&caps[1])
                {
                    let n: usize = count[1].parse().unwrap_or(0);
                    summary_counted = true;
                    match &count[2] {
                        "passed" | "xpassed" => log.passed += n,
                        "failed" => log.failed += n,
                        "error" | "errors" => log.errors += n,
                        _ => log.skipped += n,
                    }
                }
            }
        }

        for caps in re(
            &DURATION_LINE,
            r"(?m)^\s*([0-9]+(?:\.[0-9]+)?)s\s+(?:call|setup|teardown)\s+(\S+)\s*$",
        )
        .captures_iter(text)
        {
            let name = short_name(&caps[2]);
            if let Some(&i) = index.get(&name) {
                log.results[i].duration_secs += caps[1].parse::<f64>().unwrap_or(0.0);
            }
        }

        for block in failure_blocks(text) {
            let detail = parse_failure_block(&block.body);
            let i = match index.get(&block.name) {
                Some(&i) => i,
                None => {
                    let outcome = if block.is_error {
                        TestOutcome::Error
                    } else {
                        TestOutcome::Failed
                    };
                    if !summary_counted {
                        match outcome {
                            TestOutcome::Error => log.errors += 1,
                            _ => log.failed += 1,
                        }
                    }
                    index.insert(block.name.clone(), log.results.len());
                    log.results.push(TestResult::new(block.name.clone(), outcome));
                    log.results.len() - 1
                }
            };
            let result = &mut log.results[i];
            if result.error_type.is_none() {
                result.error_type = detail.error_type;
                result.error_message = detail.error_message;
                result.error_line = detail.error_line;
            }
        }

        log
    }
}

struct FailureBlock {
    name: String,
    is_error: bool,
    body: String,
}

/// Split the FAILURES / ERRORS sections into per-test blocks.
fn failure_blocks(text: &str) -> Vec<FailureBlock> {
    let rule = re(&SECTION_RULE, r"^=+ (.+?) =+\s*$");
    let header = re(&BLOCK_HEADER, r"^_{3,} (.+?) _{3,}\s*$");

    let mut blocks = Vec::new();
    let mut in_section = false;
    let mut current: Option<FailureBlock> = None;

    for line in text.lines() {
        if let Some(caps) = rule.captures(line) {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            in_section = matches!(caps[1].trim(), "FAILURES" | "ERRORS");
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(caps) = header.captures(line) {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            let title = caps[1].trim();
            let is_error = title.starts_with("ERROR ");
            let node = title.rsplit(' ').next().unwrap_or(title);
            let node = short_name(node);
            let name = node.rsplit('.').next().unwrap_or(&node).to_string();
            current = Some(FailureBlock {
                name,
                is_error,
                body: String::new(),
            });
            continue;
        }
        if let Some(block) = current.as_mut() {
            block.body.push_str(line);
            block.body.push('\n');
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }
    blocks
}

#[derive(Debug, Default, PartialEq)]
struct FailureDetail {
    error_type: Option<String>,
    error_message: Option<String>,
    error_line: Option<u32>,
}

fn last_segment(dotted: &str) -> String {
    dotted.rsplit('.').next().unwrap_or(dotted).to_string()
}

fn first_line_clipped(text: &str) -> Option<String> {
    let line = text.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        None
    } else {
        Some(line.chars().take(MAX_ERROR_MESSAGE_CHARS).collect())
    }
}

fn parse_failure_block(body: &str) -> FailureDetail {
    const EXC: &str = r"([A-Za-z_][\w.]*(?:Error|Exception|Warning|Exit|Timeout|Failure|Interrupt))";

    let mut detail = FailureDetail::default();

    let e_exception = re(&E_EXCEPTION, &format!(r"(?m)^E\s+{}(?::\s*(.*))?$", EXC));
    let bare_exception = re(&BARE_EXCEPTION, &format!(r"(?m)^\s*{}:\s*(.*)$", EXC));
    if let Some(caps) = e_exception
        .captures(body)
        .or_else(|| bare_exception.captures(body))
    {
        detail.error_type = Some(last_segment(&caps[1]));
        detail.error_message = caps.get(2).and_then(|m| first_line_clipped(m.as_str()));
    } else if let Some(caps) = re(&E_ASSERT, r"(?m)^E\s+(assert\b.*)$").captures(body) {
        detail.error_type = Some("AssertionError".into());
        detail.error_message = first_line_clipped(&caps[1]);
    } else if let Some(caps) = re(&TRAILER, r"(?m)^\S+\.py:\d+: (\w+)\s*$")
        .captures_iter(body)
        .last()
    {
        detail.error_type = Some(caps[1].to_string());
    }

    if detail.error_message.is_none() {
        detail.error_message = body
            .lines()
            .find_map(|l| l.strip_prefix('E'))
            .and_then(first_line_clipped);
    }

    let locations: Vec<(String, u32)> = re(&SOURCE_LINE, r"(?m)^(\S+\.py):(\d+):")
        .captures_iter(body)
        .filter_map(|c| Some((c[1].to_string(), c[2].parse().ok()?)))
        .collect();
    detail.error_line = locations
        .iter()
        .rev()
        .find(|(path, _)| {
            path.rsplit(['/', '\\'])
                .next()
                .is_some_and(|base| base.starts_with("test_"))
        })
        .or(locations.last())
        .map(|(_, n)| *n);

    detail
}

//! Prompt Builder
//!
//! Assembles the generation, repair, refinement and test-design prompts.
//! Everything embedded from earlier attempts (issues, execution evidence)
//! is bounded so repair prompts do not grow with each retry.

use crate::api::types::Message;
use crate::generator::{suite_class_name, GenerationRequest};
use crate::locator::{element_context, DEFAULT_CONTEXT_ELEMENTS};
use crate::runner::report::{clip, TestExecutionLog};
use crate::testcase::format_for_prompt;

/// Static issues carried into one repair prompt.
pub const MAX_REPAIR_ISSUES: usize = 15;

const GENERATION_SYSTEM: &str = "You are an expert Playwright test automation engineer. \
You write Python test files using the Playwright sync API and pytest. \
Return only the complete Python file, with no explanations.";

const DESIGN_SYSTEM: &str = "You are a test automation expert. Generate detailed test cases \
based on page elements. Do not use any tools or function calls.";

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_elements: usize,
    evidence_budget: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            max_elements: DEFAULT_CONTEXT_ELEMENTS,
            evidence_budget: 2000,
        }
    }
}

impl PromptBuilder {
    pub fn new(max_elements: usize, evidence_budget: usize) -> Self {
        Self {
            max_elements,
            evidence_budget,
        }
    }

    pub fn from_config(config: &crate::config::GenerationConfig) -> Self {
        Self::new(config.max_prompt_elements, config.evidence_budget_chars)
    }

    pub fn evidence_budget(&self) -> usize {
        self.evidence_budget
    }

    fn requirements(&self, request: &GenerationRequest<'_>) -> String {
        let class_name = suite_class_name(request.suite_name);
        format!(
            "Requirements:
1. Start with these imports exactly:
   import re
   import pytest
   from playwright.sync_api import Page, expect
2. Define a page object class `WebPage` with `__init__(self, page: Page)`, a `navigate()`
   method that calls `self.page.goto(self.url)` followed by
   `self.page.wait_for_load_state(\"domcontentloaded\")`, and one method per element returning
   a locator.
3. Define a test class `{class_name}` with one method per test case. Every test method name
   must start with `test_` and take `page: Page` as its argument.
4. Prefer locators in this order: get_by_test_id, #id, get_by_label, get_by_role with name,
   [name=...], get_by_text(exact=True), CSS. Never use XPath unless nothing else works.
5. Interact through locators (`locator.click()`, `locator.fill(...)`), never `page.click(...)`.
6. Assert with `expect(...)`. Do not use `time.sleep` or `wait_for_timeout`; wait for
   conditions instead. Do not use `wait_for_navigation`.
7. Each test must be independent and runnable with `pytest -v`."
        )
    }

    /// Initial generation prompt.
    pub fn generation(&self, request: &GenerationRequest<'_>) -> Vec<Message> {
        let user = format!(
            "Generate a Playwright Python test file for {url}.

Suite name: {suite}

Page elements:
{elements}

Test cases ({count}):
{cases}

{requirements}

Return ONLY the Python code.",
            url = request.url,
            suite = request.suite_name,
            elements = element_context(request.elements, self.max_elements),
            count = request.cases.len(),
            cases = format_for_prompt(request.cases),
            requirements = self.requirements(request),
        );
        vec![Message::system(GENERATION_SYSTEM), Message::user(user)]
    }

    /// Repair prompt: the full current file, static issues and the latest
    /// execution evidence.
    pub fn repair(
        &self,
        request: &GenerationRequest<'_>,
        code: &str,
        issues: &[String],
        log: Option<&TestExecutionLog>,
    ) -> Vec<Message> {
        let mut sections = vec![format!(
            "The following Playwright Python test file for {} has problems. Fix them and return \
the complete corrected file.\n\n```python\n{}\n```",
            request.url, code
        )];

        if !issues.is_empty() {
            let mut block = String::from("Static analysis issues:\n");
            for issue in issues.iter().take(MAX_REPAIR_ISSUES) {
                block.push_str(&format!("- {}\n", issue));
            }
            if issues.len() > MAX_REPAIR_ISSUES {
                block.push_str(&format!(
                    "- ... and {} more\n",
                    issues.len() - MAX_REPAIR_ISSUES
                ));
            }
            sections.push(block.trim_end().to_string());
        }

        if let Some(log) = log {
            if !log.all_passed() {
                sections.push(format!(
                    "Test execution results:\n{}",
                    log.failure_summary(self.evidence_budget)
                ));
                sections.push(
                    "Errors such as TimeoutError or 'element not found' usually mean a locator \
is wrong; pick a different locator from the element list below."
                        .to_string(),
                );
            }
        }

        sections.push(format!(
            "Page elements:\n{}",
            element_context(request.elements, self.max_elements)
        ));
        sections.push(self.requirements(request));
        sections.push("Return ONLY the complete corrected Python code.".to_string());

        vec![
            Message::system(GENERATION_SYSTEM),
            Message::user(sections.join("\n\n")),
        ]
    }

    /// Custom-instruction refinement prompt.
    pub fn refinement(&self, code: &str, instructions: &str) -> Vec<Message> {
        let user = format!(
            "I have the following Playwright Python test code:

```python
{code}
```

Apply these instructions to it:
\"{instructions}\"

Guidelines:
- Keep all imports at the top
- Keep the pytest and Playwright patterns
- Every test method must start with test_
- Keep the code runnable

Return ONLY the complete modified Python code, without markdown or explanations.",
            code = code,
            instructions = clip(instructions.trim(), 2000),
        );
        vec![
            Message::system(
                "You are an expert test automation engineer. Return only valid Python code \
with no markdown formatting or explanations.",
            ),
            Message::user(user),
        ]
    }

    /// Test-design prompt asking for `count` cases in the `Test N:` format.
    pub fn design(&self, url: &str, structure: &str, elements_summary: &str, count: usize) -> Vec<Message> {
        let user = format!(
            "You are a test automation expert. Design specific test cases for this webpage.

URL: {url}
Structure: {structure}

Key Interactive Elements:
{elements_summary}

Create exactly {count} test cases. Use this EXACT format for each:

Test 1: [Test Name]
Description: [What this validates - mention specific elements like button text or link names]
Steps:
1. [Step with specific element reference]
2. [Step with expected action]
3. [Verification step]
Expected: [Specific outcome]
Priority: High/Medium/Low

Test 2: [Next test...]

IMPORTANT: Reference actual elements found (e.g. 'Click Sign in button', 'Enter text in search input with id=\"search\"'). Be specific!"
        );
        vec![Message::system(DESIGN_SYSTEM), Message::user(user)]
    }
}

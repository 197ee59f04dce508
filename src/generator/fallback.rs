//! Template Fallback Generator
//!
//! Builds a page-object class and a pytest class straight from the test
//! cases and page elements. Never calls the model and never fails; the
//! output always passes [`crate::syntax::check`].

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use super::GenerationRequest;
use crate::locator::{analyze, py_str, LocatorStrategy};
use crate::page::PageElement;
use crate::testcase::{snake_case, TestCase};

const MAX_METHOD_SLUG: usize = 30;
const MAX_STEP_COMMENT: usize = 120;
const MIN_MATCH_CHARS: usize = 3;

/// `Login Suite` -> `TestLoginSuite`.
pub fn suite_class_name(suite_name: &str) -> String {
    let mut name: String = suite_name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if name.is_empty() {
        name = "Suite".to_string();
    }
    if !name.starts_with("Test") {
        name = format!("Test{}", name);
    }
    name
}

/// Identifier fragment: lowercase, non-alphanumeric runs collapsed to `_`.
fn slug(text: &str, prefix_if_digit: &str) -> String {
    let mut out: String = snake_case(text).chars().take(MAX_METHOD_SLUG).collect();
    out = out.trim_end_matches('_').to_string();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out = format!("{}{}", prefix_if_digit, out);
    }
    out
}

/// Text that is safe inside a `"""` docstring.
fn doc_line(text: &str) -> String {
    let quoted = py_str(text);
    quoted[1..quoted.len() - 1].to_string()
}

/// Text that is safe after a `#`.
fn comment_text(text: &str) -> String {
    let visible: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let flat = visible.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut clipped: String = flat.chars().take(MAX_STEP_COMMENT).collect();
    if flat.chars().count() > MAX_STEP_COMMENT {
        clipped.push_str("...");
    }
    clipped
}

fn unique(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// One `get_*` method on the page object.
#[derive(Debug, Clone)]
struct LocatorMethod {
    name: String,
    expression: String,
    element: PageElement,
}

fn method_base(element: &PageElement, index: usize) -> String {
    let choice = analyze(element);
    let candidates = [
        element.test_id.as_deref(),
        element.id.as_deref().filter(|_| choice.strategy == LocatorStrategy::Id),
        element.aria_label.as_deref(),
        Some(element.visible_text()),
        element.name.as_deref(),
    ];
    let tag = slug(&element.tag, "tag_");
    for candidate in candidates.into_iter().flatten() {
        let s = slug(candidate, "elem_");
        if !s.is_empty() {
            return if tag.is_empty() || s.ends_with(&tag) {
                s
            } else {
                format!("{}_{}", s, tag)
            };
        }
    }
    if tag.is_empty() {
        format!("element_{}", index + 1)
    } else {
        format!("{}_{}", tag, index + 1)
    }
}

fn locator_methods(elements: &[PageElement]) -> Vec<LocatorMethod> {
    let mut taken = HashSet::new();
    elements
        .iter()
        .enumerate()
        .map(|(i, element)| {
            let choice = analyze(element);
            LocatorMethod {
                name: unique(format!("get_{}", method_base(element, i)), &mut taken),
                expression: choice.expression_on("self.page"),
                element: element.clone(),
            }
        })
        .collect()
}

static QUOTED: OnceLock<Regex> = OnceLock::new();

fn quoted_values(step: &str) -> Vec<String> {
    QUOTED
        .get_or_init(|| Regex::new(r#"['"]([^'"]{1,80})['"]"#).expect("invalid quoted-value regex"))
        .captures_iter(step)
        .map(|c| c[1].to_string())
        .collect()
}

fn mentions(step_lower: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim) {
        Some(n) if n.chars().count() >= MIN_MATCH_CHARS => step_lower.contains(&n.to_lowercase()),
        _ => false,
    }
}

/// A field key is mentioned by name when long enough to be unambiguous, or
/// as an explicit `name="..."` / `id="..."` attribute.
fn mentions_field(step_lower: &str, key: &str) -> bool {
    let key = key.trim().to_lowercase();
    if key.is_empty() {
        return false;
    }
    if mentions(step_lower, Some(&key)) {
        return true;
    }
    ["name=", "id="].iter().any(|attr| {
        step_lower.contains(&format!("{}\"{}\"", attr, key))
            || step_lower.contains(&format!("{}'{}'", attr, key))
    })
}

fn is_fillable(element: &PageElement) -> bool {
    element.is_input() || matches!(element.tag.as_str(), "textarea" | "select")
}

/// Map one step to an action line, when the mapping is unambiguous.
fn map_step(step: &str, methods: &[LocatorMethod]) -> Option<String> {
    let lower = step.to_lowercase();
    let is_click = ["click", "press", "tap"].iter().any(|k| lower.contains(k));
    let is_fill = ["enter", "type", "fill", "input"].iter().any(|k| lower.contains(k));

    if is_fill {
        let values = quoted_values(step);
        for m in methods.iter().filter(|m| is_fillable(&m.element)) {
            let keys = [
                m.element.name.as_deref(),
                m.element.id.as_deref(),
                m.element.aria_label.as_deref(),
            ];
            let Some(key) = keys.into_iter().flatten().find(|k| mentions_field(&lower, k)) else {
                continue;
            };
            let value = values
                .iter()
                .find(|v| !v.eq_ignore_ascii_case(key.trim()))?;
            return Some(format!("web_page.{}().fill({})", m.name, py_str(value)));
        }
        return None;
    }

    if is_click {
        let target = methods.iter().find(|m| {
            mentions(&lower, Some(m.element.visible_text()))
                || mentions(&lower, m.element.aria_label.as_deref())
        })?;
        return Some(format!("web_page.{}().click()", target.name));
    }
    None
}

fn test_method(case: &TestCase, index: usize, methods: &[LocatorMethod], taken: &mut HashSet<String>) -> String {
    let base = match slug(&case.name, "") {
        s if s.is_empty() || s.starts_with(|c: char| c.is_ascii_digit()) => format!("test_{}", index + 1),
        s if s.starts_with("test_") => s,
        s => format!("test_{}", s),
    };
    let name = unique(base, taken);

    let mut lines = vec![format!("    def {}(self, page: Page):", name)];
    lines.push("        \"\"\"".to_string());
    lines.push(format!("        {}", doc_line(&comment_text(&case.name))));
    if !case.description.trim().is_empty() {
        lines.push(String::new());
        lines.push(format!("        {}", doc_line(&comment_text(&case.description))));
    }
    lines.push(String::new());
    lines.push(format!("        Expected: {}", doc_line(&comment_text(&case.expected_outcome))));
    lines.push(format!("        Priority: {}", case.priority));
    lines.push("        \"\"\"".to_string());
    lines.push("        web_page = WebPage(page)".to_string());
    lines.push("        web_page.navigate()".to_string());

    for (j, step) in case.steps.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!("        # {}. {}", j + 1, comment_text(step)));
        if let Some(action) = map_step(step, methods) {
            lines.push(format!("        {}", action));
        }
    }

    lines.push(String::new());
    lines.push("        expect(page).to_have_url(re.compile(\".*\"))".to_string());
    lines.join("\n")
}

#[derive(Debug, Clone, Default)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Render the template with the current local time in the header.
    pub fn generate(&self, request: &GenerationRequest<'_>) -> String {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.render(request, &stamp)
    }

    pub fn render(&self, request: &GenerationRequest<'_>, generated_at: &str) -> String {
        let methods = locator_methods(request.elements);
        let class_name = suite_class_name(request.suite_name);

        let mut out = String::new();
        out.push_str("\"\"\"\n");
        out.push_str(&format!("Generated Test Suite: {}\n", doc_line(request.suite_name)));
        out.push_str(&format!("URL: {}\n", doc_line(request.url)));
        out.push_str(&format!("Generated: {}\n", generated_at));
        out.push_str("Test Framework: Playwright + pytest\n");
        out.push_str("\"\"\"\n\n");
        out.push_str("import re\nimport pytest\nfrom playwright.sync_api import Page, expect\n\n\n");

        out.push_str("class WebPage:\n");
        out.push_str(&format!("    \"\"\"Page object for {}\"\"\"\n\n", doc_line(request.url)));
        out.push_str("    def __init__(self, page: Page):\n");
        out.push_str("        self.page = page\n");
        out.push_str(&format!("        self.url = {}\n\n", py_str(request.url)));
        out.push_str("    def navigate(self):\n");
        out.push_str("        self.page.goto(self.url)\n");
        out.push_str("        self.page.wait_for_load_state(\"domcontentloaded\")\n");
        for m in &methods {
            out.push('\n');
            out.push_str(&format!("    def {}(self):\n", m.name));
            out.push_str(&format!("        return {}\n", m.expression));
        }

        out.push_str("\n\n");
        out.push_str(&format!("class {}:\n", class_name));
        out.push_str(&format!(
            "    \"\"\"Generated test suite: {}\"\"\"\n\n",
            doc_line(request.suite_name)
        ));
        out.push_str("    @pytest.fixture(autouse=True)\n");
        out.push_str("    def setup(self, page: Page):\n");
        out.push_str("        page.set_viewport_size({\"width\": 1280, \"height\": 720})\n");
        out.push_str("        yield\n");

        let mut taken = HashSet::new();
        if request.cases.is_empty() {
            out.push('\n');
            out.push_str("    def test_page_loads(self, page: Page):\n");
            out.push_str("        WebPage(page).navigate()\n");
            out.push_str("        expect(page).to_have_url(re.compile(\".*\"))\n");
        }
        for (i, case) in request.cases.iter().enumerate() {
            out.push('\n');
            out.push_str(&test_method(case, i, &methods, &mut taken));
            out.push('\n');
        }
        out
    }
}

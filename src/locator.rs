//! Locator Analyzer
//!
//! Picks the single most reliable way to address a page element and renders
//! it as a Playwright (Python) expression. The priority order is fixed:
//! test id, stable id, aria label, button name, link name, name attribute,
//! short text, CSS, and finally an XPath placeholder.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::page::PageElement;

/// Max visible text length for an exact text locator.
pub const MAX_TEXT_LOCATOR_CHARS: usize = 50;

/// Elements rendered into a prompt's locator section.
pub const DEFAULT_CONTEXT_ELEMENTS: usize = 20;

/// Locator strategies ordered by reliability. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LocatorStrategy {
    TestId = 1,
    Id = 2,
    Aria = 3,
    Name = 4,
    Text = 5,
    Css = 6,
    XPath = 7,
}

impl LocatorStrategy {
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            LocatorStrategy::TestId => "test-id",
            LocatorStrategy::Id => "id",
            LocatorStrategy::Aria => "aria",
            LocatorStrategy::Name => "name",
            LocatorStrategy::Text => "text",
            LocatorStrategy::Css => "css",
            LocatorStrategy::XPath => "xpath",
        }
    }
}

impl std::fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The analyzer's verdict for one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorChoice {
    pub strategy: LocatorStrategy,
    /// Compact selector notation, e.g. `role=button name="Login"`.
    pub selector: String,
    /// Python expression against a `page` object.
    pub expression: String,
    pub reason: String,
}

impl LocatorChoice {
    /// True for the XPath placeholder that needs a human to fill it in.
    pub fn needs_manual_repair(&self) -> bool {
        self.strategy == LocatorStrategy::XPath
    }

    /// The expression rebased onto another receiver, e.g. `self.page`.
    pub fn expression_on(&self, receiver: &str) -> String {
        match self.expression.strip_prefix("page.") {
            Some(rest) => format!("{}.{}", receiver, rest),
            None => self.expression.clone(),
        }
    }
}

static AUTO_ID_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn auto_id_patterns() -> &'static [Regex] {
    AUTO_ID_PATTERNS.get_or_init(|| {
        [
            // Framework-generated prefixes followed by a counter
            r"^(?:ember|ext-gen|ext-comp|gwt-uid-|yui_|mui-|radix-|react-select-|headlessui-[a-z]+-)\d+",
            // React useId
            r"^:r[0-9a-z]+:$",
            // UUID shape
            r"^[0-9a-f-]{36}$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid auto-id regex"))
        .collect()
    })
}

/// Ids that a framework generated and that change between renders.
pub fn is_auto_generated_id(id: &str) -> bool {
    auto_id_patterns().iter().any(|re| re.is_match(id))
}

/// Escape a value for a double-quoted Python string literal.
pub fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32 & 0xff)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn css_ident_ok(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn css_attr_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Choose the locator for one element. Deterministic: same attributes, same
/// answer.
pub fn analyze(element: &PageElement) -> LocatorChoice {
    let tag = element.tag.trim().to_ascii_lowercase();
    let text = element.visible_text();

    if let Some(test_id) = non_blank(&element.test_id) {
        return LocatorChoice {
            strategy: LocatorStrategy::TestId,
            selector: format!("data-testid={}", test_id),
            expression: format!("page.get_by_test_id({})", py_str(test_id)),
            reason: "explicit test id is the most stable hook".into(),
        };
    }

    if let Some(id) = non_blank(&element.id).filter(|id| !is_auto_generated_id(id)) {
        let selector = if css_ident_ok(id) {
            format!("#{}", id)
        } else {
            format!("[id=\"{}\"]", css_attr_escape(id))
        };
        return LocatorChoice {
            strategy: LocatorStrategy::Id,
            expression: format!("page.locator({})", py_str(&selector)),
            selector,
            reason: "unique id attribute".into(),
        };
    }

    if let Some(label) = non_blank(&element.aria_label) {
        return LocatorChoice {
            strategy: LocatorStrategy::Aria,
            selector: format!("aria-label=\"{}\"", css_attr_escape(label)),
            expression: format!("page.get_by_label({})", py_str(label)),
            reason: "accessible label".into(),
        };
    }

    if !text.is_empty() {
        let role = if element.is_button() {
            Some("button")
        } else if element.is_link() {
            Some("link")
        } else {
            None
        };
        if let Some(role) = role {
            return LocatorChoice {
                strategy: LocatorStrategy::Aria,
                selector: format!("role={} name=\"{}\"", role, css_attr_escape(text)),
                expression: format!("page.get_by_role(\"{}\", name={})", role, py_str(text)),
                reason: format!("{} role with accessible name", role),
            };
        }
    }

    if let Some(name) = non_blank(&element.name) {
        let selector = format!("[name=\"{}\"]", css_attr_escape(name));
        return LocatorChoice {
            strategy: LocatorStrategy::Name,
            expression: format!("page.locator({})", py_str(&selector)),
            selector,
            reason: "form name attribute".into(),
        };
    }

    if !text.is_empty() && text.chars().count() <= MAX_TEXT_LOCATOR_CHARS {
        return LocatorChoice {
            strategy: LocatorStrategy::Text,
            selector: format!("text=\"{}\"", css_attr_escape(text)),
            expression: format!("page.get_by_text({}, exact=True)", py_str(text)),
            reason: "short exact visible text".into(),
        };
    }

    if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        let selector = match non_blank(&element.input_type) {
            Some(t) => format!("{}[type=\"{}\"]", tag, css_attr_escape(t)),
            None => tag.clone(),
        };
        return LocatorChoice {
            strategy: LocatorStrategy::Css,
            expression: format!("page.locator({})", py_str(&selector)),
            selector,
            reason: "tag-based CSS, may match several elements".into(),
        };
    }

    LocatorChoice {
        strategy: LocatorStrategy::XPath,
        selector: "//REPLACE_ME".into(),
        expression: "page.locator(\"xpath=//REPLACE_ME\")".into(),
        reason: "no usable attributes; replace the XPath manually".into(),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Render the recommendation list for the first `limit` elements.
pub fn element_context(elements: &[PageElement], limit: usize) -> String {
    if elements.is_empty() {
        return "No page elements were captured; infer locators from the test steps.".into();
    }

    let mut lines = Vec::with_capacity(limit.min(elements.len()) + 1);
    lines.push("Recommended locators (most reliable first):".to_string());
    for (i, element) in elements.iter().take(limit).enumerate() {
        let choice = analyze(element);
        let mut desc = format!("<{}>", element.tag);
        let text = element.visible_text();
        if !text.is_empty() {
            let short: String = text.chars().take(40).collect();
            desc.push_str(&format!(" \"{}\"", short));
        }
        lines.push(format!(
            "{}. {} -> {} [{}] ({})",
            i + 1,
            desc,
            choice.expression,
            choice.strategy,
            choice.reason
        ));
    }
    if elements.len() > limit {
        lines.push(format!("... {} more elements omitted", elements.len() - limit));
    }
    lines.join("\n")
}

//! Page element snapshots
//!
//! Elements come from the browser automation collaborator (a JSON export of
//! the explored page). They are immutable inputs used for locator scoring,
//! prompt context and the coverage estimate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::testcase::TestCase;

/// Max characters of visible text kept per element.
pub const MAX_ELEMENT_TEXT: usize = 100;

/// A snapshot of one DOM node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageElement {
    #[serde(default, alias = "tag_name")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "non_empty")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "non_empty")]
    pub name: Option<String>,
    #[serde(
        default,
        rename = "test_id",
        alias = "data-testid",
        alias = "testid",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub test_id: Option<String>,
    #[serde(
        default,
        alias = "aria-label",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(
        default,
        rename = "type",
        alias = "input_type",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub input_type: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

/// Explorers emit `""` for missing attributes; treat those as absent.
fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

impl PageElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }

    pub fn with_aria_label(mut self, label: impl Into<String>) -> Self {
        self.aria_label = Some(label.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = truncate_chars(&text.into(), MAX_ELEMENT_TEXT);
        self
    }

    pub fn with_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = Some(input_type.into());
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Visible text with surrounding whitespace removed.
    pub fn visible_text(&self) -> &str {
        self.text.trim()
    }

    pub fn is_button(&self) -> bool {
        self.tag.eq_ignore_ascii_case("button")
    }

    pub fn is_link(&self) -> bool {
        self.tag.eq_ignore_ascii_case("a") || self.tag.eq_ignore_ascii_case("link")
    }

    pub fn is_input(&self) -> bool {
        matches!(
            self.tag.to_ascii_lowercase().as_str(),
            "input" | "textarea" | "select"
        )
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Load elements from a JSON file: either a bare array or an exploration
/// object with an `elements` field.
pub fn load_elements(path: &Path) -> anyhow::Result<Vec<PageElement>> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read elements from {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).context("Elements file is not valid JSON")?;
    let list = match value {
        serde_json::Value::Object(mut map) => map
            .remove("elements")
            .unwrap_or(serde_json::Value::Array(vec![])),
        other => other,
    };
    let mut elements: Vec<PageElement> =
        serde_json::from_value(list).context("Failed to parse page elements")?;
    for element in &mut elements {
        element.tag = element.tag.to_lowercase();
        element.text = truncate_chars(&element.text, MAX_ELEMENT_TEXT);
    }
    Ok(elements)
}

/// Summarize visible buttons, links and inputs for the test-design prompt.
pub fn summarize_elements(elements: &[PageElement]) -> String {
    if elements.is_empty() {
        return "No interactive elements found".to_string();
    }

    let visible: Vec<&PageElement> = elements.iter().filter(|e| e.visible).collect();
    let buttons: Vec<_> = visible.iter().filter(|e| e.is_button()).take(8).collect();
    let links: Vec<_> = visible.iter().filter(|e| e.tag == "a").take(10).collect();
    let inputs: Vec<_> = visible.iter().filter(|e| e.tag == "input").take(6).collect();

    let mut lines = Vec::new();

    if !buttons.is_empty() {
        lines.push(format!("BUTTONS ({} shown):", buttons.len()));
        for (i, b) in buttons.iter().enumerate() {
            let mut parts = Vec::new();
            let text = truncate_chars(b.visible_text(), 40);
            if !text.is_empty() {
                parts.push(format!("text='{}'", text));
            }
            if let Some(id) = &b.id {
                parts.push(format!("id='{}'", id));
            }
            if let Some(t) = &b.input_type {
                parts.push(format!("type='{}'", t));
            }
            lines.push(format!("  {}. Button: {}", i + 1, join_or(&parts, "no text/id")));
        }
    }

    if !links.is_empty() {
        lines.push(format!("LINKS ({} shown):", links.len()));
        for (i, l) in links.iter().enumerate() {
            let mut parts = Vec::new();
            let text = truncate_chars(l.visible_text(), 40);
            if !text.is_empty() {
                parts.push(format!("text='{}'", text));
            }
            if let Some(id) = &l.id {
                parts.push(format!("id='{}'", id));
            }
            lines.push(format!("  {}. Link: {}", i + 1, join_or(&parts, "no text/id")));
        }
    }

    if !inputs.is_empty() {
        lines.push(format!("INPUTS ({} shown):", inputs.len()));
        for (i, inp) in inputs.iter().enumerate() {
            let mut parts = vec![format!(
                "type='{}'",
                inp.input_type.as_deref().unwrap_or("text")
            )];
            if let Some(id) = &inp.id {
                parts.push(format!("id='{}'", id));
            }
            if let Some(name) = &inp.name {
                parts.push(format!("name='{}'", name));
            }
            lines.push(format!("  {}. Input: {}", i + 1, parts.join(", ")));
        }
    }

    if lines.is_empty() {
        return "No visible interactive elements found".to_string();
    }
    lines.join("\n")
}

fn join_or(parts: &[String], empty: &str) -> String {
    if parts.is_empty() {
        empty.to_string()
    } else {
        parts.join(", ")
    }
}

/// Percentage of visible elements referenced by the test cases.
///
/// An element counts as covered when its id, the first 20 chars of its text
/// (texts longer than 3 chars only) or its input type appear in the combined
/// test text. Capped at 95 and rounded to one decimal.
pub fn coverage_score(cases: &[TestCase], elements: &[PageElement]) -> f64 {
    if cases.is_empty() || elements.is_empty() {
        return 0.0;
    }

    let visible: Vec<&PageElement> = elements.iter().filter(|e| e.visible).collect();
    if visible.is_empty() {
        return 50.0;
    }

    let content = cases
        .iter()
        .map(|tc| format!("{} {} {}", tc.name, tc.description, tc.steps.join(" ")))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut covered: HashSet<String> = HashSet::new();
    for element in &visible {
        let text = element.visible_text().to_lowercase();
        let prefix = truncate_chars(&text, 20);
        if let Some(id) = element.id.as_deref().filter(|id| content.contains(&id.to_lowercase())) {
            covered.insert(format!("id:{}", id));
        } else if text.chars().count() > 3 && content.contains(&prefix) {
            covered.insert(format!("text:{}", prefix));
        } else if let Some(t) = element.input_type.as_deref().filter(|t| content.contains(*t)) {
            covered.insert(format!("type:{}", t));
        }
    }

    let num_covered = covered.len().min(visible.len());
    let coverage = (num_covered as f64 / visible.len() as f64 * 100.0).min(95.0);
    (coverage * 10.0).round() / 10.0
}

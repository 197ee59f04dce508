//! Test Designer
//!
//! Asks the model for test cases covering a page and parses the reply.
//! Never errors: a failed call or an unparseable reply yields the
//! placeholder cases.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::LlmClient;
use crate::errors::ApiError;
use crate::observability::telemetry::track_call;
use crate::page::{coverage_score, summarize_elements, PageElement};
use crate::prompt::PromptBuilder;
use crate::testcase::{parse_test_cases, placeholder_cases, TestCase};

/// Stop sequence that ends the case list.
pub const DESIGN_STOP: &str = "\n\n\n";
pub const DEFAULT_CASE_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DesignOutcome {
    pub cases: Vec<TestCase>,
    /// Percentage of visible elements the cases refer to.
    pub coverage: f64,
    pub from_model: bool,
}

pub struct TestDesigner {
    llm: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
    timeout: Duration,
}

impl TestDesigner {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            llm,
            prompts: PromptBuilder::default(),
            timeout,
        }
    }

    pub async fn design(
        &self,
        url: &str,
        structure: &str,
        elements: &[PageElement],
        count: usize,
    ) -> DesignOutcome {
        let count = count.max(1);
        let messages = self
            .prompts
            .design(url, structure, &summarize_elements(elements), count);
        let llm = Arc::clone(&self.llm);
        let limit = self.timeout;

        let reply = track_call("llm", || async move {
            let stop = Some(vec![DESIGN_STOP.to_string()]);
            match tokio::time::timeout(limit, llm.complete(messages, stop)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::Error::new(ApiError::Timeout)),
            }
        })
        .await;

        let parsed = match reply {
            Ok(completion) => completion
                .into_text()
                .map(|text| parse_test_cases(&text))
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Test design call failed");
                Vec::new()
            }
        };

        // parse_test_cases already substitutes placeholders for unparseable
        // text; an empty reply still needs them.
        let from_model = !parsed.is_empty() && parsed != placeholder_cases();
        let cases = if parsed.is_empty() { placeholder_cases() } else { parsed };
        let coverage = coverage_score(&cases, elements);
        info!(cases = cases.len(), coverage, from_model, "Test design finished");

        DesignOutcome {
            cases,
            coverage,
            from_model,
        }
    }
}

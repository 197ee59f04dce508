//! Custom-instruction refinement.
//!
//! Opportunistic: the model's rewrite is only taken when it extracts cleanly
//! and parses. Anything else hands the original code back untouched.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::LlmClient;
use crate::config::Config;
use crate::errors::ApiError;
use crate::extract::extract_from_completion;
use crate::observability::telemetry::track_call;
use crate::prompt::PromptBuilder;
use crate::runner::{check_source, AstCheck};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefinementResult {
    pub code: String,
    pub applied: bool,
    /// Why the original was kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RefinementResult {
    fn kept(code: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(reason = reason.as_str(), "Refinement not applied; keeping original code");
        Self {
            code: code.to_string(),
            applied: false,
            reason: Some(reason),
        }
    }
}

pub struct Refiner {
    llm: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
    timeout: Duration,
    ast_check: Option<AstCheck>,
}

impl Refiner {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            llm,
            prompts: PromptBuilder::default(),
            timeout,
            ast_check: None,
        }
    }

    pub fn from_config(llm: Arc<dyn LlmClient>, config: &Config) -> Self {
        let refiner = Self::new(
            llm,
            Duration::from_secs(config.generation.model_timeout_secs),
        );
        match AstCheck::from_runner_config(&config.runner) {
            Some(ast) => refiner.with_ast_check(ast),
            None => refiner,
        }
    }

    pub fn with_ast_check(mut self, ast: AstCheck) -> Self {
        self.ast_check = Some(ast);
        self
    }

    pub async fn refine(&self, code: &str, instructions: &str) -> RefinementResult {
        if instructions.trim().is_empty() {
            return RefinementResult::kept(code, "no instructions given");
        }

        let messages = self.prompts.refinement(code, instructions);
        let llm = Arc::clone(&self.llm);
        let limit = self.timeout;
        let reply = track_call("llm", || async move {
            match tokio::time::timeout(limit, llm.complete(messages, None)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::Error::new(ApiError::Timeout)),
            }
        })
        .await;

        let completion = match reply {
            Ok(completion) => completion,
            Err(e) => return RefinementResult::kept(code, format!("model call failed: {}", e)),
        };
        let refined = match extract_from_completion(&completion) {
            Ok(refined) => refined,
            Err(e) => return RefinementResult::kept(code, format!("unusable reply: {}", e)),
        };
        if let Err(e) = check_source(self.ast_check.as_ref(), &refined).await {
            return RefinementResult::kept(code, format!("refined code has a syntax error at {}", e));
        }

        info!(
            before = code.len(),
            after = refined.len(),
            "Refinement applied"
        );
        RefinementResult {
            code: refined,
            applied: true,
            reason: None,
        }
    }
}

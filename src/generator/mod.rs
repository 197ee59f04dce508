//! Generation Orchestrator
//!
//! Drives the self-correction loop:
//!
//! ```text
//! Generate ──► Validate ──► Done ──► (final syntax gate) ──► result
//!    │            │  ▲         │
//!    │            └──┘ repair  └──► Fallback ──► result
//!    └────────────────────────────► Fallback
//! ```
//!
//! Work is strictly sequential: repair N+1 sees the execution log of
//! candidate N. Model calls are capped at `max_retries + 1` and every
//! collaborator failure becomes data, so [`Generator::generate`] always
//! returns syntactically valid code.

pub mod fallback;
pub mod refine;

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::types::Message;
use crate::api::LlmClient;
use crate::config::{Config, GenerationConfig};
use crate::errors::{ApiError, TestsmithError};
use crate::extract::extract_from_completion;
use crate::observability::telemetry::{loggable, record_state_transition, track_call};
use crate::page::PageElement;
use crate::prompt::PromptBuilder;
use crate::runner::{check_source, AstCheck, CodeRunner, TestExecutionLog};
use crate::testcase::TestCase;
use crate::{is_shutdown_requested, validator};

pub use fallback::{suite_class_name, FallbackGenerator};
pub use refine::{RefinementResult, Refiner};

/// Everything one generation run works from.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub url: &'a str,
    pub suite_name: &'a str,
    pub cases: &'a [TestCase],
    pub elements: &'a [PageElement],
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Repair calls allowed after the initial generation call.
    pub max_retries: u32,
    pub run_tests: bool,
    pub model_timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

impl GenerationOptions {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            run_tests: config.run_tests,
            model_timeout: Duration::from_secs(config.model_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationMetrics {
    pub model_calls: u32,
    /// Candidates that went through validation.
    pub attempts: u32,
    pub used_fallback: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub code: String,
    /// Last log obtained; `None` when nothing was executed.
    pub execution_log: Option<TestExecutionLog>,
    pub source: CodeSource,
    /// Issues reported for the last validated candidate.
    pub issues: Vec<String>,
    pub metrics: GenerationMetrics,
}

#[derive(Debug)]
enum GenerationState {
    Generate,
    Validate { code: String },
    Done { code: String },
    Fallback { reason: String },
}

impl GenerationState {
    fn label(&self) -> &'static str {
        match self {
            GenerationState::Generate => "generate",
            GenerationState::Validate { .. } => "validate",
            GenerationState::Done { .. } => "done",
            GenerationState::Fallback { .. } => "fallback",
        }
    }
}

/// Mutable bookkeeping for one run. Never shared between requests.
#[derive(Default)]
struct RunState {
    metrics: GenerationMetrics,
    last_log: Option<TestExecutionLog>,
    last_issues: Vec<String>,
}

pub struct Generator {
    llm: Arc<dyn LlmClient>,
    runner: Option<CodeRunner>,
    ast_check: Option<AstCheck>,
    prompts: PromptBuilder,
    fallback: FallbackGenerator,
    options: GenerationOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmClient>, options: GenerationOptions) -> Self {
        Self {
            llm,
            runner: None,
            ast_check: None,
            prompts: PromptBuilder::default(),
            fallback: FallbackGenerator::new(),
            options,
            cancel: None,
        }
    }

    /// Generator wired from configuration; a harness is attached only when
    /// execution is enabled. The runner's interpreter, if it has one,
    /// confirms syntax either way.
    pub fn from_config(llm: Arc<dyn LlmClient>, config: &Config) -> Result<Self, TestsmithError> {
        let mut generator = Self::new(llm, GenerationOptions::from_config(&config.generation))
            .with_prompts(PromptBuilder::from_config(&config.generation));
        if let Some(ast) = AstCheck::from_runner_config(&config.runner) {
            generator = generator.with_ast_check(ast);
        }
        if config.generation.run_tests {
            generator = generator.with_runner(CodeRunner::from_config(
                &config.runner,
                config.generation.headless,
            )?);
        }
        Ok(generator)
    }

    pub fn with_runner(mut self, runner: CodeRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_ast_check(mut self, ast: AstCheck) -> Self {
        self.ast_check = Some(ast);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    /// Extra stop flag checked alongside the process-wide shutdown flag.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        is_shutdown_requested()
            || self
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    fn max_model_calls(&self) -> u32 {
        self.options.max_retries.saturating_add(1)
    }

    /// Run the self-correction loop. Total: always returns usable code.
    pub async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationOutcome {
        let started = Instant::now();
        let mut run = RunState::default();
        let mut state = GenerationState::Generate;

        info!(
            url = request.url,
            cases = request.cases.len(),
            elements = request.elements.len(),
            max_retries = self.options.max_retries,
            run_tests = self.options.run_tests,
            "Starting generation"
        );
        if self.options.run_tests && self.runner.is_none() {
            warn!("Execution requested but no harness is configured; validating statically only");
        }

        loop {
            let from = state.label();
            state = match state {
                GenerationState::Generate => self.on_generate(request, &mut run).await,
                GenerationState::Validate { code } => self.on_validate(request, code, &mut run).await,
                GenerationState::Done { code } => {
                    if check_source(self.ast_check.as_ref(), &code).await.is_ok() {
                        return self.finish(code, CodeSource::Model, run, started);
                    }
                    GenerationState::Fallback {
                        reason: "final candidate failed the syntax check".into(),
                    }
                }
                GenerationState::Fallback { reason } => {
                    warn!(reason = reason.as_str(), "Using template fallback");
                    let code = self.fallback.generate(request);
                    return self.finish(code, CodeSource::Fallback, run, started);
                }
            };
            record_state_transition(from, state.label());
        }
    }

    async fn on_generate(&self, request: &GenerationRequest<'_>, run: &mut RunState) -> GenerationState {
        if self.cancelled() {
            return GenerationState::Fallback {
                reason: "shutdown requested before generation".into(),
            };
        }
        match self.call_model(self.prompts.generation(request), run).await {
            Ok(code) => GenerationState::Validate { code },
            Err(reason) => GenerationState::Fallback { reason },
        }
    }

    async fn on_validate(
        &self,
        request: &GenerationRequest<'_>,
        code: String,
        run: &mut RunState,
    ) -> GenerationState {
        run.metrics.attempts += 1;
        let attempt = run.metrics.attempts;
        let mut report = validator::validate(&code, request.cases);
        if report.ok {
            if let Err(err) = check_source(self.ast_check.as_ref(), &code).await {
                report.record_syntax_error(err);
            }
        }
        debug!(
            attempt,
            syntax_ok = report.ok,
            issues = report.issues.len(),
            "Static validation finished"
        );

        let mut log = None;
        if self.options.run_tests && report.ok {
            if let Some(runner) = &self.runner {
                let executed = runner.run_tests(&code).await;
                info!(
                    attempt,
                    passed = executed.passed,
                    failed = executed.failed,
                    errors = executed.errors,
                    skipped = executed.skipped,
                    "Candidate executed"
                );
                log = Some(executed);
            }
        }

        let tests_ok = log.as_ref().map_or(true, TestExecutionLog::all_passed);
        if log.is_some() {
            run.last_log = log.clone();
        }
        run.last_issues = report.issues.clone();

        if report.issues.is_empty() && tests_ok {
            info!(attempt, "Candidate accepted");
            return GenerationState::Done { code };
        }
        if run.metrics.model_calls >= self.max_model_calls() {
            info!(attempt, "Repair budget exhausted");
            return GenerationState::Done { code };
        }
        if self.cancelled() {
            info!(attempt, "Shutdown requested; keeping current candidate");
            return GenerationState::Done { code };
        }

        let messages = self
            .prompts
            .repair(request, &code, &report.issues, log.as_ref());
        match self.call_model(messages, run).await {
            Ok(repaired) => GenerationState::Validate { code: repaired },
            Err(reason) => {
                warn!(
                    reason = reason.as_str(),
                    "Repair reply unusable; keeping previous candidate"
                );
                GenerationState::Done { code }
            }
        }
    }

    /// One bounded model call. Every failure comes back as a reason string.
    async fn call_model(&self, messages: Vec<Message>, run: &mut RunState) -> Result<String, String> {
        run.metrics.model_calls += 1;
        let call = run.metrics.model_calls;
        let limit = self.options.model_timeout;
        let llm = Arc::clone(&self.llm);

        let completion = track_call("llm", || async move {
            match tokio::time::timeout(limit, llm.complete(messages, None)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::Error::new(ApiError::Timeout)),
            }
        })
        .await
        .map_err(|e| format!("model call {} failed: {}", call, e))?;

        let code = extract_from_completion(&completion).map_err(|e| {
            let reply = completion.text().map(loggable).unwrap_or_default();
            debug!(call, reply = reply.as_str(), "Reply rejected");
            format!("model call {} returned unusable output: {}", call, e)
        })?;
        debug!(call, chars = code.len(), "Extracted candidate code");
        Ok(code)
    }

    fn finish(
        &self,
        code: String,
        source: CodeSource,
        mut run: RunState,
        started: Instant,
    ) -> GenerationOutcome {
        run.metrics.used_fallback = source == CodeSource::Fallback;
        run.metrics.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            source = ?source,
            model_calls = run.metrics.model_calls,
            attempts = run.metrics.attempts,
            duration_ms = run.metrics.duration_ms,
            "Generation finished"
        );
        GenerationOutcome {
            code,
            execution_log: run.last_log,
            source,
            issues: run.last_issues,
            metrics: run.metrics,
        }
    }
}

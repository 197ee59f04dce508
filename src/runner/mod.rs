//! Code Runner
//!
//! Executes a generated test file in a disposable workspace and parses the
//! harness output into a [`TestExecutionLog`]. Every failure mode (workspace
//! creation, spawn failure, harness crash, timeout) degrades to a log with
//! `errors = 1` and an explanatory message; `run_tests` never returns `Err`.

pub mod ast_check;
pub mod report;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::errors::{RunnerError, TestsmithError};
use crate::observability::telemetry::{loggable, track_call};
pub use ast_check::{check_source, AstCheck};
pub use report::{
    HarnessOutput, PytestTextParser, ReportParser, TestExecutionLog, TestOutcome, TestResult,
};

/// File name the candidate is written to inside the workspace.
pub const TEST_FILE_NAME: &str = "test_generated.py";

/// Browser automation / test execution collaborator.
///
/// Implementations must make sure the spawned process is gone once
/// `timeout` has elapsed.
#[async_trait]
pub trait TestHarness: Send + Sync {
    async fn run(
        &self,
        test_file: &Path,
        workdir: &Path,
        timeout: Duration,
        headless: bool,
    ) -> Result<HarnessOutput, RunnerError>;
}

/// Runs `python -m pytest` (or a configured equivalent) as a child process.
#[derive(Debug, Clone)]
pub struct PytestHarness {
    program: String,
    base_args: Vec<String>,
    extra_args: Vec<String>,
}

impl PytestHarness {
    /// Build from a shell-style command line such as `python -m pytest`.
    pub fn new(command: &str, extra_args: Vec<String>) -> Result<Self, TestsmithError> {
        let mut parts = shlex::split(command)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                TestsmithError::Config(format!("cannot parse runner command '{}'", command))
            })?;
        let program = parts.remove(0);
        Ok(Self {
            program,
            base_args: parts,
            extra_args,
        })
    }

    pub fn from_config(config: &RunnerConfig) -> Result<Self, TestsmithError> {
        Self::new(&config.command, config.extra_args.clone())
    }

    /// Full argument list for one run.
    pub fn args_for(&self, test_file: &Path, headless: bool) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push(test_file.to_string_lossy().into_owned());
        args.extend(
            ["-v", "--tb=short", "-p", "no:cacheprovider", "--durations=0"]
                .iter()
                .map(|s| s.to_string()),
        );
        if !headless {
            args.push("--headed".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl TestHarness for PytestHarness {
    async fn run(
        &self,
        test_file: &Path,
        workdir: &Path,
        timeout: Duration,
        headless: bool,
    ) -> Result<HarnessOutput, RunnerError> {
        let args = self.args_for(test_file, headless);
        info!(
            command = %self.program,
            args = %args.join(" "),
            timeout_secs = timeout.as_secs(),
            "Starting test harness"
        );

        let child = Command::new(&self.program)
            .args(&args)
            .current_dir(workdir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::Spawn {
                command: self.program.clone(),
                message: e.to_string(),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| RunnerError::Timeout {
                seconds: timeout.as_secs(),
            })?
            .map_err(|e| RunnerError::Harness(e.to_string()))?;

        Ok(HarnessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            return_code: output.status.code(),
        })
    }
}

/// Materializes code, runs the harness under a hard deadline and parses the
/// report.
pub struct CodeRunner {
    harness: Arc<dyn TestHarness>,
    parser: Arc<dyn ReportParser>,
    timeout: Duration,
    buffer: Duration,
    headless: bool,
}

impl CodeRunner {
    pub fn new(harness: Arc<dyn TestHarness>) -> Self {
        Self {
            harness,
            parser: Arc::new(PytestTextParser),
            timeout: Duration::from_secs(60),
            buffer: Duration::from_secs(15),
            headless: true,
        }
    }

    pub fn from_config(config: &RunnerConfig, headless: bool) -> Result<Self, TestsmithError> {
        let harness = PytestHarness::from_config(config)?;
        Ok(Self::new(Arc::new(harness))
            .with_timeout(
                Duration::from_secs(config.timeout_secs),
                Duration::from_secs(config.timeout_buffer_secs),
            )
            .with_headless(headless))
    }

    pub fn with_parser(mut self, parser: Arc<dyn ReportParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Harness timeout plus the extra slack for the outer deadline.
    pub fn with_timeout(mut self, timeout: Duration, buffer: Duration) -> Self {
        self.timeout = timeout;
        self.buffer = buffer;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    /// Execute `code` and report what happened. Never fails.
    pub async fn run_tests(&self, code: &str) -> TestExecutionLog {
        let start = Instant::now();
        let workspace = match tempfile::Builder::new().prefix("testsmith-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                let err = RunnerError::Workspace(e.to_string());
                warn!(error = %err, "Could not create test workspace");
                return TestExecutionLog::harness_failure(err.to_string(), HarnessOutput::default(), 0.0);
            }
        };
        let test_file = workspace.path().join(TEST_FILE_NAME);

        let log = self.run_in(workspace.path(), &test_file, code, start).await;

        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove test workspace");
        } else {
            debug!(path = %path.display(), "Removed test workspace");
        }
        log
    }

    async fn run_in(
        &self,
        workdir: &Path,
        test_file: &Path,
        code: &str,
        start: Instant,
    ) -> TestExecutionLog {
        if let Err(e) = tokio::fs::write(test_file, code).await {
            let err = RunnerError::Workspace(e.to_string());
            return TestExecutionLog::harness_failure(err.to_string(), HarnessOutput::default(), 0.0);
        }

        let deadline = self.timeout + self.buffer;
        let outcome = tokio::time::timeout(
            deadline,
            track_call("harness", || {
                self.harness
                    .run(test_file, workdir, self.timeout, self.headless)
            }),
        )
        .await;
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(output)) => {
                let mut log = self.parser.parse(&output);
                if log.duration_secs == 0.0 {
                    log.duration_secs = elapsed;
                }
                if log.total() == 0 && output.return_code != Some(0) {
                    let message = format!(
                        "Harness exited with code {} and reported no test results",
                        output
                            .return_code
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "none (killed by signal)".into())
                    );
                    warn!(stderr = %loggable(&output.stderr), "{}", message);
                    log.errors = 1;
                    log.message = Some(message);
                }
                info!(
                    passed = log.passed,
                    failed = log.failed,
                    errors = log.errors,
                    skipped = log.skipped,
                    exit_code = ?log.return_code,
                    duration_secs = elapsed,
                    "Test run finished"
                );
                log
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Test harness failed");
                TestExecutionLog::harness_failure(e.to_string(), HarnessOutput::default(), elapsed)
            }
            Err(_) => {
                let err = RunnerError::Timeout {
                    seconds: deadline.as_secs(),
                };
                warn!(error = %err, "Test harness exceeded the hard deadline");
                TestExecutionLog::harness_failure(err.to_string(), HarnessOutput::default(), elapsed)
            }
        }
    }

    /// Run an existing test file from disk.
    pub async fn run_file(&self, path: &Path) -> Result<TestExecutionLog, RunnerError> {
        let code = tokio::fs::read_to_string(path).await.map_err(|_| RunnerError::MissingFile {
            path: PathBuf::from(path),
        })?;
        Ok(self.run_tests(&code).await)
    }
}

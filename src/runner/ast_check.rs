//! Syntax confirmation through the Python interpreter behind the runner.
//!
//! `syntax::check` runs first and catches most broken files without a
//! process spawn. When it passes, [`AstCheck`] hands the source to
//! `ast.parse` so the verdict matches what pytest will see. A missing or
//! hung interpreter is not a verdict: [`check_source`] then trusts the
//! structural check alone.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::RunnerConfig;
use crate::errors::RunnerError;
use crate::observability::telemetry::loggable;
use crate::syntax::{self, SyntaxError};

pub const DEFAULT_AST_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit status the script uses for "parsed, and the source is invalid".
const EXIT_INVALID: i32 = 3;

const PARSE_SCRIPT: &str = r#"import ast, sys
src = sys.stdin.buffer.read().decode("utf-8", "replace")
try:
    ast.parse(src, "test_generated.py")
except (SyntaxError, ValueError) as e:
    print("%d\t%s" % (getattr(e, "lineno", None) or 0, getattr(e, "msg", None) or e))
    sys.exit(3)
"#;

#[derive(Debug, Clone)]
pub struct AstCheck {
    program: String,
    timeout: Duration,
}

impl AstCheck {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_AST_CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The interpreter that starts the runner command, if the command starts
    /// with one (`python -m pytest` does, a bare `pytest` does not).
    pub fn from_runner_config(config: &RunnerConfig) -> Option<Self> {
        let program = shlex::split(&config.command)?.into_iter().next()?;
        let is_python = Path::new(&program)
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("python"));
        is_python.then(|| Self::new(program))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `Ok(None)` when the source parses, `Ok(Some(_))` with the first error
    /// when it does not, `Err` when the interpreter gave no answer.
    pub async fn parse(&self, source: &str) -> Result<Option<SyntaxError>, RunnerError> {
        let mut child = Command::new(&self.program)
            .args(["-c", PARSE_SCRIPT])
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::Spawn {
                command: self.program.clone(),
                message: e.to_string(),
            })?;

        let stdin = child.stdin.take();
        let input = source.as_bytes().to_vec();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RunnerError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| RunnerError::Harness(e.to_string()))?;

        match output.status.code() {
            Some(0) => Ok(None),
            Some(EXIT_INVALID) => Ok(Some(parse_report(&String::from_utf8_lossy(
                &output.stdout,
            )))),
            code => Err(RunnerError::Harness(format!(
                "parse check exited with {:?}: {}",
                code,
                loggable(&String::from_utf8_lossy(&output.stderr))
            ))),
        }
    }
}

/// `<line>\t<message>` as printed by the parse script.
fn parse_report(stdout: &str) -> SyntaxError {
    let first = stdout.lines().next().unwrap_or_default();
    let (line, message) = first.split_once('\t').unwrap_or(("0", first));
    let message = match message.trim() {
        "" => "invalid syntax",
        m => m,
    };
    SyntaxError::new(line.trim().parse().unwrap_or(0), message)
}

/// Structural check, then `ast.parse` when an interpreter is configured.
pub async fn check_source(ast: Option<&AstCheck>, source: &str) -> Result<(), SyntaxError> {
    syntax::check(source)?;
    let Some(ast) = ast else {
        return Ok(());
    };
    match ast.parse(source).await {
        Ok(None) => Ok(()),
        Ok(Some(err)) => {
            debug!(line = err.line, message = %err.message, "Interpreter rejected source");
            Err(err)
        }
        Err(e) => {
            warn!(
                interpreter = %ast.program,
                error = %e,
                "Interpreter parse check unavailable, keeping the structural verdict"
            );
            Ok(())
        }
    }
}

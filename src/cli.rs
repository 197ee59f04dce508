//! Command-line front end.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::api::ApiClient;
use crate::config::Config;
use crate::designer::{TestDesigner, DEFAULT_CASE_COUNT};
use crate::errors::{TestsmithError, EXIT_ERROR, EXIT_SUCCESS, EXIT_TESTS_FAILED};
use crate::generator::{
    CodeSource, FallbackGenerator, GenerationMetrics, GenerationOutcome, GenerationRequest,
    Generator, Refiner,
};
use crate::locator::analyze;
use crate::observability::telemetry::{init_tracing, init_tracing_verbose};
use crate::page::{load_elements, PageElement};
use crate::runner::{check_source, AstCheck, CodeRunner, TestExecutionLog, TestOutcome};
use crate::testcase::{load_test_cases, TestCase};
use crate::validator;

#[derive(Parser)]
#[command(name = "testsmith")]
#[command(about = "Generate Playwright tests with an LLM and fix them until they pass")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a test file from test cases and page elements
    Generate {
        /// Page under test
        #[arg(long)]
        url: String,

        /// Test cases: JSON array or free text
        #[arg(long, value_name = "FILE")]
        cases: PathBuf,

        /// Captured page elements (JSON)
        #[arg(long, value_name = "FILE")]
        elements: Option<PathBuf>,

        /// Suite name, used for the test class
        #[arg(long, default_value = "Generated Suite")]
        suite: String,

        /// Execute candidates and repair on failures
        #[arg(long)]
        run: bool,

        /// Show the browser while running
        #[arg(long)]
        headed: bool,

        /// Skip the model and use the template generator
        #[arg(long)]
        no_llm: bool,

        /// Extra instructions applied after generation
        #[arg(long, value_name = "TEXT")]
        instructions: Option<String>,

        /// Repair attempts after the first model call
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,

        /// Write the code here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run an existing test file
    Run {
        file: PathBuf,

        #[arg(long)]
        headed: bool,

        /// Harness timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        #[arg(long)]
        json: bool,
    },

    /// Check a test file without running it
    Validate {
        file: PathBuf,

        /// Test cases the file should implement
        #[arg(long, value_name = "FILE")]
        cases: Option<PathBuf>,
    },

    /// Show the recommended locator for each element
    Locators {
        #[arg(long, value_name = "FILE")]
        elements: PathBuf,
    },

    /// Ask the model to design test cases for a page
    Design {
        #[arg(long)]
        url: String,

        #[arg(long, value_name = "FILE")]
        elements: PathBuf,

        #[arg(long, default_value_t = DEFAULT_CASE_COUNT)]
        count: usize,

        /// Short description of the page layout
        #[arg(long, default_value = "")]
        structure: String,
    },

    /// Apply free-text instructions to an existing test file
    Refine {
        file: PathBuf,

        #[arg(long, value_name = "TEXT")]
        instructions: String,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Entry point; returns the process exit code.
pub async fn run() -> Result<u8> {
    let cli = Cli::parse();

    if cli.verbose {
        init_tracing_verbose();
    } else {
        init_tracing();
    }

    if cli.no_color || std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let config_path = cli.config.as_deref().map(expand_home);
    let mut config = Config::load(config_path.as_deref())?;

    match cli.command {
        Commands::Generate {
            url,
            cases,
            elements,
            suite,
            run,
            headed,
            no_llm,
            instructions,
            max_retries,
            output,
            json,
        } => {
            if run {
                config.generation.run_tests = true;
            }
            if headed {
                config.generation.headless = false;
            }
            if let Some(n) = max_retries {
                config.generation.max_retries = n;
            }
            config.validate()?;

            let cases = read_cases(&cases)?;
            let elements = match elements {
                Some(path) => read_elements(&path)?,
                None => Vec::new(),
            };
            let request = GenerationRequest {
                url: &url,
                suite_name: &suite,
                cases: &cases,
                elements: &elements,
            };

            let mut outcome = if no_llm {
                template_outcome(&config, &request).await?
            } else {
                let llm = Arc::new(ApiClient::new(&config)?);
                let generator = Generator::from_config(llm.clone(), &config)?;
                let mut outcome = generator.generate(&request).await;
                if let Some(text) = instructions.as_deref() {
                    let refiner = Refiner::from_config(llm, &config);
                    let refined = refiner.refine(&outcome.code, text).await;
                    outcome.code = refined.code;
                }
                outcome
            };
            if no_llm && instructions.is_some() {
                warn!("--instructions needs the model; ignored with --no-llm");
            }

            if !outcome.code.ends_with('\n') {
                outcome.code.push('\n');
            }
            if let Some(path) = &output {
                std::fs::write(path, &outcome.code)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                if output.is_none() {
                    print!("{}", outcome.code);
                }
                print_generation_summary(&outcome, output.as_deref());
            }

            Ok(match &outcome.execution_log {
                Some(log) if !log.all_passed() => EXIT_TESTS_FAILED,
                _ => EXIT_SUCCESS,
            })
        }

        Commands::Run {
            file,
            headed,
            timeout,
            json,
        } => {
            if let Some(secs) = timeout {
                config.runner.timeout_secs = secs;
            }
            config.validate()?;
            let runner = CodeRunner::from_config(&config.runner, !headed)?;
            let log = runner.run_file(&file).await.map_err(TestsmithError::from)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&log)?);
            } else {
                print_log(&log);
            }
            Ok(if log.all_passed() {
                EXIT_SUCCESS
            } else {
                EXIT_TESTS_FAILED
            })
        }

        Commands::Validate { file, cases } => {
            let code = read_source(&file)?;
            let cases = match cases {
                Some(path) => read_cases(&path)?,
                None => Vec::new(),
            };
            let mut report = validator::validate(&code, &cases);
            if report.ok {
                let ast = AstCheck::from_runner_config(&config.runner);
                if let Err(err) = check_source(ast.as_ref(), &code).await {
                    report.record_syntax_error(err);
                }
            }

            if report.ok {
                println!("{} {}", "✓".green(), "Syntax OK".bold());
            } else {
                println!("{} {}", "✗".red(), "Syntax error".bold());
            }
            for issue in &report.issues {
                println!("  {} {}", "•".yellow(), issue);
            }
            if report.is_clean() {
                println!("  No issues found");
            }
            Ok(if report.ok { EXIT_SUCCESS } else { EXIT_ERROR })
        }

        Commands::Locators { elements } => {
            let elements = read_elements(&elements)?;
            if elements.is_empty() {
                println!("No elements in file");
            }
            for (i, element) in elements.iter().enumerate() {
                let choice = analyze(element);
                let strategy = format!("[{}]", choice.strategy);
                let strategy = if choice.needs_manual_repair() {
                    strategy.red()
                } else {
                    strategy.cyan()
                };
                println!(
                    "{:>3}. {:<8} {} {}",
                    i + 1,
                    element.tag,
                    strategy,
                    choice.expression
                );
                println!("     {}", choice.reason.dimmed());
            }
            Ok(EXIT_SUCCESS)
        }

        Commands::Design {
            url,
            elements,
            count,
            structure,
        } => {
            config.validate()?;
            let elements = read_elements(&elements)?;
            let llm = Arc::new(ApiClient::new(&config)?);
            let designer =
                TestDesigner::new(llm, Duration::from_secs(config.generation.model_timeout_secs));
            let outcome = designer.design(&url, &structure, &elements, count).await;
            if !outcome.from_model {
                eprintln!(
                    "{} model did not return usable test cases; showing placeholders",
                    "warning:".yellow()
                );
            }
            println!("{}", serde_json::to_string_pretty(&outcome.cases)?);
            eprintln!("Coverage: {:.1}%", outcome.coverage);
            Ok(EXIT_SUCCESS)
        }

        Commands::Refine {
            file,
            instructions,
            output,
        } => {
            config.validate()?;
            let code = read_source(&file)?;
            let llm = Arc::new(ApiClient::new(&config)?);
            let refiner = Refiner::from_config(llm, &config);
            let result = refiner.refine(&code, &instructions).await;

            match &output {
                Some(path) => std::fs::write(path, &result.code)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{}", result.code),
            }
            match &result.reason {
                None => eprintln!("{} Refinement applied", "✓".green()),
                Some(reason) => eprintln!("{} Original kept: {}", "•".yellow(), reason),
            }
            Ok(EXIT_SUCCESS)
        }
    }
}

/// Template-only generation, executed once when running is enabled.
async fn template_outcome(
    config: &Config,
    request: &GenerationRequest<'_>,
) -> Result<GenerationOutcome> {
    let code = FallbackGenerator::new().generate(request);
    let issues = validator::validate(&code, request.cases).issues;
    let execution_log = if config.generation.run_tests {
        let runner = CodeRunner::from_config(&config.runner, config.generation.headless)?;
        Some(runner.run_tests(&code).await)
    } else {
        None
    };
    Ok(GenerationOutcome {
        code,
        execution_log,
        source: CodeSource::Fallback,
        issues,
        metrics: GenerationMetrics {
            used_fallback: true,
            ..Default::default()
        },
    })
}

fn expand_home(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest).to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string()),
        None => path.to_string(),
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        TestsmithError::Input(format!("cannot read {}: {}", path.display(), e)).into()
    })
}

fn read_cases(path: &Path) -> Result<Vec<TestCase>> {
    load_test_cases(path).map_err(|e| TestsmithError::Input(format!("{:#}", e)).into())
}

fn read_elements(path: &Path) -> Result<Vec<PageElement>> {
    load_elements(path).map_err(|e| TestsmithError::Input(format!("{:#}", e)).into())
}

fn print_generation_summary(outcome: &GenerationOutcome, output: Option<&Path>) {
    let source = match outcome.source {
        CodeSource::Model => "model".green(),
        CodeSource::Fallback => "template fallback".yellow(),
    };
    eprintln!();
    eprintln!(
        "{} Generated with {} ({} model calls, {} attempts, {} ms)",
        "✓".green(),
        source,
        outcome.metrics.model_calls,
        outcome.metrics.attempts,
        outcome.metrics.duration_ms
    );
    if let Some(path) = output {
        eprintln!("  Written to {}", path.display());
    }
    for issue in outcome.issues.iter().take(10) {
        eprintln!("  {} {}", "•".yellow(), issue);
    }
    if let Some(log) = &outcome.execution_log {
        eprintln!();
        print_log_to_stderr(log);
    }
}

fn log_lines(log: &TestExecutionLog) -> Vec<String> {
    let mut lines = Vec::new();
    for result in &log.results {
        let status = match result.outcome {
            TestOutcome::Passed => "PASSED".green(),
            TestOutcome::Failed => "FAILED".red(),
            TestOutcome::Error => "ERROR".red(),
            TestOutcome::Skipped => "SKIPPED".yellow(),
        };
        lines.push(format!("  {} {} ({:.2}s)", status, result.name, result.duration_secs));
        if let (Some(kind), Some(message)) = (&result.error_type, &result.error_message) {
            let at = result
                .error_line
                .map(|line| format!(" (line {})", line))
                .unwrap_or_default();
            lines.push(format!("      {}: {}{}", kind, message, at).dimmed().to_string());
        }
    }
    if let Some(message) = &log.message {
        lines.push(format!("  {}", message.red()));
    }
    lines.push(format!(
        "{} passed, {} failed, {} errors, {} skipped in {:.2}s ({:.0}% success)",
        log.passed,
        log.failed,
        log.errors,
        log.skipped,
        log.duration_secs,
        log.success_rate() * 100.0
    ));
    lines
}

fn print_log(log: &TestExecutionLog) {
    for line in log_lines(log) {
        println!("{}", line);
    }
}

fn print_log_to_stderr(log: &TestExecutionLog) {
    for line in log_lines(log) {
        eprintln!("{}", line);
    }
}

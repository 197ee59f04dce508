//! Configuration flowing from a TOML file into the components that use it

use std::io::Write;
use std::time::Duration;

use testsmith::config::Config;
use testsmith::generator::GenerationOptions;
use testsmith::prompt::PromptBuilder;
use testsmith::runner::{CodeRunner, PytestHarness};
use testsmith::TestsmithError;

fn write_config(toml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    file
}

const FULL: &str = r#"
endpoint = "https://llm.internal.example/v1"
model = "coder-large"
max_tokens = 8192
temperature = 0.1

[generation]
max_retries = 4
run_tests = true
headless = false
model_timeout_secs = 45
evidence_budget_chars = 1200
max_prompt_elements = 12

[runner]
command = "python3 -m pytest"
extra_args = ["--maxfail=1"]
timeout_secs = 30
timeout_buffer_secs = 5
"#;

#[test]
fn test_sections_reach_components() {
    let file = write_config(FULL);
    let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();
    assert!(config.validate().is_ok());

    let options = GenerationOptions::from_config(&config.generation);
    assert_eq!(options.max_retries, 4);
    assert!(options.run_tests);
    assert_eq!(options.model_timeout, Duration::from_secs(45));

    assert_eq!(PromptBuilder::from_config(&config.generation).evidence_budget(), 1200);

    let harness = PytestHarness::from_config(&config.runner).unwrap();
    assert_eq!(harness.program(), "python3");
    let args = harness.args_for(std::path::Path::new("test_generated.py"), false);
    assert_eq!(&args[..2], &["-m".to_string(), "pytest".to_string()]);
    assert!(args.contains(&"test_generated.py".to_string()));
    assert!(args.contains(&"--maxfail=1".to_string()));

    let runner = CodeRunner::from_config(&config.runner, config.generation.headless).unwrap();
    assert!(!runner.headless());
}

#[test]
fn test_minimal_file_keeps_defaults() {
    let file = write_config("model = \"small\"\n");
    let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();
    let defaults = Config::default();
    assert_eq!(config.generation.max_retries, defaults.generation.max_retries);
    assert_eq!(config.runner.command, "python -m pytest");
    assert!(!config.generation.run_tests);
}

#[test]
fn test_zero_runner_timeout_rejected() {
    let file = write_config("[runner]\ntimeout_secs = 0\n");
    let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();
    match config.validate() {
        Err(TestsmithError::Config(msg)) => assert!(msg.contains("timeout_secs")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_unterminated_runner_command_rejected() {
    let file = write_config("[runner]\ncommand = \"python -m 'pytest\"\n");
    let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();
    assert!(matches!(config.validate(), Err(TestsmithError::Config(_))));
    assert!(PytestHarness::from_config(&config.runner).is_err());
}

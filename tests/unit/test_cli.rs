//! End-to-end checks of the binary that need no model and no browser

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

use crate::helpers::GOOD_CODE;

fn file_with(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[allow(deprecated)]
fn testsmith() -> Command {
    let mut cmd = Command::cargo_bin("testsmith").unwrap();
    cmd.arg("--no-color")
        .env_remove("TESTSMITH_ENDPOINT")
        .env_remove("TESTSMITH_TIMEOUT");
    cmd
}

#[test]
fn test_cli_help() {
    testsmith()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("locators"));
}

#[test]
fn test_cli_validate_good_file() {
    let file = file_with(".py", GOOD_CODE);
    testsmith()
        .arg("validate")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Syntax OK"));
}

#[test]
fn test_cli_validate_broken_file() {
    let broken = GOOD_CODE.replace("class TestLogin:", "class TestLogin");
    let file = file_with(".py", &broken);
    testsmith()
        .arg("validate")
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Syntax error"));
}

#[test]
fn test_cli_validate_rejects_missing_comma() {
    let broken = GOOD_CODE.replace("(self, page: Page)", "(self page: Page)");
    let file = file_with(".py", &broken);
    testsmith()
        .arg("validate")
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("forgot a comma"));
}

#[test]
fn test_cli_validate_missing_file_is_input_error() {
    testsmith()
        .args(["validate", "/no/such/test_file.py"])
        .assert()
        .code(3);
}

#[test]
fn test_cli_locators() {
    let elements = file_with(
        ".json",
        r#"[{"tag": "button", "text": "Login", "id": "ember42"}, {"tag": "div"}]"#,
    );
    testsmith()
        .arg("locators")
        .arg("--elements")
        .arg(elements.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("page.get_by_role(\"button\", name=\"Login\")"))
        .stdout(predicate::str::contains("page.locator(\"div\")"));
}

#[test]
fn test_cli_generate_without_model() {
    let cases = file_with(
        ".txt",
        "Test 1: Submit empty form\nDescription: Submit with no input\nSteps:\n1. Click the Submit button\nExpected: Validation errors are shown\nPriority: High\n",
    );
    let elements = file_with(".json", r#"[{"tag": "button", "text": "Submit"}]"#);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("test_form.py");

    testsmith()
        .arg("generate")
        .args(["--url", "https://example.com/form", "--suite", "Form Checks", "--no-llm"])
        .arg("--cases")
        .arg(cases.path())
        .arg("--elements")
        .arg(elements.path())
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let code = std::fs::read_to_string(&out).unwrap();
    assert!(code.contains("class TestFormChecks:"));
    assert!(code.contains("def test_submit_empty_form(self, page: Page):"));
    assert!(code.contains("web_page.get_submit_button().click()"));
}

#[test]
fn test_cli_generate_json_outcome() {
    let cases = file_with(".json", r#"[{"name": "Open home page"}]"#);
    let assert = testsmith()
        .arg("generate")
        .args(["--url", "https://example.com", "--no-llm", "--json"])
        .arg("--cases")
        .arg(cases.path())
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["source"], "fallback");
    assert_eq!(outcome["metrics"]["model_calls"], 0);
    assert!(outcome["code"].as_str().unwrap().contains("def test_open_home_page"));
}

#[test]
fn test_cli_generate_bad_config_exit_code() {
    let config = file_with(".toml", "endpoint = \"ftp://example.com\"\n");
    let cases = file_with(".txt", "anything");
    testsmith()
        .arg("--config")
        .arg(config.path())
        .arg("generate")
        .args(["--url", "https://example.com", "--no-llm"])
        .arg("--cases")
        .arg(cases.path())
        .assert()
        .code(2);
}

#[test]
fn test_cli_run_missing_file_fails() {
    testsmith()
        .args(["run", "/no/such/test_generated.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Test file not found"));
}

//! Bad inputs at the edges and the exit codes they map to

use std::io::Write;
use std::path::Path;

use testsmith::errors::{
    get_exit_code, ApiError, ExtractionError, EXIT_API_ERROR, EXIT_CONFIG_ERROR, EXIT_ERROR,
    EXIT_INPUT_ERROR,
};
use testsmith::extract::extract_code;
use testsmith::page::load_elements;
use testsmith::runner::PytestHarness;
use testsmith::testcase::load_test_cases;
use testsmith::TestsmithError;

fn temp_with(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_elements_file_missing() {
    let err = load_elements(Path::new("/definitely/not/here/elements.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read elements"));
}

#[test]
fn test_elements_file_not_json() {
    let file = temp_with("<html>not json</html>");
    let err = load_elements(file.path()).unwrap_err();
    assert!(err.to_string().contains("not valid JSON"));
}

#[test]
fn test_elements_wrong_shape() {
    let file = temp_with(r#"{"elements": "button"}"#);
    assert!(load_elements(file.path()).is_err());
}

#[test]
fn test_elements_object_without_list_is_empty() {
    let file = temp_with(r#"{"url": "https://example.com"}"#);
    assert!(load_elements(file.path()).unwrap().is_empty());
}

#[test]
fn test_cases_json_missing_field() {
    let file = temp_with(r#"{"cases": []}"#);
    let err = load_test_cases(file.path()).unwrap_err();
    assert!(err.to_string().contains("test_cases"));
}

#[test]
fn test_cases_json_renumbered_and_deduplicated() {
    let file = temp_with(
        r#"[
            {"id": 7, "name": "Login", "steps": ["Open page"], "priority": "high"},
            {"id": 9, "name": "login", "steps": ["open page"]},
            {"name": "Logout", "expected": "Session ends"}
        ]"#,
    );
    let cases = load_test_cases(file.path()).unwrap();
    assert_eq!(cases.len(), 2);
    assert_eq!((cases[0].id, cases[1].id), (1, 2));
    assert_eq!(cases[1].expected_outcome, "Session ends");
}

#[test]
fn test_cases_free_text_never_fails() {
    let file = temp_with("just some notes about the page");
    let cases = load_test_cases(file.path()).unwrap();
    assert!(!cases.is_empty());
}

#[test]
fn test_blank_harness_command_is_config_error() {
    let err = PytestHarness::new("   ", vec![]).unwrap_err();
    assert!(matches!(err, TestsmithError::Config(_)));
    assert_eq!(get_exit_code(&anyhow::Error::from(err)), EXIT_CONFIG_ERROR);
}

#[test]
fn test_exit_code_mapping() {
    let input = anyhow::Error::from(TestsmithError::Input("cases file missing".into()));
    assert_eq!(get_exit_code(&input), EXIT_INPUT_ERROR);

    let api = anyhow::Error::from(TestsmithError::Api(ApiError::Timeout));
    assert_eq!(get_exit_code(&api), EXIT_API_ERROR);

    let extraction = anyhow::Error::from(TestsmithError::Extraction(ExtractionError::NotCode));
    assert_eq!(get_exit_code(&extraction), EXIT_ERROR);

    let wrapped = anyhow::anyhow!("Failed to parse config");
    assert_eq!(get_exit_code(&wrapped), EXIT_CONFIG_ERROR);
}

#[test]
fn test_extraction_errors() {
    assert_eq!(extract_code("   \n  "), Err(ExtractionError::Empty));
    assert_eq!(extract_code("<think>only thoughts</think>"), Err(ExtractionError::Empty));
    let prose = "I am sorry, but I cannot produce the requested test file because the page \
                 description is incomplete. Please provide more details about the form.";
    assert_eq!(extract_code(prose), Err(ExtractionError::NotCode));
}

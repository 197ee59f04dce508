//! Real pytest runs through the runner and the text report parser

use std::time::Duration;
use testsmith::runner::{check_source, AstCheck, CodeRunner, TestOutcome};
use testsmith::syntax;

use crate::{skip_if_no_pytest, test_config};

fn runner() -> CodeRunner {
    let config = test_config();
    CodeRunner::from_config(&config.runner, true)
        .unwrap()
        .with_timeout(Duration::from_secs(60), Duration::from_secs(15))
}

const MIXED: &str = r#"import pytest


class TestMixed:
    def test_ok(self):
        assert 1 + 1 == 2

    def test_wrong_title(self):
        title = "Home"
        assert title == "Login", "title mismatch"

    @pytest.mark.skip(reason="not today")
    def test_skipped(self):
        pass
"#;

#[tokio::test]
async fn test_real_pytest_mixed_results() {
    skip_if_no_pytest!();
    let log = runner().run_tests(MIXED).await;

    assert_eq!((log.passed, log.failed, log.skipped), (1, 1, 1), "{}", log.stdout);
    assert_eq!(log.return_code, Some(1));
    let failed = log
        .results
        .iter()
        .find(|r| r.outcome == TestOutcome::Failed)
        .unwrap();
    assert_eq!(failed.name, "test_wrong_title");
    assert_eq!(failed.error_type.as_deref(), Some("AssertionError"));
    assert!(failed.error_message.as_deref().unwrap_or("").contains("title mismatch"));
    assert!(log.failure_summary(2000).contains("- test_wrong_title: AssertionError"));
}

#[tokio::test]
async fn test_real_pytest_all_pass() {
    skip_if_no_pytest!();
    let code = "class TestOk:\n    def test_one(self):\n        assert True\n\n    def test_two(self):\n        assert [1][0] == 1\n";
    let log = runner().run_tests(code).await;
    assert!(log.all_passed(), "{}", log.stdout);
    assert_eq!(log.passed, 2);
    assert_eq!(log.success_rate(), 1.0);
}

#[tokio::test]
async fn test_real_pytest_collection_error() {
    skip_if_no_pytest!();
    let code = "import module_that_does_not_exist_anywhere\n\n\ndef test_never_runs():\n    assert True\n";
    let log = runner().run_tests(code).await;
    assert!(!log.all_passed());
    assert!(log.errors >= 1, "{}", log.stdout);
    assert_eq!(log.passed, 0);
}

#[tokio::test]
async fn test_real_pytest_timeout() {
    skip_if_no_pytest!();
    let code = "import time\n\n\ndef test_slow():\n    time.sleep(30)\n";
    let log = runner()
        .with_timeout(Duration::from_secs(2), Duration::from_secs(2))
        .run_tests(code)
        .await;
    assert!(!log.all_passed());
    assert!(log.message.is_some());
}

#[tokio::test]
async fn test_interpreter_parse_check() {
    skip_if_no_pytest!();
    let ast = AstCheck::from_runner_config(&test_config().runner).unwrap();

    assert_eq!(ast.parse(MIXED).await.unwrap(), None);
    for slip in [
        "def f(self page):\n    pass\n",
        "x = = 1\n",
        "print \"login\"\n",
    ] {
        let err = ast.parse(slip).await.unwrap().expect(slip);
        assert_eq!(err.line, 1, "{}", slip);
    }

    // structurally plausible, rejected only by the interpreter
    let assign_to_expression = "x + 1 = 2\n";
    assert!(syntax::is_valid(assign_to_expression));
    let err = check_source(Some(&ast), assign_to_expression)
        .await
        .unwrap_err();
    assert_eq!(err.line, 1);
}

//! Code Runner tests: workspace lifecycle, degradation and report parsing

use std::sync::Arc;
use std::time::Duration;

use testsmith::runner::{
    CodeRunner, HarnessOutput, PytestTextParser, ReportParser, TestExecutionLog, TestOutcome,
    TEST_FILE_NAME,
};

use crate::helpers::{failing_output, passing_output, Scripted, ScriptedHarness, GOOD_CODE};

fn runner(harness: Arc<ScriptedHarness>) -> CodeRunner {
    CodeRunner::new(harness).with_timeout(Duration::from_secs(2), Duration::from_secs(1))
}

mod workspace {
    use super::*;

    async fn assert_cleaned_after(outcome: Scripted) -> TestExecutionLog {
        let harness = Arc::new(ScriptedHarness::new(vec![outcome]));
        let log = runner(harness.clone()).run_tests(GOOD_CODE).await;

        let dirs = harness.seen_workdirs.lock().unwrap().clone();
        assert_eq!(dirs.len(), 1);
        assert!(!dirs[0].exists(), "workspace {} left behind", dirs[0].display());
        assert_eq!(harness.seen_code.lock().unwrap()[0], GOOD_CODE);
        log
    }

    #[tokio::test]
    async fn test_cleanup_after_pass() {
        let log = assert_cleaned_after(Scripted::Output(passing_output("test_a"))).await;
        assert!(log.all_passed());
    }

    #[tokio::test]
    async fn test_cleanup_after_failure() {
        let log = assert_cleaned_after(Scripted::Output(failing_output(
            "test_a",
            "AssertionError: nope",
            3,
        )))
        .await;
        assert_eq!(log.failed, 1);
    }

    #[tokio::test]
    async fn test_cleanup_after_crash() {
        let log = assert_cleaned_after(Scripted::Crash("segfault".into())).await;
        assert_eq!(log.errors, 1);
        assert!(log.message.unwrap().contains("segfault"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_after_hard_timeout() {
        let log = assert_cleaned_after(Scripted::Hang).await;
        assert_eq!(log.errors, 1);
        assert_eq!(log.total(), 1);
        assert!(log.message.unwrap().contains("timed out after 3 seconds"));
    }

    #[tokio::test]
    async fn test_file_name_is_collectable() {
        assert!(TEST_FILE_NAME.starts_with("test_"));
        assert!(TEST_FILE_NAME.ends_with(".py"));
    }
}

mod degradation {
    use super::*;

    #[tokio::test]
    async fn test_collection_error_without_results() {
        let harness = Arc::new(ScriptedHarness::new(vec![Scripted::Output(HarnessOutput {
            stdout: "ERROR: file or directory not found\n".into(),
            stderr: "ModuleNotFoundError: No module named 'playwright'\n".into(),
            return_code: Some(4),
        })]));
        let log = runner(harness).run_tests(GOOD_CODE).await;
        assert_eq!(log.errors, 1);
        assert!(!log.all_passed());
        assert!(log
            .message
            .as_deref()
            .unwrap()
            .contains("exited with code 4"));
        assert!(log.failure_summary(2000).contains("No module named 'playwright'"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let harness = Arc::new(ScriptedHarness::new(vec![]));
        let result = runner(harness.clone())
            .run_file(std::path::Path::new("/nonexistent/test_x.py"))
            .await;
        assert!(result.is_err());
        assert_eq!(harness.run_count(), 0);
    }
}

mod parsing {
    use super::*;

    fn parse(stdout: &str) -> TestExecutionLog {
        PytestTextParser.parse(&HarnessOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            return_code: Some(1),
        })
    }

    #[test]
    fn test_failed_login_scenario() {
        let out = "test_login FAILED\n\
                   =================================== FAILURES ===================================\n\
                   _________________________________ test_login _________________________________\n\
                   E   AssertionError: expected url to match\n\
                   test_generated.py:12: AssertionError\n";
        let log = parse(out);
        assert_eq!(log.failed, 1);
        assert_eq!(log.results.len(), 1);
        let result = &log.results[0];
        assert!(!result.passed);
        assert_eq!(result.outcome, TestOutcome::Failed);
        assert_eq!(result.error_type.as_deref(), Some("AssertionError"));
        assert!(!result.error_message.as_deref().unwrap_or("").is_empty());
        assert_eq!(result.error_line, Some(12));
    }

    #[test]
    fn test_mixed_statuses() {
        let out = "test_generated.py::TestS::test_a PASSED [ 25%]\n\
                   test_generated.py::TestS::test_b FAILED [ 50%]\n\
                   test_generated.py::TestS::test_c SKIPPED (no login) [ 75%]\n\
                   test_generated.py::TestS::test_d ERROR [100%]\n\
                   ============ 1 failed, 1 passed, 1 skipped, 1 error in 4.02s ============\n";
        let log = parse(out);
        assert_eq!((log.passed, log.failed, log.skipped, log.errors), (1, 1, 1, 1));
        assert_eq!(log.total(), 4);
        assert!((log.success_rate() - 0.25).abs() < f64::EPSILON);
        assert!((log.duration_secs - 4.02).abs() < 1e-9);
    }

    #[test]
    fn test_summary_fallback_when_no_per_test_lines() {
        let out = "..F.\n========================= 1 failed, 3 passed in 0.50s =========================\n";
        let log = parse(out);
        assert_eq!(log.passed, 3);
        assert_eq!(log.failed, 1);
        assert!(log.results.is_empty());
    }

    #[test]
    fn test_empty_output() {
        let log = parse("");
        assert_eq!(log.total(), 0);
        assert_eq!(log.success_rate(), 0.0);
    }

    #[test]
    fn test_long_message_truncated() {
        let long = "x".repeat(1000);
        let out = format!(
            "test_a FAILED\n\
             =================================== FAILURES ===================================\n\
             ________________________________ test_a ________________________________\n\
             E   ValueError: {}\n",
            long
        );
        let log = parse(&out);
        let message = log.results[0].error_message.as_deref().unwrap();
        assert!(message.chars().count() <= 203);
        assert_eq!(log.results[0].error_type.as_deref(), Some("ValueError"));
    }
}

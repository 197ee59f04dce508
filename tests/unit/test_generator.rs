//! Self-correction loop tests with scripted collaborators

use std::sync::Arc;
use std::time::Duration;

use testsmith::api::types::Completion;
use testsmith::generator::{CodeSource, GenerationOptions, GenerationRequest, Generator};
use testsmith::page::PageElement;
use testsmith::runner::CodeRunner;
use testsmith::syntax;
use testsmith::testcase::{renumber, TestCase};

use crate::helpers::{failing_output, passing_output, Scripted, ScriptedHarness, ScriptedLlm, GOOD_CODE};

fn cases(names: &[&str]) -> Vec<TestCase> {
    let mut cases: Vec<TestCase> = names.iter().map(|n| TestCase::new(*n)).collect();
    renumber(&mut cases);
    cases
}

fn login_elements() -> Vec<PageElement> {
    vec![PageElement::new("button").with_text("Login").with_id("ember42")]
}

fn options(max_retries: u32, run_tests: bool) -> GenerationOptions {
    GenerationOptions {
        max_retries,
        run_tests,
        model_timeout: Duration::from_secs(30),
    }
}

fn runner(harness: Arc<ScriptedHarness>) -> CodeRunner {
    CodeRunner::new(harness).with_timeout(Duration::from_secs(10), Duration::from_secs(5))
}

mod repair_loop {
    use super::*;

    #[tokio::test]
    async fn test_execution_evidence_reaches_repair_prompt() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::from(GOOD_CODE)),
            Ok(Completion::from(GOOD_CODE)),
        ]));
        let harness = Arc::new(ScriptedHarness::new(vec![
            Scripted::Output(failing_output(
                "test_click_login_button",
                "playwright._impl._errors.TimeoutError: Locator.click: Timeout 30000ms exceeded.",
                18,
            )),
            Scripted::Output(passing_output("test_click_login_button")),
        ]));
        let generator =
            Generator::new(llm.clone(), options(2, true)).with_runner(runner(harness.clone()));

        let cases = cases(&["Click Login button"]);
        let elements = login_elements();
        let outcome = generator
            .generate(&GenerationRequest {
                url: "https://example.com",
                suite_name: "Login",
                cases: &cases,
                elements: &elements,
            })
            .await;

        assert_eq!(outcome.source, CodeSource::Model);
        assert_eq!(llm.call_count(), 2);
        assert_eq!(harness.run_count(), 2);
        let log = outcome.execution_log.expect("execution log");
        assert!(log.all_passed());
        assert_eq!(log.passed, 1);

        let repair = llm.user_prompt(1);
        assert!(repair.contains(
            "- test_click_login_button: TimeoutError: Locator.click: Timeout 30000ms exceeded. (line 18)"
        ));
        assert!(repair.contains("role=button") || repair.contains("get_by_role"));
    }

    #[tokio::test]
    async fn test_failing_runs_exhaust_budget_and_keep_last_log() {
        let llm = Arc::new(ScriptedLlm::always(GOOD_CODE));
        let harness = Arc::new(ScriptedHarness::new(
            (0..10)
                .map(|_| {
                    Scripted::Output(failing_output(
                        "test_click_login_button",
                        "AssertionError: expected url to match",
                        19,
                    ))
                })
                .collect(),
        ));
        let generator =
            Generator::new(llm.clone(), options(2, true)).with_runner(runner(harness.clone()));

        let cases = cases(&["Click Login button"]);
        let outcome = generator
            .generate(&GenerationRequest {
                url: "https://example.com",
                suite_name: "Login",
                cases: &cases,
                elements: &[],
            })
            .await;

        assert_eq!(llm.call_count(), 3);
        assert_eq!(harness.run_count(), 3);
        assert_eq!(outcome.source, CodeSource::Model);
        let log = outcome.execution_log.expect("execution log");
        assert!(!log.all_passed());
        assert_eq!(log.results[0].error_type.as_deref(), Some("AssertionError"));
    }

    #[tokio::test]
    async fn test_harness_crash_is_evidence_not_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::from(GOOD_CODE)),
            Ok(Completion::from(GOOD_CODE)),
        ]));
        let harness = Arc::new(ScriptedHarness::new(vec![
            Scripted::Crash("browser closed unexpectedly".into()),
            Scripted::Output(passing_output("test_click_login_button")),
        ]));
        let generator =
            Generator::new(llm.clone(), options(2, true)).with_runner(runner(harness));

        let cases = cases(&["Click Login button"]);
        let outcome = generator
            .generate(&GenerationRequest {
                url: "https://example.com",
                suite_name: "Login",
                cases: &cases,
                elements: &[],
            })
            .await;

        assert!(outcome.execution_log.unwrap().all_passed());
        assert!(llm.user_prompt(1).contains("browser closed unexpectedly"));
    }

    #[tokio::test]
    async fn test_static_only_mode_never_executes() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(Completion::from(GOOD_CODE))]));
        let harness = Arc::new(ScriptedHarness::new(vec![]));
        let generator =
            Generator::new(llm.clone(), options(2, false)).with_runner(runner(harness.clone()));

        let cases = cases(&["Click Login button"]);
        let outcome = generator
            .generate(&GenerationRequest {
                url: "https://example.com",
                suite_name: "Login",
                cases: &cases,
                elements: &[],
            })
            .await;

        assert_eq!(harness.run_count(), 0);
        assert!(outcome.execution_log.is_none());
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_syntax_error_skips_execution() {
        let broken = GOOD_CODE.replace("class TestLogin:", "class TestLogin");
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(Completion::from(broken)),
            Ok(Completion::from(GOOD_CODE)),
        ]));
        let harness = Arc::new(ScriptedHarness::new(vec![]));
        let generator =
            Generator::new(llm.clone(), options(2, true)).with_runner(runner(harness.clone()));

        let cases = cases(&["Click Login button"]);
        let outcome = generator
            .generate(&GenerationRequest {
                url: "https://example.com",
                suite_name: "Login",
                cases: &cases,
                elements: &[],
            })
            .await;

        assert_eq!(harness.run_count(), 1);
        assert!(llm.user_prompt(1).contains("Syntax error at line"));
        assert_eq!(outcome.source, CodeSource::Model);
    }
}

mod totality {
    use super::*;

    #[tokio::test]
    async fn test_retry_bound_holds_for_any_budget() {
        let broken = "import re\n\ndef test_x(:\n    pass\n".repeat(10);
        for max_retries in 0..4u32 {
            let llm = Arc::new(ScriptedLlm::always(&broken));
            let generator = Generator::new(llm.clone(), options(max_retries, false));
            let cases = cases(&["Anything"]);
            let outcome = generator
                .generate(&GenerationRequest {
                    url: "https://example.com",
                    suite_name: "Suite",
                    cases: &cases,
                    elements: &[],
                })
                .await;
            assert_eq!(llm.call_count() as u32, max_retries + 1);
            assert_eq!(outcome.metrics.model_calls, max_retries + 1);
            assert_eq!(outcome.source, CodeSource::Fallback);
            assert!(syntax::is_valid(&outcome.code));
        }
    }

    #[tokio::test]
    async fn test_garbage_model_yields_one_test_per_case() {
        let llm = Arc::new(ScriptedLlm::always("not code at all"));
        let generator = Generator::new(llm.clone(), options(2, true));
        let cases = cases(&["Click Login button", "Fill search box"]);
        let elements = login_elements();
        let outcome = generator
            .generate(&GenerationRequest {
                url: "https://example.com",
                suite_name: "Suite",
                cases: &cases,
                elements: &elements,
            })
            .await;

        assert_eq!(llm.call_count(), 1);
        assert_eq!(outcome.metrics.attempts, 0);
        assert_eq!(outcome.source, CodeSource::Fallback);
        assert!(!outcome.code.is_empty());
        assert!(syntax::is_valid(&outcome.code));
        assert!(outcome.code.contains("def test_click_login_button("));
        assert!(outcome.code.contains("def test_fill_search_box("));
    }

    #[tokio::test]
    async fn test_unreachable_model_yields_fallback() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(anyhow::anyhow!("connection refused"))]));
        let generator = Generator::new(llm, options(2, false));
        let cases = cases(&["Header Presence"]);
        let outcome = generator
            .generate(&GenerationRequest {
                url: "https://example.com",
                suite_name: "Suite",
                cases: &cases,
                elements: &[],
            })
            .await;
        assert!(outcome.metrics.used_fallback);
        assert!(outcome.code.contains("def test_header_presence("));
    }

    #[tokio::test]
    async fn test_fenced_structured_reply_accepted() {
        let reply = format!("Sure! Here is the file:\n\n```python\n{}```\n", GOOD_CODE);
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(Completion::from(reply))]));
        let generator = Generator::new(llm, options(2, false));
        let cases = cases(&["Click Login button"]);
        let outcome = generator
            .generate(&GenerationRequest {
                url: "https://example.com",
                suite_name: "Suite",
                cases: &cases,
                elements: &[],
            })
            .await;
        assert_eq!(outcome.source, CodeSource::Model);
        assert!(outcome.code.starts_with("import re"));
        assert!(!outcome.code.contains("```"));
    }
}

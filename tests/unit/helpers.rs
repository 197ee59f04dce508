//! Scripted collaborators for deterministic loop tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use testsmith::api::types::{Completion, Message};
use testsmith::api::LlmClient;
use testsmith::errors::RunnerError;
use testsmith::runner::{HarnessOutput, TestHarness};

/// A clean, complete file for a single "Click Login button" case.
pub const GOOD_CODE: &str = r#"import re
import pytest
from playwright.sync_api import Page, expect


class WebPage:
    def __init__(self, page: Page):
        self.page = page

    def get_login_button(self):
        return self.page.get_by_role("button", name="Login")


class TestLogin:
    def test_click_login_button(self, page: Page):
        page.goto("https://example.com")
        page.wait_for_load_state("domcontentloaded")
        WebPage(page).get_login_button().click()
        expect(page).to_have_url(re.compile(".*"))
"#;

/// Language model that replays queued replies and records every request.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<anyhow::Result<Completion>>>,
    requests: Mutex<Vec<(Vec<Message>, Option<Vec<String>>)>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<anyhow::Result<Completion>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with `text` forever.
    pub fn always(text: &str) -> Self {
        Self::new(
            (0..64)
                .map(|_| Ok(Completion::from(text.to_string())))
                .collect(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// User message of the n-th request.
    pub fn user_prompt(&self, n: usize) -> String {
        let requests = self.requests.lock().unwrap();
        requests[n]
            .0
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        messages: Vec<Message>,
        stop: Option<Vec<String>>,
    ) -> anyhow::Result<Completion> {
        self.requests.lock().unwrap().push((messages, stop));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
    }
}

/// Harness outcome to replay.
pub enum Scripted {
    Output(HarnessOutput),
    Crash(String),
    Hang,
}

/// Test harness that replays queued outcomes and records what it was given.
pub struct ScriptedHarness {
    outcomes: Mutex<VecDeque<Scripted>>,
    pub seen_code: Mutex<Vec<String>>,
    pub seen_workdirs: Mutex<Vec<PathBuf>>,
}

impl ScriptedHarness {
    pub fn new(outcomes: Vec<Scripted>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            seen_code: Mutex::new(Vec::new()),
            seen_workdirs: Mutex::new(Vec::new()),
        }
    }

    pub fn run_count(&self) -> usize {
        self.seen_code.lock().unwrap().len()
    }
}

#[async_trait]
impl TestHarness for ScriptedHarness {
    async fn run(
        &self,
        test_file: &Path,
        workdir: &Path,
        _timeout: Duration,
        _headless: bool,
    ) -> Result<HarnessOutput, RunnerError> {
        let code = std::fs::read_to_string(test_file).unwrap_or_default();
        self.seen_code.lock().unwrap().push(code);
        self.seen_workdirs.lock().unwrap().push(workdir.to_path_buf());

        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Crash(message)) => Err(RunnerError::Harness(message)),
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(HarnessOutput::default())
            }
            None => Ok(passing_output("test_click_login_button")),
        }
    }
}

/// pytest -v output for a single passing test.
pub fn passing_output(test: &str) -> HarnessOutput {
    HarnessOutput {
        stdout: format!(
            "============================= test session starts ==============================\n\
             collected 1 item\n\n\
             test_generated.py::TestLogin::{test} PASSED                            [100%]\n\n\
             ============================== 1 passed in 1.52s ===============================\n"
        ),
        stderr: String::new(),
        return_code: Some(0),
    }
}

/// pytest -v output for a single failing test with a short traceback.
pub fn failing_output(test: &str, error: &str, line: u32) -> HarnessOutput {
    HarnessOutput {
        stdout: format!(
            "============================= test session starts ==============================\n\
             collected 1 item\n\n\
             test_generated.py::TestLogin::{test} FAILED                            [100%]\n\n\
             =================================== FAILURES ===================================\n\
             __________________________ TestLogin.{test} ___________________________\n\
             test_generated.py:{line}: in {test}\n\
             \x20   WebPage(page).get_login_button().click()\n\
             E   {error}\n\
             =========================== short test summary info ============================\n\
             FAILED test_generated.py::TestLogin::{test} - {error}\n\
             ============================== 1 failed in 31.20s ==============================\n"
        ),
        stderr: String::new(),
        return_code: Some(1),
    }
}

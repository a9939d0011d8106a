// Shared test helpers for integration tests
#![allow(dead_code)]

use risk_runner::core::execution::BatchExecutor;
use risk_runner::core::inventory::TestCollector;
use risk_runner::models::{Batch, BatchOutcome, RunnerReport, TestId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// `count` distinct test ids under `tests/unit/`.
pub fn test_ids(count: usize) -> Vec<TestId> {
    (0..count)
        .map(|i| TestId::new(format!("tests/unit/test_mod{}.py::test_case_{i}", i % 5)))
        .collect()
}

pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, content).expect("Failed to write file");
    path
}

/// A small Python-style project with unit and integration tests and speed markers.
pub fn setup_sample_project() -> TempDir {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let root = temp_dir.path();

    write_file(
        root,
        "tests/unit/test_api.py",
        r#"import pytest
from app.api import client


@pytest.mark.fast
def test_get():
    assert client.get() == 200


@pytest.mark.slow
def test_post():
    assert client.post() == 201
    assert client.post() != 500


def test_delete():
    assert client.delete() == 204
"#,
    );
    write_file(
        root,
        "tests/unit/test_models.py",
        r#"from app.models import User


def test_user():
    assert User("a").name == "a"
"#,
    );
    write_file(
        root,
        "tests/integration/test_flow.py",
        r#"import pytest


@pytest.mark.medium
def test_flow():
    assert True
"#,
    );
    temp_dir
}

/// Collector returning a fixed list per directory and counting its invocations.
#[derive(Default)]
pub struct FakeCollector {
    pub tests: HashMap<PathBuf, Vec<TestId>>,
    pub calls: AtomicUsize,
}

impl FakeCollector {
    pub fn with(mut self, directory: &str, ids: &[&str]) -> Self {
        self.tests
            .insert(PathBuf::from(directory), ids.iter().map(|id| TestId::from(*id)).collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TestCollector for FakeCollector {
    fn collect(&self, directory: &Path) -> anyhow::Result<Vec<TestId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tests.get(directory).cloned().unwrap_or_default())
    }
}

/// Scripted behaviour of the mock executor for one batch.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Every member passes.
    Pass,
    /// Every member fails on each attempt.
    Fail,
    /// Members fail on the first `n` attempts, then pass.
    FailTimes(u32),
    /// Only the named members fail, on every attempt.
    FailTests(Vec<TestId>),
    /// Never finishes; the engine's timeout must end it.
    Hang,
    /// The runner cannot be started.
    Error(String),
}

/// Executor that follows a script and records how often each batch ran.
pub struct MockExecutor {
    default: Behavior,
    per_batch: HashMap<usize, Behavior>,
    delay: Duration,
    calls: Mutex<HashMap<usize, u32>>,
}

impl MockExecutor {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            per_batch: HashMap::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn batch(mut self, index: usize, behavior: Behavior) -> Self {
        self.per_batch.insert(index, behavior);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, index: usize) -> u32 {
        self.calls.lock().unwrap().get(&index).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

fn report(passed: Vec<TestId>, failed: Vec<TestId>) -> BatchOutcome {
    BatchOutcome::Completed(RunnerReport {
        exit_code: Some(if failed.is_empty() { 0 } else { 1 }),
        passed,
        failed,
        ..RunnerReport::default()
    })
}

impl BatchExecutor for MockExecutor {
    async fn execute(&self, batch: &Batch) -> BatchOutcome {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(batch.index).or_insert(0);
            *count += 1;
            *count
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let behavior = self.per_batch.get(&batch.index).unwrap_or(&self.default).clone();
        match behavior {
            Behavior::Pass => report(batch.tests.clone(), Vec::new()),
            Behavior::Fail => report(Vec::new(), batch.tests.clone()),
            Behavior::FailTimes(n) if attempt <= n => report(Vec::new(), batch.tests.clone()),
            Behavior::FailTimes(_) => report(batch.tests.clone(), Vec::new()),
            Behavior::FailTests(failing) => {
                let (failed, passed) = batch.tests.iter().cloned().partition(|t| failing.contains(t));
                report(passed, failed)
            }
            Behavior::Hang => std::future::pending::<BatchOutcome>().await,
            Behavior::Error(message) => BatchOutcome::Errored(message),
        }
    }
}

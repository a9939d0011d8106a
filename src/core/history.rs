//! # Failure History Module / 失败历史模块
//!
//! Durable, append-only record of run outcomes per test. The store is persisted after
//! every recorded run with an atomic write; unlike the cache, persistence failures are
//! returned to the caller.
//!
//! 每个测试运行结果的持久化、仅追加记录。每次记录运行后都会通过原子写入持久化存储；
//! 与缓存不同，持久化失败会返回给调用者。

use chrono::Local;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::models::{RunReport, TestId, TestOutcome};
use crate::infra::fs::atomic_write_json;

/// Errors surfaced by the history store.
/// 历史存储抛出的错误。
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read history file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("history file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write history file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One entry of the recent-outcome ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEntry {
    pub timestamp: String,
    pub result: TestOutcome,
}

/// Accumulated outcomes of a single test.
/// 单个测试的累计结果。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(default, alias = "total_executions")]
    pub total_runs: u64,
    #[serde(default, alias = "failures")]
    pub total_failed: u64,
    #[serde(default)]
    pub total_skipped: u64,
    /// Most recent outcomes, oldest first / 最近的结果，最旧的在前
    #[serde(default)]
    pub recent_results: VecDeque<OutcomeEntry>,
    #[serde(default)]
    pub last_run_id: Option<String>,
    /// Running mean of the per-test duration share, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration_samples: u64,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl FailureRecord {
    pub fn failure_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.total_failed as f64 / self.total_runs as f64
        }
    }

    /// Failure rate over the last `window` outcomes; 0 when there are none.
    /// 最近 `window` 个结果中的失败率；没有结果时为 0。
    pub fn recent_failure_rate(&self, window: usize) -> f64 {
        let skip = self.recent_results.len().saturating_sub(window);
        let recent: Vec<&OutcomeEntry> = self.recent_results.iter().skip(skip).collect();
        if recent.is_empty() {
            return 0.0;
        }
        let failures = recent
            .iter()
            .filter(|e| e.result == TestOutcome::Failed)
            .count();
        failures as f64 / recent.len() as f64
    }

    fn push(&mut self, outcome: TestOutcome, duration: Option<Duration>, run_id: &str, timestamp: &str, limit: usize) {
        self.total_runs += 1;
        match outcome {
            TestOutcome::Failed => self.total_failed += 1,
            TestOutcome::Skipped => self.total_skipped += 1,
            TestOutcome::Passed => {}
        }
        self.recent_results.push_back(OutcomeEntry {
            timestamp: timestamp.to_string(),
            result: outcome,
        });
        while self.recent_results.len() > limit {
            self.recent_results.pop_front();
        }
        self.last_run_id = Some(run_id.to_string());

        if let Some(duration) = duration {
            self.duration_samples += 1;
            let secs = duration.as_secs_f64();
            let mean = self.mean_duration_secs.unwrap_or(0.0);
            self.mean_duration_secs = Some(mean + (secs - mean) / self.duration_samples as f64);
        }
    }
}

/// Summary line of a recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub id: String,
    pub timestamp: String,
    pub total_tests: usize,
    pub failed_tests: usize,
    #[serde(default)]
    pub skipped_tests: usize,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// On-disk layout of the history file. Unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    #[serde(default)]
    pub tests: IndexMap<TestId, FailureRecord>,
    #[serde(default)]
    pub runs: Vec<RunEntry>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// One observed outcome handed to [`HistoryStore::record_outcomes`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedOutcome {
    pub test: TestId,
    pub outcome: TestOutcome,
    /// Share of the batch wall-clock time attributed to this test.
    pub duration: Option<Duration>,
}

/// A frequently failing test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequentFailure {
    pub test: TestId,
    pub failure_rate: f64,
    pub total_runs: u64,
    pub failures: u64,
}

/// The failure history store.
/// 失败历史存储。
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    recent_limit: usize,
    document: HistoryDocument,
}

impl HistoryStore {
    /// Opens the history at `path`. A missing file is an empty history; a malformed
    /// file is an error so that valuable data is never silently overwritten.
    ///
    /// 打开 `path` 处的历史记录。文件不存在时为空历史；格式错误的文件是一个错误，
    /// 以免有价值的数据被静默覆盖。
    pub fn open(path: impl Into<PathBuf>, recent_limit: usize) -> Result<Self, HistoryError> {
        let path = path.into();
        let document = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| HistoryError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HistoryDocument::default(),
            Err(source) => return Err(HistoryError::Read { path, source }),
        };
        debug!(path = %path.display(), tests = document.tests.len(), "opened failure history");
        Ok(Self {
            path,
            recent_limit: recent_limit.max(1),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &HistoryDocument {
        &self.document
    }

    pub fn record(&self, test: &TestId) -> Option<&FailureRecord> {
        self.document.tests.get(test)
    }

    pub fn records(&self) -> impl Iterator<Item = (&TestId, &FailureRecord)> {
        self.document.tests.iter()
    }

    pub fn runs(&self) -> &[RunEntry] {
        &self.document.runs
    }

    /// Records pass/fail results of one run and persists the store.
    /// Returns the run id (a generated timestamp when `run_id` is `None`).
    ///
    /// 记录一次运行的通过/失败结果并持久化存储。返回运行 id（当 `run_id` 为 `None` 时生成时间戳）。
    pub fn record_run(
        &mut self,
        results: &IndexMap<TestId, bool>,
        run_id: Option<String>,
    ) -> Result<String, HistoryError> {
        let outcomes: Vec<ObservedOutcome> = results
            .iter()
            .map(|(test, passed)| ObservedOutcome {
                test: test.clone(),
                outcome: TestOutcome::from_passed(*passed),
                duration: None,
            })
            .collect();
        self.record_outcomes(&outcomes, run_id)
    }

    /// Records full outcomes (including skips and duration shares) and persists.
    /// Each test present is counted once; absent tests are untouched.
    pub fn record_outcomes(
        &mut self,
        outcomes: &[ObservedOutcome],
        run_id: Option<String>,
    ) -> Result<String, HistoryError> {
        let timestamp = now_iso();
        let run_id = run_id.unwrap_or_else(|| timestamp.clone());

        let mut seen = HashSet::new();
        let mut failed = 0;
        let mut skipped = 0;
        for observed in outcomes {
            if !seen.insert(&observed.test) {
                continue;
            }
            match observed.outcome {
                TestOutcome::Failed => failed += 1,
                TestOutcome::Skipped => skipped += 1,
                TestOutcome::Passed => {}
            }
            self.document
                .tests
                .entry(observed.test.clone())
                .or_default()
                .push(observed.outcome, observed.duration, &run_id, &timestamp, self.recent_limit);
        }

        self.document.runs.push(RunEntry {
            id: run_id.clone(),
            timestamp,
            total_tests: seen.len(),
            failed_tests: failed,
            skipped_tests: skipped,
            extra: IndexMap::new(),
        });
        self.persist()?;
        info!(run = %run_id, tests = seen.len(), failed, "recorded run in failure history");
        Ok(run_id)
    }

    /// Records every reported outcome of an aggregated run. The batch duration is
    /// split evenly across its members.
    pub fn record_report(&mut self, report: &RunReport, run_id: Option<String>) -> Result<String, HistoryError> {
        let mut outcomes = Vec::new();
        for result in &report.batch_results {
            let share = if result.tests.is_empty() {
                None
            } else {
                Some(result.duration.div_f64(result.tests.len() as f64))
            };
            let buckets = [
                (&result.passed, TestOutcome::Passed),
                (&result.failed, TestOutcome::Failed),
                (&result.skipped, TestOutcome::Skipped),
            ];
            for (tests, outcome) in buckets {
                outcomes.extend(tests.iter().map(|test| ObservedOutcome {
                    test: test.clone(),
                    outcome,
                    duration: share,
                }));
            }
        }
        self.record_outcomes(&outcomes, run_id)
    }

    /// Failure rate of a test; 0 for unknown tests.
    pub fn failure_rate(&self, test: &TestId) -> f64 {
        self.record(test).map_or(0.0, FailureRecord::failure_rate)
    }

    /// Tests with at least `min_runs` runs and a failure rate of at least `threshold`,
    /// sorted by rate descending. Ties keep the history's insertion order.
    ///
    /// 至少运行了 `min_runs` 次且失败率至少为 `threshold` 的测试，按失败率降序排序。
    /// 相同失败率保持历史记录的插入顺序。
    pub fn frequently_failing(&self, threshold: f64, min_runs: u64) -> Vec<FrequentFailure> {
        let mut failing: Vec<FrequentFailure> = self
            .document
            .tests
            .iter()
            .filter(|(_, record)| record.total_runs >= min_runs && record.total_runs > 0)
            .filter(|(_, record)| record.failure_rate() >= threshold)
            .map(|(test, record)| FrequentFailure {
                test: test.clone(),
                failure_rate: record.failure_rate(),
                total_runs: record.total_runs,
                failures: record.total_failed,
            })
            .collect();
        failing.sort_by(|a, b| b.failure_rate.total_cmp(&a.failure_rate));
        failing
    }

    fn persist(&self) -> Result<(), HistoryError> {
        atomic_write_json(&self.path, &self.document).map_err(|source| HistoryError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn now_iso() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

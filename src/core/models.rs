//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the risk runner.
//! It includes identifiers and categories for tests, speed markers, batches,
//! per-batch execution outcomes and the aggregated run report.
//!
//! 此模块定义了整个风险运行器中使用的核心数据结构。
//! 它包括测试的标识符和类别、速度标记、批次、每个批次的执行结果以及汇总的运行报告。

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Separator between the file part of a test id and its class/function suffix.
pub const ID_SEPARATOR: &str = "::";

/// An opaque, stable identifier of a single test.
/// It is a file path, optionally followed by `::`-delimited class and function parts.
///
/// 单个测试的不透明、稳定的标识符。
/// 它是一个文件路径，后面可以跟随以 `::` 分隔的类和函数部分。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The source file part of the id (everything before the first `::`).
    /// id 的源文件部分（第一个 `::` 之前的所有内容）。
    pub fn file_path(&self) -> &str {
        self.0.split(ID_SEPARATOR).next().unwrap_or(&self.0)
    }

    /// The class part of a class-based id (`file::Class::test`), if any.
    pub fn class_name(&self) -> Option<&str> {
        let parts: Vec<&str> = self.0.split(ID_SEPARATOR).collect();
        if parts.len() > 2 { Some(parts[1]) } else { None }
    }

    /// The function name with any parametrization suffix (`[...]` or `(...)`) removed.
    /// 去掉参数化后缀（`[...]` 或 `(...)`）的函数名。
    pub fn test_name(&self) -> Option<&str> {
        let parts: Vec<&str> = self.0.split(ID_SEPARATOR).collect();
        let raw = match parts.len() {
            0 | 1 => return None,
            2 => parts[1],
            _ => parts[2],
        };
        let end = raw.find(['[', '(']).unwrap_or(raw.len());
        let name = raw[..end].trim();
        if name.is_empty() { None } else { Some(name) }
    }

    /// Returns `true` when `self` names a test nested under `parent`
    /// (e.g. `a.py::test_x` under `a.py`).
    pub fn is_child_of(&self, parent: &TestId) -> bool {
        self.0.len() > parent.0.len() + ID_SEPARATOR.len()
            && self.0.starts_with(parent.as_str())
            && self.0[parent.0.len()..].starts_with(ID_SEPARATOR)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The fixed set of test categories. Each category is bound to a root directory
/// in the configuration.
/// 固定的测试类别集合。每个类别在配置中绑定到一个根目录。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCategory {
    Unit,
    Integration,
    Behavior,
    Performance,
    Property,
}

impl TestCategory {
    pub const ALL: [TestCategory; 5] = [
        TestCategory::Unit,
        TestCategory::Integration,
        TestCategory::Behavior,
        TestCategory::Performance,
        TestCategory::Property,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TestCategory::Unit => "unit",
            TestCategory::Integration => "integration",
            TestCategory::Behavior => "behavior",
            TestCategory::Performance => "performance",
            TestCategory::Property => "property",
        }
    }

    pub fn default_root(self) -> &'static str {
        match self {
            TestCategory::Unit => "tests/unit",
            TestCategory::Integration => "tests/integration",
            TestCategory::Behavior => "tests/behavior",
            TestCategory::Performance => "tests/performance",
            TestCategory::Property => "tests/property",
        }
    }

    /// Unit-style categories are scored from their source; the others use a
    /// category constant.
    pub fn is_unit_style(self) -> bool {
        matches!(self, TestCategory::Unit | TestCategory::Property)
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown test category: {s}"))
    }
}

/// Speed classification attached to a test, explicitly or by inference.
/// 附加到测试上的速度分类，可以是显式的，也可以是推断的。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedMarker {
    Fast,
    Medium,
    Slow,
}

impl SpeedMarker {
    /// Lookup order used whenever several marker types are probed.
    pub const ALL: [SpeedMarker; 3] = [SpeedMarker::Fast, SpeedMarker::Medium, SpeedMarker::Slow];

    pub fn as_str(self) -> &'static str {
        match self {
            SpeedMarker::Fast => "fast",
            SpeedMarker::Medium => "medium",
            SpeedMarker::Slow => "slow",
        }
    }

    /// Complexity implied by the marker for non-unit categories.
    pub fn complexity(self) -> f64 {
        match self {
            SpeedMarker::Fast => 0.2,
            SpeedMarker::Medium => 0.5,
            SpeedMarker::Slow => 0.8,
        }
    }

    /// Multiplier applied by the weighted cost model.
    pub fn cost_factor(self) -> f64 {
        match self {
            SpeedMarker::Fast => 1.0,
            SpeedMarker::Medium => 1.5,
            SpeedMarker::Slow => 3.0,
        }
    }
}

impl fmt::Display for SpeedMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedMarker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpeedMarker::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown speed marker: {s}"))
    }
}

/// Speed-based selection applied during collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedFilter {
    #[default]
    All,
    Only(SpeedMarker),
    Unmarked,
}

impl SpeedFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedFilter::All => "all",
            SpeedFilter::Only(marker) => marker.as_str(),
            SpeedFilter::Unmarked => "unmarked",
        }
    }
}

impl FromStr for SpeedFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SpeedFilter::All),
            "unmarked" => Ok(SpeedFilter::Unmarked),
            other => other.parse::<SpeedMarker>().map(SpeedFilter::Only),
        }
    }
}

/// The outcome of a single test in a single run.
/// 单次运行中单个测试的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
}

impl TestOutcome {
    pub fn from_passed(passed: bool) -> Self {
        if passed { TestOutcome::Passed } else { TestOutcome::Failed }
    }
}

/// A fixed, non-overlapping group of tests executed as one unit of work.
/// Membership never changes after the scheduler creates it.
///
/// 一个固定的、不重叠的测试组，作为一个工作单元执行。
/// 调度器创建后，其成员永远不会改变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Stable identity of the batch within one scheduling run / 批次在一次调度中的稳定标识
    pub index: usize,
    /// Ordered membership / 有序的成员列表
    pub tests: Vec<TestId>,
    /// Cumulative estimated cost / 累计估算成本
    pub cost: f64,
}

impl Batch {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            tests: Vec::new(),
            cost: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// One-based label used in progress output.
    pub fn label(&self) -> usize {
        self.index + 1
    }
}

/// The raw, per-test outcome lists reported by the underlying test runner.
/// Ids here are exactly what the runner printed and may name children of batch members.
///
/// 底层测试运行器报告的原始每测试结果列表。
/// 这里的 id 正是运行器打印的内容，可能是批次成员的子项。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerReport {
    pub passed: Vec<TestId>,
    pub failed: Vec<TestId>,
    pub skipped: Vec<TestId>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// How a single batch execution ended. Timeouts and runner errors are ordinary values,
/// not panics or propagated errors.
///
/// 单个批次执行的结束方式。超时和运行器错误是普通的值，而不是 panic 或传播的错误。
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The runner exited; the report may still contain failed tests.
    Completed(RunnerReport),
    /// The batch exceeded its per-batch timeout.
    TimedOut,
    /// The runner could not be executed at all (spawn failure, I/O error...).
    Errored(String),
}

/// The result of executing one batch (its latest attempt).
/// 执行一个批次的结果（其最近一次尝试）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub batch_id: usize,
    /// Batch membership / 批次成员
    pub tests: Vec<TestId>,
    pub passed: Vec<TestId>,
    pub failed: Vec<TestId>,
    pub skipped: Vec<TestId>,
    #[serde(rename = "execution_time", with = "duration_secs")]
    pub duration: Duration,
    #[serde(rename = "returncode")]
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "timeout")]
    pub timed_out: bool,
    /// Number of times the batch was executed (1 = no retry).
    /// 批次被执行的次数（1 表示没有重试）。
    pub attempts: u32,
}

impl ExecutionResult {
    /// Builds the result of one attempt from its outcome.
    ///
    /// For a completed run every reported id is folded onto the batch member it belongs
    /// to (the member itself or its parent), so passed, failed and skipped are disjoint
    /// subsets of the membership. A member with any failed child is failed; otherwise
    /// any passed child makes it passed; otherwise it is skipped. Members without any
    /// reported outcome appear in no bucket.
    ///
    /// A timed out or errored attempt fails the whole membership.
    pub fn from_outcome(
        batch: &Batch,
        outcome: BatchOutcome,
        elapsed: Duration,
        timeout: Duration,
        attempts: u32,
    ) -> Self {
        match outcome {
            BatchOutcome::Completed(report) => {
                let mut passed = Vec::new();
                let mut failed = Vec::new();
                let mut skipped = Vec::new();
                for member in &batch.tests {
                    let owns = |id: &TestId| id == member || id.is_child_of(member);
                    if report.failed.iter().any(owns) {
                        failed.push(member.clone());
                    } else if report.passed.iter().any(owns) {
                        passed.push(member.clone());
                    } else if report.skipped.iter().any(owns) {
                        skipped.push(member.clone());
                    }
                }
                Self {
                    batch_id: batch.index,
                    tests: batch.tests.clone(),
                    passed,
                    failed,
                    skipped,
                    duration: elapsed,
                    exit_code: report.exit_code.unwrap_or(-1),
                    stdout: report.stdout,
                    stderr: report.stderr,
                    timed_out: false,
                    attempts,
                }
            }
            BatchOutcome::TimedOut => Self {
                batch_id: batch.index,
                tests: batch.tests.clone(),
                passed: Vec::new(),
                failed: batch.tests.clone(),
                skipped: Vec::new(),
                duration: timeout,
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("Timeout after {} seconds", timeout.as_secs_f64()),
                timed_out: true,
                attempts,
            },
            BatchOutcome::Errored(message) => Self {
                batch_id: batch.index,
                tests: batch.tests.clone(),
                passed: Vec::new(),
                failed: batch.tests.clone(),
                skipped: Vec::new(),
                duration: elapsed,
                exit_code: -1,
                stdout: String::new(),
                stderr: message,
                timed_out: false,
                attempts,
            },
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Members that received no outcome from the runner.
    pub fn unreported(&self) -> Vec<&TestId> {
        let seen: HashSet<&TestId> = self
            .passed
            .iter()
            .chain(&self.failed)
            .chain(&self.skipped)
            .collect();
        self.tests.iter().filter(|t| !seen.contains(t)).collect()
    }
}

/// Summary metrics of an aggregated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_tests: usize,
    pub total_passed: usize,
    pub total_failed: usize,
    pub total_skipped: usize,
    /// Percentage of passed tests (0-100) / 通过测试的百分比（0-100）
    pub pass_rate: f64,
    pub total_execution_time: f64,
    pub average_execution_time: f64,
}

/// The aggregate of all batch results of one run, ordered by batch index.
/// 一次运行中所有批次结果的汇总，按批次索引排序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub run_id: Option<String>,
    pub total_tests: usize,
    pub passed: Vec<TestId>,
    pub failed: Vec<TestId>,
    pub skipped: Vec<TestId>,
    pub total_execution_time: f64,
    pub batches: usize,
    pub batch_results: Vec<ExecutionResult>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn aggregate(mut batch_results: Vec<ExecutionResult>) -> Self {
        batch_results.sort_by_key(|r| r.batch_id);

        let mut total_tests = 0;
        let mut passed = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        let mut total_execution_time = 0.0;
        for result in &batch_results {
            total_tests += result.tests.len();
            passed.extend(result.passed.iter().cloned());
            failed.extend(result.failed.iter().cloned());
            skipped.extend(result.skipped.iter().cloned());
            total_execution_time += result.duration.as_secs_f64();
        }

        let summary = RunSummary {
            total_tests,
            total_passed: passed.len(),
            total_failed: failed.len(),
            total_skipped: skipped.len(),
            pass_rate: if total_tests > 0 {
                passed.len() as f64 / total_tests as f64 * 100.0
            } else {
                0.0
            },
            total_execution_time,
            average_execution_time: if batch_results.is_empty() {
                0.0
            } else {
                total_execution_time / batch_results.len() as f64
            },
        };

        Self {
            timestamp: Local::now().to_rfc3339(),
            run_id: None,
            total_tests,
            passed,
            failed,
            skipped,
            total_execution_time,
            batches: batch_results.len(),
            batch_results,
            summary,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Looks up the batch a failed test belongs to.
    pub fn batch_of(&self, test: &TestId) -> Option<usize> {
        self.batch_results
            .iter()
            .find(|r| r.failed.contains(test))
            .map(|r| r.batch_id)
    }
}

/// Serde helper storing a `Duration` as fractional seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or_default())
    }
}

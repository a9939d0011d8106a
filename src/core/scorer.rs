//! # Risk Scorer Module / 风险评分模块
//!
//! Combines historical failure rate, static complexity, version-control churn and
//! dependency fan-in into a single risk score per test.
//!
//! 将历史失败率、静态复杂度、版本控制变动和依赖扇入组合成每个测试的单一风险分数。

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::core::analysis::{DependencyGraph, analyze_file};
use crate::core::cache::Cache;
use crate::core::config::{CategoryRoots, RiskSection, RunnerConfig};
use crate::core::history::{FailureRecord, HistoryStore};
use crate::core::markers::MarkerDetector;
use crate::core::models::{TestCategory, TestId};

/// Complexity used when source analysis fails.
pub const DEFAULT_COMPLEXITY: f64 = 0.3;

const FAILURE_WEIGHT: f64 = 0.6;
const COMPLEXITY_WEIGHT: f64 = 0.1;
const CHURN_WEIGHT: f64 = 0.2;
const DEPENDENCY_WEIGHT: f64 = 0.1;

/// Per-file change activity in version control, in `[0, 1]`.
/// 版本控制中每个文件的变更活跃度，范围为 `[0, 1]`。
pub trait ChurnSource {
    fn churn(&self, file: &str) -> f64;
}

/// Churn from `git log` over the last `days` days.
pub struct GitChurn {
    root: PathBuf,
    days: u32,
}

impl GitChurn {
    pub fn new(root: impl Into<PathBuf>, days: u32) -> Self {
        Self {
            root: root.into(),
            days,
        }
    }

    fn git_log(&self, file: &str, format_args: &[&str]) -> Option<String> {
        let since = format!("--since={}.days", self.days);
        let output = Command::new("git")
            .arg("log")
            .arg(&since)
            .args(format_args)
            .arg("--")
            .arg(file)
            .current_dir(&self.root)
            .output()
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ChurnSource for GitChurn {
    fn churn(&self, file: &str) -> f64 {
        let Some(commits) = self.git_log(file, &["--pretty=format:%H"]) else {
            debug!(file, "git churn unavailable");
            return 0.0;
        };
        let commit_count = commits.lines().filter(|l| !l.trim().is_empty()).count();
        let lines_changed: u64 = self
            .git_log(file, &["--numstat", "--pretty=format:"])
            .unwrap_or_default()
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let added = parts.next()?.parse::<u64>().ok()?;
                let removed = parts.next()?.parse::<u64>().ok()?;
                Some(added + removed)
            })
            .sum();
        churn_score(commit_count, lines_changed)
    }
}

/// A churn source that reports no activity.
pub struct NoChurn;

impl ChurnSource for NoChurn {
    fn churn(&self, _file: &str) -> f64 {
        0.0
    }
}

pub fn churn_score(commits: usize, lines_changed: u64) -> f64 {
    (0.5 * commits as f64 / 10.0 + 0.5 * lines_changed as f64 / 100.0).min(1.0)
}

/// `0.4 * historical + 0.6 * recent`; 0 for a test that never ran.
/// `0.4 * 历史失败率 + 0.6 * 最近失败率`；从未运行过的测试为 0。
pub fn failure_risk(record: &FailureRecord, recent_window: usize) -> f64 {
    if record.total_runs == 0 {
        return 0.0;
    }
    0.4 * record.failure_rate() + 0.6 * record.recent_failure_rate(recent_window)
}

/// Blends the failure risk with the optional terms. A disabled term is `None` and
/// contributes 0; its weight is never moved onto the other terms, so failure risk alone
/// tops out at `0.6`. The result is clamped to `[0, 1]`.
///
/// 将失败风险与可选项混合。禁用的项为 `None`，贡献为 0；其权重不会转移到其他项，
/// 因此仅凭失败风险最高为 `0.6`。结果被限制在 `[0, 1]`。
pub fn combine(failure_risk: f64, complexity: Option<f64>, churn: Option<f64>, dependency: Option<f64>) -> f64 {
    let total = FAILURE_WEIGHT * failure_risk
        + COMPLEXITY_WEIGHT * complexity.unwrap_or(0.0)
        + CHURN_WEIGHT * churn.unwrap_or(0.0)
        + DEPENDENCY_WEIGHT * dependency.unwrap_or(0.0);
    total.clamp(0.0, 1.0)
}

/// The components of one test's risk score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskBreakdown {
    pub test_path: TestId,
    pub failure_risk: f64,
    pub complexity: f64,
    pub git_churn: f64,
    pub dependency_risk: f64,
    pub total_risk: f64,
}

/// Scores tests against the failure history.
/// 根据失败历史为测试评分。
pub struct RiskScorer<'a> {
    root: PathBuf,
    settings: &'a RiskSection,
    categories: &'a CategoryRoots,
    detector: MarkerDetector,
    churn: Box<dyn ChurnSource + 'a>,
}

impl<'a> RiskScorer<'a> {
    /// A scorer with git churn when churn is enabled in `config`.
    pub fn new(root: impl Into<PathBuf>, config: &'a RunnerConfig) -> Self {
        let root = root.into();
        let churn: Box<dyn ChurnSource + 'a> = if config.risk.use_churn {
            Box::new(GitChurn::new(root.clone(), config.risk.churn_days))
        } else {
            Box::new(NoChurn)
        };
        Self {
            root,
            settings: &config.risk,
            categories: &config.categories,
            detector: MarkerDetector::new(config.runner.marker_prefix.clone()),
            churn,
        }
    }

    pub fn with_churn(mut self, churn: impl ChurnSource + 'a) -> Self {
        self.churn = Box::new(churn);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Static complexity of a test in `[0, 1]`.
    ///
    /// Unit and property tests are scored from their source file. Other categories use
    /// a category constant, overridden by a speed marker when markers are enabled.
    /// Analysis failures fall back to [`DEFAULT_COMPLEXITY`].
    ///
    /// 测试的静态复杂度，范围为 `[0, 1]`。
    /// 单元测试和属性测试根据其源文件评分。其他类别使用类别常量，启用标记时由速度标记覆盖。
    pub fn complexity(&self, cache: &mut Cache, test: &TestId) -> f64 {
        if let Some(score) = cache.complexity(test) {
            return score;
        }

        let category = self.categories.categorize(test.as_str());
        let constant = match category {
            Some(TestCategory::Behavior) => Some(0.7),
            Some(TestCategory::Integration) => Some(0.5),
            Some(TestCategory::Performance) => Some(0.8),
            _ => None,
        };

        let score = match constant {
            Some(constant) => {
                let marker = if self.settings.use_markers {
                    self.detector.lookup(cache, &self.root, test)
                } else {
                    None
                };
                marker.map_or(constant, |m| m.complexity())
            }
            None => match analyze_file(&self.root.join(test.file_path())) {
                Ok(metrics) => metrics.complexity(),
                Err(e) => {
                    warn!(test = %test, error = %e, "complexity analysis failed, using default");
                    DEFAULT_COMPLEXITY
                }
            },
        };
        cache.store_complexity(test, score);
        score
    }

    pub fn churn(&self, test: &TestId) -> f64 {
        self.churn.churn(test.file_path()).clamp(0.0, 1.0)
    }

    /// Fraction of `test`'s dependencies that are flagged high-risk.
    pub fn dependency_risk(&self, graph: &DependencyGraph, test: &TestId, high_risk: &HashSet<TestId>) -> f64 {
        let deps = graph.dependencies_of(test);
        if deps.is_empty() {
            return 0.0;
        }
        deps.iter().filter(|d| high_risk.contains(**d)).count() as f64 / deps.len() as f64
    }

    /// Full risk breakdown of a test.
    /// Always 0 for a test without recorded runs.
    pub fn risk(
        &self,
        cache: &mut Cache,
        history: &HistoryStore,
        graph: &DependencyGraph,
        high_risk: &HashSet<TestId>,
        test: &TestId,
    ) -> RiskBreakdown {
        let record = history.record(test);
        let failure = record.map_or(0.0, |r| failure_risk(r, self.settings.consider_recent));
        let never_ran = record.is_none_or(|r| r.total_runs == 0);

        let mut breakdown = RiskBreakdown {
            test_path: test.clone(),
            failure_risk: failure,
            complexity: 0.0,
            git_churn: 0.0,
            dependency_risk: 0.0,
            total_risk: 0.0,
        };
        if never_ran {
            return breakdown;
        }

        let complexity = self.settings.use_complexity.then(|| self.complexity(cache, test));
        let churn = self.settings.use_churn.then(|| self.churn(test));
        let dependency = self
            .settings
            .use_dependencies
            .then(|| self.dependency_risk(graph, test, high_risk));

        breakdown.complexity = complexity.unwrap_or(0.0);
        breakdown.git_churn = churn.unwrap_or(0.0);
        breakdown.dependency_risk = dependency.unwrap_or(0.0);
        breakdown.total_risk = combine(failure, complexity, churn, dependency);
        breakdown
    }

    /// High-risk identification over every test in the history.
    ///
    /// The top `2 * max_tests` tests by failure risk are analysed further; those whose
    /// failure risk reaches the threshold seed the high-risk set used for dependency
    /// risk. The result keeps tests whose total risk reaches the threshold, sorted by
    /// total risk descending and truncated to `max_tests`.
    ///
    /// 对历史记录中的每个测试进行高风险识别。
    pub fn identify_high_risk(&self, cache: &mut Cache, history: &HistoryStore) -> Vec<RiskBreakdown> {
        let mut candidates: Vec<(TestId, f64)> = history
            .records()
            .map(|(test, record)| (test.clone(), failure_risk(record, self.settings.consider_recent)))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(self.settings.max_tests.saturating_mul(2));

        let seeds: HashSet<TestId> = candidates
            .iter()
            .filter(|(_, risk)| *risk >= self.settings.threshold)
            .map(|(test, _)| test.clone())
            .collect();
        let tests: Vec<TestId> = candidates.iter().map(|(test, _)| test.clone()).collect();
        let graph = if self.settings.use_dependencies {
            DependencyGraph::build(&self.root, &tests)
        } else {
            DependencyGraph::default()
        };

        let mut scored: Vec<RiskBreakdown> = tests
            .iter()
            .map(|test| self.risk(cache, history, &graph, &seeds, test))
            .collect();
        scored.sort_by(|a, b| b.total_risk.total_cmp(&a.total_risk));
        scored.retain(|b| b.total_risk >= self.settings.threshold);
        scored.truncate(self.settings.max_tests);
        scored
    }

    /// Orders `tests` by risk for a prioritized run: tests below `min_risk` are dropped,
    /// the rest sorted by risk descending (stable) and truncated to `limit`.
    pub fn prioritize(
        &self,
        cache: &mut Cache,
        history: &HistoryStore,
        tests: &[TestId],
        min_risk: f64,
        limit: Option<usize>,
    ) -> Vec<RiskBreakdown> {
        let seeds: HashSet<TestId> = tests
            .iter()
            .filter(|test| {
                history
                    .record(test)
                    .is_some_and(|r| failure_risk(r, self.settings.consider_recent) >= self.settings.threshold)
            })
            .cloned()
            .collect();
        let graph = if self.settings.use_dependencies {
            DependencyGraph::build(&self.root, tests)
        } else {
            DependencyGraph::default()
        };

        let mut scored: Vec<RiskBreakdown> = tests
            .iter()
            .map(|test| self.risk(cache, history, &graph, &seeds, test))
            .filter(|b| b.total_risk >= min_risk)
            .collect();
        scored.sort_by(|a, b| b.total_risk.total_cmp(&a.total_risk));
        if let Some(limit) = limit {
            scored.truncate(limit);
        }
        scored
    }
}

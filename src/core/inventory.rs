//! # Inventory Module / 测试清单模块
//!
//! Discovers tests per category through an external collector, applies the speed and
//! text filters and memoizes results in the [`Cache`].
//!
//! 通过外部收集器按类别发现测试，应用速度和文本过滤器，并将结果记忆在 [`Cache`] 中。

use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::cache::Cache;
use crate::core::config::RunnerConfig;
use crate::core::markers::MarkerDetector;
use crate::core::models::{SpeedFilter, SpeedMarker, TestCategory, TestId};

/// Source of raw test ids for a directory (the external runner's collect mode).
/// 目录的原始测试 id 来源（外部运行器的收集模式）。
pub trait TestCollector {
    fn collect(&self, directory: &Path) -> anyhow::Result<Vec<TestId>>;
}

impl<T: TestCollector + ?Sized> TestCollector for &T {
    fn collect(&self, directory: &Path) -> anyhow::Result<Vec<TestId>> {
        (**self).collect(directory)
    }
}

/// Selection applied to a collected test list.
/// 应用于已收集测试列表的选择条件。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectFilters {
    pub speed: SpeedFilter,
    /// Case-insensitive wildcard patterns, matched anywhere in the id.
    pub patterns: Vec<String>,
    /// Case-insensitive substrings of the id.
    pub modules: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub exclude_modules: Vec<String>,
}

impl CollectFilters {
    /// Stable fingerprint of the filter parameters, part of the cache key.
    pub fn cache_key(&self) -> String {
        format!(
            "speed={};pattern={};module={};xpattern={};xmodule={}",
            self.speed.as_str(),
            self.patterns.join(","),
            self.modules.join(","),
            self.exclude_patterns.join(","),
            self.exclude_modules.join(",")
        )
    }

    /// Whether `test` passes the pattern and module filters.
    /// An empty include list accepts everything; any exclude match rejects.
    pub fn matches_text(&self, test: &TestId) -> bool {
        let id = test.as_str().to_lowercase();
        let pattern_hit = |p: &String| wildcard_match(&format!("*{}*", p.to_lowercase()), &id);
        let module_hit = |m: &String| id.contains(&m.to_lowercase());

        let included = (self.patterns.is_empty() || self.patterns.iter().any(pattern_hit))
            && (self.modules.is_empty() || self.modules.iter().any(module_hit));
        let excluded =
            self.exclude_patterns.iter().any(pattern_hit) || self.exclude_modules.iter().any(module_hit);
        included && !excluded
    }
}

/// Glob-style matching with `*` (any run) and `?` (any single char).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// Whether a collect output line looks like a test path rather than a banner or summary.
pub fn looks_like_test_id(line: &str) -> bool {
    let head = line.split('[').next().unwrap_or(line);
    !head.is_empty()
        && !head.contains(char::is_whitespace)
        && (head.contains("::") || head.contains('/') || head.contains('.'))
}

/// Test discovery over the configured category roots.
/// 基于配置的类别根目录进行测试发现。
pub struct Inventory<'a, C> {
    root: PathBuf,
    config: &'a RunnerConfig,
    collector: C,
    detector: MarkerDetector,
}

impl<'a, C: TestCollector> Inventory<'a, C> {
    pub fn new(root: impl Into<PathBuf>, config: &'a RunnerConfig, collector: C) -> Self {
        Self {
            root: root.into(),
            config,
            collector,
            detector: MarkerDetector::new(config.runner.marker_prefix.clone()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collects the tests of one category.
    pub fn collect(&self, cache: &mut Cache, category: TestCategory, filters: &CollectFilters) -> Vec<TestId> {
        let directory = PathBuf::from(self.config.categories.root(category));
        self.collect_dir(cache, &directory, filters)
    }

    /// Collects the tests below `directory` (relative to the project root).
    ///
    /// A missing directory yields an empty list. A failing collector yields an empty,
    /// uncached list. The result keeps the collector's order with duplicates removed.
    ///
    /// 收集 `directory`（相对于项目根目录）下的测试。
    /// 目录不存在时返回空列表。收集器失败时返回一个空的、不缓存的列表。
    pub fn collect_dir(&self, cache: &mut Cache, directory: &Path, filters: &CollectFilters) -> Vec<TestId> {
        let absolute = self.root.join(directory);
        if !absolute.is_dir() {
            debug!(dir = %absolute.display(), "test directory does not exist");
            return Vec::new();
        }

        let key = Cache::collection_key(&absolute, &filters.cache_key());
        if let Some(tests) = cache.lookup_collection(&key) {
            return tests;
        }

        let raw = match self.collector.collect(directory) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(dir = %directory.display(), error = %e, "test collection failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut tests = Vec::with_capacity(raw.len());
        for test in raw {
            if !seen.insert(test.clone()) || !filters.matches_text(&test) {
                continue;
            }
            let keep = match filters.speed {
                SpeedFilter::All => true,
                SpeedFilter::Only(marker) => self.marker_of(cache, &test) == Some(marker),
                SpeedFilter::Unmarked => self.marker_of(cache, &test).is_none(),
            };
            if keep {
                tests.push(test);
            }
        }

        info!(dir = %directory.display(), tests = tests.len(), "collected tests");
        cache.store_collection(&key, &absolute, &tests);
        tests
    }

    /// Collects several categories, keyed in the given order.
    pub fn collect_all(
        &self,
        cache: &mut Cache,
        categories: &[TestCategory],
        filters: &CollectFilters,
    ) -> IndexMap<TestCategory, Vec<TestId>> {
        categories
            .iter()
            .map(|category| (*category, self.collect(cache, *category, filters)))
            .collect()
    }

    /// Marker lookup memoized in the cache.
    pub fn marker_of(&self, cache: &mut Cache, test: &TestId) -> Option<SpeedMarker> {
        self.detector.lookup(cache, &self.root, test)
    }

    /// `has_marker(test) -> (bool, Option<SpeedMarker>)`.
    pub fn has_marker(&self, cache: &mut Cache, test: &TestId) -> (bool, Option<SpeedMarker>) {
        let marker = self.marker_of(cache, test);
        (marker.is_some(), marker)
    }

    pub fn category_of(&self, test: &TestId) -> Option<TestCategory> {
        self.config.categories.categorize(test.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_semantics() {
        assert!(wildcard_match("*api*", "tests/unit/test_api.py::test_get"));
        assert!(wildcard_match("*te?t_a*", "tests/test_a.py"));
        assert!(!wildcard_match("*zzz*", "tests/test_a.py"));
        assert!(wildcard_match("**", ""));
    }

    #[test]
    fn filters_are_case_insensitive() {
        let filters = CollectFilters {
            patterns: vec!["API".to_string()],
            exclude_modules: vec!["Legacy".to_string()],
            ..CollectFilters::default()
        };
        assert!(filters.matches_text(&TestId::new("tests/unit/test_api.py::test_get")));
        assert!(!filters.matches_text(&TestId::new("tests/unit/legacy/test_api.py::test_get")));
        assert!(!filters.matches_text(&TestId::new("tests/unit/test_db.py::test_get")));
    }

    #[test]
    fn banner_lines_are_not_tests() {
        assert!(looks_like_test_id("tests/unit/test_a.py::test_x[a b]"));
        assert!(!looks_like_test_id("5 tests collected in 0.01s"));
        assert!(!looks_like_test_id(""));
    }
}

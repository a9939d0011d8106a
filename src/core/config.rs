//! # Configuration Module / 配置模块
//!
//! Loads the runner configuration from a TOML file (`RiskRunner.toml` by default).
//! Every section is optional; missing values fall back to built-in defaults.
//!
//! 从 TOML 文件（默认为 `RiskRunner.toml`）加载运行器配置。
//! 每个部分都是可选的；缺失的值会回退到内置默认值。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::models::TestCategory;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "RiskRunner.toml";

/// Errors raised while loading or saving the configuration.
/// 加载或保存配置时引发的错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Which cost model the scheduler uses.
/// 调度器使用的成本模型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostMode {
    /// Every test costs 1.0 / 每个测试的成本为 1.0
    Basic,
    /// Duration history, category and marker factors / 持续时间历史、类别和标记因子
    #[default]
    Enhanced,
}

/// How the external test runner is invoked.
/// 外部测试运行器的调用方式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    /// Collection command; `{target}` is replaced by the directory being collected.
    /// 收集命令；`{target}` 会被替换为正在收集的目录。
    pub collect_command: String,
    /// Batch command; `{tests}` is replaced by the batch membership.
    /// 批次命令；`{tests}` 会被替换为批次成员。
    pub run_command: String,
    /// Extension of test source files, without the dot.
    pub source_extension: String,
    /// Prefix of marker decorators, e.g. `@pytest.mark.`.
    pub marker_prefix: String,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            collect_command: "python -m pytest --collect-only -q {target}".to_string(),
            run_command: "python -m pytest -v {tests}".to_string(),
            source_extension: "py".to_string(),
            marker_prefix: "@pytest.mark.".to_string(),
        }
    }
}

/// Root directory of every test category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryRoots {
    pub unit: String,
    pub integration: String,
    pub behavior: String,
    pub performance: String,
    pub property: String,
}

impl Default for CategoryRoots {
    fn default() -> Self {
        Self {
            unit: TestCategory::Unit.default_root().to_string(),
            integration: TestCategory::Integration.default_root().to_string(),
            behavior: TestCategory::Behavior.default_root().to_string(),
            performance: TestCategory::Performance.default_root().to_string(),
            property: TestCategory::Property.default_root().to_string(),
        }
    }
}

impl CategoryRoots {
    pub fn root(&self, category: TestCategory) -> &str {
        match category {
            TestCategory::Unit => &self.unit,
            TestCategory::Integration => &self.integration,
            TestCategory::Behavior => &self.behavior,
            TestCategory::Performance => &self.performance,
            TestCategory::Property => &self.property,
        }
    }

    /// Determines the category of a test id by path-prefix matching.
    /// The longest matching root wins.
    ///
    /// 通过路径前缀匹配确定测试 id 的类别。最长的匹配根目录胜出。
    pub fn categorize(&self, test_id: &str) -> Option<TestCategory> {
        let path = normalize(test_id);
        TestCategory::ALL
            .into_iter()
            .filter_map(|category| {
                let root = normalize(self.root(category));
                let root = root.trim_end_matches('/');
                let matches = !root.is_empty()
                    && path.starts_with(root)
                    && matches!(path.as_bytes().get(root.len()), None | Some(b'/') | Some(b':'));
                matches.then_some((root.len(), category))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, category)| category)
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").replace('\\', "/")
}

/// Cache location and switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub dir: PathBuf,
    pub enabled: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".risk_runner_cache"),
            enabled: true,
        }
    }
}

/// Execution engine settings.
/// 执行引擎设置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Worker pool size; `0` means the available parallelism.
    /// 工作池大小；`0` 表示可用的并行度。
    pub workers: usize,
    /// Per-batch timeout in seconds / 每个批次的超时时间（秒）
    pub timeout_secs: u64,
    /// Maximum number of tests per batch / 每个批次的最大测试数
    pub batch_size: usize,
    pub max_retries: u32,
    pub fail_fast: bool,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            workers: 0,
            timeout_secs: 300,
            batch_size: 20,
            max_retries: 2,
            fail_fast: false,
        }
    }
}

impl ExecutionSection {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

/// Risk scoring settings.
/// 风险评分设置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub threshold: f64,
    pub max_tests: usize,
    /// Length of the recent-outcome window / 最近结果窗口的长度
    pub consider_recent: usize,
    pub use_complexity: bool,
    pub use_churn: bool,
    pub use_dependencies: bool,
    pub use_markers: bool,
    pub churn_days: u32,
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            max_tests: 100,
            consider_recent: 10,
            use_complexity: false,
            use_churn: false,
            use_dependencies: false,
            use_markers: true,
            churn_days: 30,
        }
    }
}

impl RiskSection {
    pub fn any_optional_term(&self) -> bool {
        self.use_complexity || self.use_churn || self.use_dependencies
    }
}

/// Failure history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Explicit history file; defaults to a file in the cache directory.
    pub path: Option<PathBuf>,
    /// Size of the per-test ring of recent outcomes.
    pub recent_limit: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            path: None,
            recent_limit: 10,
        }
    }
}

/// The complete runner configuration, loaded from a TOML file.
/// 从 TOML 文件加载的完整运行器配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub mode: CostMode,
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub categories: CategoryRoots,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub risk: RiskSection,
    #[serde(default)]
    pub history: HistorySection,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            mode: CostMode::default(),
            runner: RunnerSection::default(),
            categories: CategoryRoots::default(),
            cache: CacheSection::default(),
            execution: ExecutionSection::default(),
            risk: RiskSection::default(),
            history: HistorySection::default(),
        }
    }
}

impl RunnerConfig {
    /// Loads the configuration.
    ///
    /// With an explicit path the file must exist. Without one, `RiskRunner.toml` in the
    /// working directory is used when present and the built-in defaults otherwise.
    ///
    /// 加载配置。
    /// 指定路径时文件必须存在。未指定时，如果工作目录中存在 `RiskRunner.toml` 则使用它，
    /// 否则使用内置默认值。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::from_file(path)
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn history_path(&self) -> PathBuf {
        self.history
            .path
            .clone()
            .unwrap_or_else(|| self.cache.dir.join("test_failure_history.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_root_wins() {
        let roots = CategoryRoots {
            unit: "tests".to_string(),
            property: "tests/property".to_string(),
            ..CategoryRoots::default()
        };
        assert_eq!(
            roots.categorize("tests/property/test_p.py::test_x"),
            Some(TestCategory::Property)
        );
        assert_eq!(roots.categorize("tests/test_a.py"), Some(TestCategory::Unit));
        assert_eq!(roots.categorize("testsuite/test_a.py"), None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: RunnerConfig = toml::from_str("[execution]\nbatch_size = 5\n").unwrap();
        assert_eq!(config.execution.batch_size, 5);
        assert_eq!(config.execution.timeout_secs, 300);
        assert_eq!(config.mode, CostMode::Enhanced);
        assert_eq!(config.categories.unit, "tests/unit");
    }
}

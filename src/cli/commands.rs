//! # Commands Module / 命令模块
//!
//! One module per subcommand plus the project context they share: the loaded
//! configuration, the resolved project root and the UI locale.
//!
//! 每个子命令一个模块，以及它们共享的项目上下文：已加载的配置、解析后的项目根目录和界面语言。

pub mod cache;
pub mod collect;
pub mod history;
pub mod init;
pub mod risk;
pub mod run;

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::core::cache::Cache;
use crate::core::config::{DEFAULT_CONFIG_FILE, RunnerConfig};
use crate::core::history::HistoryStore;
use crate::infra::command::CommandCollector;
use crate::infra::t;

/// Options given before the subcommand.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub project_dir: PathBuf,
    /// Language requested with `--lang`.
    pub lang: Option<String>,
    /// Language detected from the system, used when neither `--lang` nor a config file sets one.
    pub detected_locale: String,
}

/// Everything a subcommand needs to know about the project under test.
/// 子命令需要了解的关于被测项目的一切。
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: RunnerConfig,
    pub locale: String,
}

impl Project {
    /// Resolves the project root and loads the configuration.
    ///
    /// An explicit `--config` path must exist. Otherwise `RiskRunner.toml` in the project
    /// root is used when present, and the built-in defaults when it is not.
    ///
    /// 解析项目根目录并加载配置。
    pub fn load(global: &GlobalOptions) -> Result<Self> {
        let root = global.project_dir.canonicalize().with_context(|| {
            t!(
                "project_dir_not_found",
                locale = &global.detected_locale,
                path = global.project_dir.display()
            )
            .to_string()
        })?;

        let (config, from_file) = match &global.config {
            Some(path) => (RunnerConfig::load(Some(path.as_path()))?, true),
            None => {
                let default_path = root.join(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    (RunnerConfig::from_file(&default_path)?, true)
                } else {
                    (RunnerConfig::default(), false)
                }
            }
        };

        let locale = match (&global.lang, from_file) {
            (Some(lang), _) => lang.clone(),
            (None, true) => crate::resolve_locale(&config.language),
            (None, false) => global.detected_locale.clone(),
        };
        rust_i18n::set_locale(&locale);
        debug!(root = %root.display(), locale = %locale, "project loaded");

        Ok(Self { root, config, locale })
    }

    /// Resolves a configured path against the project root, dropping `.` components.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        joined
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }

    /// Opens the cache, bypassed when `no_cache` is set or the cache is disabled.
    pub fn open_cache(&self, no_cache: bool) -> Cache {
        let dir = self.resolve(&self.config.cache.dir);
        let extension = &self.config.runner.source_extension;
        if no_cache || !self.config.cache.enabled {
            Cache::bypassed(dir, extension)
        } else {
            Cache::open(dir, extension)
        }
    }

    pub fn open_history(&self) -> Result<HistoryStore> {
        let path = self.resolve(&self.config.history_path());
        HistoryStore::open(&path, self.config.history.recent_limit)
            .with_context(|| t!("history_open_failed", locale = &self.locale, path = path.display()).to_string())
    }

    pub fn collector(&self) -> CommandCollector {
        CommandCollector::new(self.config.runner.collect_command.clone(), &self.root)
    }
}

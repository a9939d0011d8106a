//! # Init Command Module / 初始化命令模块
//!
//! This module implements the `init` command, which creates a `RiskRunner.toml`
//! configuration file in the project root, either from the built-in defaults or
//! through an interactive wizard.
//!
//! 此模块实现了 `init` 命令，在项目根目录中创建 `RiskRunner.toml` 配置文件，
//! 可以使用内置默认值，也可以通过交互式向导创建。
//!
//! ## Wizard Steps / 向导步骤
//!
//! 1. **Overwrite check**: confirmation before replacing an existing file
//! 2. **Runner commands**: collect and run command templates
//! 3. **Execution**: workers, batch size, timeout and retries
//! 4. **Scheduling**: cost model and optional risk terms
//!
//! 1. **覆盖检查**: 替换现有文件之前的确认
//! 2. **运行器命令**: 收集和运行命令模板
//! 3. **执行**: 工作线程数、批次大小、超时和重试次数
//! 4. **调度**: 成本模型和可选的风险项

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, MultiSelect, Select, theme::ColorfulTheme};
use std::path::Path;

use super::GlobalOptions;
use crate::core::config::{CostMode, DEFAULT_CONFIG_FILE, RunnerConfig};
use crate::infra::fs::atomic_write;
use crate::infra::t;

/// Executes the `init` command.
///
/// Without `--force`, an existing file is kept in non-interactive mode and replaced
/// only after confirmation in interactive mode.
///
/// 执行 `init` 命令。
/// 没有 `--force` 时，非交互模式下保留现有文件，交互模式下仅在确认后替换。
pub fn execute(global: &GlobalOptions, non_interactive: bool, force: bool) -> Result<()> {
    let locale = global.lang.clone().unwrap_or_else(|| global.detected_locale.clone());
    let config_path = global.project_dir.join(DEFAULT_CONFIG_FILE);
    let theme = ColorfulTheme::default();

    if !non_interactive {
        println!("\n{}", t!("init.welcome", locale = &locale).cyan().bold());
        println!("{}", t!("init.description", locale = &locale));
    }

    if config_path.exists() && !force {
        if non_interactive {
            println!(
                "{}",
                t!("init.file_exists", locale = &locale, path = config_path.display()).yellow()
            );
            println!("{}", t!("init.use_force", locale = &locale));
            return Ok(());
        }
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = &locale, path = config_path.display()))
            .default(false)
            .interact()
            .context(t!("init.confirmation_failed", locale = &locale).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = &locale));
            return Ok(());
        }
    }

    let mut config = RunnerConfig {
        language: locale.clone(),
        ..RunnerConfig::default()
    };
    if !non_interactive {
        run_wizard(&mut config, &theme, &locale)?;
    }

    write_config(&config_path, &config, &locale)
}

fn run_wizard(config: &mut RunnerConfig, theme: &ColorfulTheme, locale: &str) -> Result<()> {
    let failed = || t!("init.confirmation_failed", locale = locale).to_string();

    config.runner.collect_command = Input::with_theme(theme)
        .with_prompt(t!("init.collect_command_prompt", locale = locale))
        .default(config.runner.collect_command.clone())
        .interact_text()
        .with_context(failed)?;
    config.runner.run_command = Input::with_theme(theme)
        .with_prompt(t!("init.run_command_prompt", locale = locale))
        .default(config.runner.run_command.clone())
        .interact_text()
        .with_context(failed)?;

    config.execution.workers = Input::with_theme(theme)
        .with_prompt(t!("init.workers_prompt", locale = locale))
        .default(config.execution.workers)
        .interact_text()
        .with_context(failed)?;
    config.execution.batch_size = Input::with_theme(theme)
        .with_prompt(t!("init.batch_size_prompt", locale = locale))
        .default(config.execution.batch_size)
        .interact_text()
        .with_context(failed)?;
    config.execution.timeout_secs = Input::with_theme(theme)
        .with_prompt(t!("init.timeout_prompt", locale = locale))
        .default(config.execution.timeout_secs)
        .interact_text()
        .with_context(failed)?;
    config.execution.max_retries = Input::with_theme(theme)
        .with_prompt(t!("init.retries_prompt", locale = locale))
        .default(config.execution.max_retries)
        .interact_text()
        .with_context(failed)?;

    let modes = [
        t!("init.mode_enhanced", locale = locale).to_string(),
        t!("init.mode_basic", locale = locale).to_string(),
    ];
    let mode = Select::with_theme(theme)
        .with_prompt(t!("init.mode_prompt", locale = locale))
        .items(&modes)
        .default(0)
        .interact()
        .with_context(failed)?;
    config.mode = if mode == 0 { CostMode::Enhanced } else { CostMode::Basic };

    let terms = [
        t!("init.term_complexity", locale = locale).to_string(),
        t!("init.term_churn", locale = locale).to_string(),
        t!("init.term_dependencies", locale = locale).to_string(),
    ];
    let selected = MultiSelect::with_theme(theme)
        .with_prompt(t!("init.terms_prompt", locale = locale))
        .items(&terms)
        .interact()
        .with_context(failed)?;
    config.risk.use_complexity = selected.contains(&0);
    config.risk.use_churn = selected.contains(&1);
    config.risk.use_dependencies = selected.contains(&2);
    Ok(())
}

fn write_config(path: &Path, config: &RunnerConfig, locale: &str) -> Result<()> {
    let content = config.to_toml_string()?;
    atomic_write(path, content.as_bytes())
        .with_context(|| t!("init.write_failed", locale = locale, path = path.display()).to_string())?;

    println!(
        "\n{}",
        t!("init.success", locale = locale, path = path.display()).green()
    );
    println!("{}", t!("init.next_steps", locale = locale));
    Ok(())
}

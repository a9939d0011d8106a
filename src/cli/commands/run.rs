//! # Run Command Module / 运行命令模块
//!
//! Collects the selected tests, optionally ranks them by risk, schedules them into
//! batches and runs the batches in parallel. The outcome is folded into the failure
//! history and reported on the console and, optionally, as a JSON or HTML file.
//!
//! 收集所选测试，可选地按风险排序，将其调度到批次中并并行运行批次。
//! 结果被合并到失败历史中，并在控制台上报告，也可以输出为 JSON 或 HTML 文件。

use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{GlobalOptions, Project};
use crate::core::config::{CostMode, RunnerConfig};
use crate::core::execution::{EngineOptions, ExecutionEngine};
use crate::core::inventory::{CollectFilters, Inventory};
use crate::core::models::{RunReport, TestCategory, TestId};
use crate::core::scheduler::{WeightedCost, schedule, select_cost_model, with_costs};
use crate::core::scorer::RiskScorer;
use crate::infra::command::CommandExecutor;
use crate::infra::t;
use crate::reporting::{ReportFormat, console, html, json};

/// Options of the `run` subcommand. `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub categories: Vec<TestCategory>,
    pub filters: CollectFilters,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub batch_size: Option<usize>,
    pub fail_fast: bool,
    pub mode: Option<CostMode>,
    pub no_cache: bool,
    pub min_risk: Option<f64>,
    pub limit: Option<usize>,
    pub run_id: Option<String>,
    pub report: Option<PathBuf>,
}

impl RunOptions {
    /// Command-line flags override the configuration file.
    pub fn apply(&self, config: &mut RunnerConfig) {
        let execution = &mut config.execution;
        if let Some(workers) = self.workers {
            execution.workers = workers;
        }
        if let Some(timeout) = self.timeout_secs {
            execution.timeout_secs = timeout;
        }
        if let Some(retries) = self.max_retries {
            execution.max_retries = retries;
        }
        if let Some(size) = self.batch_size {
            execution.batch_size = size;
        }
        if self.fail_fast {
            execution.fail_fast = true;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
    }

    fn prioritized(&self) -> bool {
        self.min_risk.is_some() || self.limit.is_some()
    }
}

/// Executes the `run` subcommand.
///
/// Fails when any test failed or the run was interrupted, so that the process exits
/// with a non-zero status.
///
/// 执行 `run` 子命令。当任何测试失败或运行被中断时返回错误，使进程以非零状态退出。
pub async fn execute(global: &GlobalOptions, options: RunOptions) -> Result<()> {
    let mut project = Project::load(global)?;
    options.apply(&mut project.config);
    let root = project.root.clone();
    let locale = project.locale.clone();
    let config = &project.config;

    println!(
        "{}",
        t!("project_root_detected", locale = &locale, path = root.display()).cyan()
    );

    let stop_token = setup_signal_handler(&locale)?;
    let mut cache = project.open_cache(options.no_cache);
    let mut history = project.open_history()?;

    let collector = project.collector();
    let inventory = Inventory::new(&root, config, &collector);
    let collected = inventory.collect_all(&mut cache, &options.categories, &options.filters);
    let mut tests: Vec<TestId> = collected.into_values().flatten().collect();
    info!(tests = tests.len(), "collected tests for run");

    if options.prioritized() {
        let scorer = RiskScorer::new(&root, config);
        let ranked = scorer.prioritize(
            &mut cache,
            &history,
            &tests,
            options.min_risk.unwrap_or(0.0),
            options.limit,
        );
        tests = ranked.into_iter().map(|breakdown| breakdown.test_path).collect();
        println!(
            "{}",
            t!("run.prioritized", locale = &locale, count = tests.len()).yellow()
        );
    }

    if tests.is_empty() {
        cache.flush();
        println!("{}", t!("run.no_tests", locale = &locale).green());
        return Ok(());
    }

    let model = select_cost_model(config.mode, || {
        let markers: Vec<_> = tests
            .iter()
            .filter_map(|test| inventory.marker_of(&mut cache, test).map(|m| (test.clone(), m)))
            .collect();
        WeightedCost::new(config.categories.clone())
            .with_history(&history)
            .with_markers(markers)
    });
    let batches = schedule(with_costs(&tests, model.as_ref()), config.execution.batch_size);
    let engine_options = EngineOptions::from_config(&config.execution);
    println!(
        "{}",
        t!(
            "run.scheduled",
            locale = &locale,
            tests = tests.len(),
            batches = batches.len(),
            workers = engine_options.workers
        )
        .bold()
    );

    let total_batches = batches.len();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer_locale = locale.clone();
    let printer = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(events_rx);
        while let Some(event) = events.next().await {
            console::print_progress(&event, total_batches, &printer_locale);
        }
    });

    let executor = CommandExecutor::new(config.runner.run_command.clone(), &root);
    let engine = ExecutionEngine::new(executor, engine_options)
        .with_cancellation(stop_token.clone())
        .with_events(events_tx);
    let started = Instant::now();
    let results = engine.run(batches).await;
    let wall_clock = started.elapsed();
    // Dropping the engine closes the event channel so the printer can finish.
    drop(engine);
    printer.await.context("progress printer task failed")?;

    let mut report = RunReport::aggregate(results);
    let run_id = history
        .record_report(&report, options.run_id.clone())
        .context(t!("history_write_failed", locale = &locale).to_string())?;
    report.run_id = Some(run_id);
    cache.flush();

    finish(&report, wall_clock, options.report.as_ref(), &locale)?;

    if stop_token.is_cancelled() {
        anyhow::bail!(t!("run.interrupted", locale = &locale).to_string());
    }
    if !report.is_success() {
        anyhow::bail!(t!("run.tests_failed", locale = &locale, count = report.failed.len()).to_string());
    }
    println!("\n{}", t!("run.all_passed", locale = &locale).green().bold());
    Ok(())
}

fn finish(report: &RunReport, wall_clock: Duration, path: Option<&PathBuf>, locale: &str) -> Result<()> {
    console::print_summary(report, wall_clock, locale);
    console::print_failures(report, locale);

    if let Some(path) = path {
        match ReportFormat::from_path(path) {
            ReportFormat::Html => html::write_run_report(report, path, locale)?,
            ReportFormat::Json => json::write_run_report(report, path)?,
        }
        println!(
            "\n{}",
            t!("report_written", locale = locale, path = path.display()).green()
        );
    }
    Ok(())
}

/// Sets up a signal handler for graceful shutdown.
fn setup_signal_handler(locale: &str) -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => debug!(error = %e, "unable to listen for Ctrl-C"),
        }
    });

    Ok(token)
}

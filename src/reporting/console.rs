//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints progress lines and colorful, formatted summaries to the console
//! with internationalization support.
//!
//! 此模块在控制台打印进度行和彩色格式化摘要，支持国际化。

use colored::*;
use indexmap::IndexMap;
use std::time::Duration;

use crate::core::execution::ProgressEvent;
use crate::core::history::FrequentFailure;
use crate::core::models::{RunReport, TestCategory, TestId};
use crate::core::scorer::RiskBreakdown;
use crate::infra::t;

/// Number of failed tests listed in the summary.
pub const FAILURES_SHOWN: usize = 10;

/// Prints one progress line for an engine event.
/// 为引擎事件打印一行进度信息。
pub fn print_progress(event: &ProgressEvent, total_batches: usize, locale: &str) {
    match event {
        ProgressEvent::BatchStarted { batch, tests, attempt } if *attempt == 1 => {
            println!(
                "{}",
                t!("run.batch_started", locale = locale, batch = batch + 1, total = total_batches, tests = tests).blue()
            );
        }
        ProgressEvent::BatchStarted { .. } => {}
        ProgressEvent::BatchFinished(result) => {
            let line = t!(
                "run.batch_finished",
                locale = locale,
                batch = result.batch_id + 1,
                passed = result.passed.len(),
                failed = result.failed.len(),
                skipped = result.skipped.len(),
                secs = format!("{:.2}", result.duration.as_secs_f64())
            );
            if result.timed_out {
                println!(
                    "{}",
                    t!("run.batch_timed_out", locale = locale, batch = result.batch_id + 1, secs = result.duration.as_secs()).red()
                );
            } else if result.has_failures() {
                println!("{}", line.red());
            } else {
                println!("{}", line.green());
            }
        }
        ProgressEvent::Retrying { batch, attempt, max_attempts } => {
            println!(
                "{}",
                t!("run.batch_retrying", locale = locale, batch = batch + 1, attempt = attempt, max = max_attempts).yellow()
            );
        }
        ProgressEvent::FailFast { batch } => {
            println!("{}", t!("run.fail_fast", locale = locale, batch = batch + 1).red().bold());
        }
        ProgressEvent::Cancelled => {
            println!("{}", t!("run.cancelled", locale = locale).yellow());
        }
    }
}

/// Prints the aggregate summary of a run.
///
/// The speedup factor compares the summed batch durations with the wall-clock time.
///
/// 打印运行的汇总摘要。加速系数将批次持续时间之和与挂钟时间进行比较。
///
/// # Output Format / 输出格式
/// ```text
/// --- Test Summary ---
///   Total tests:     45
///   Passed:          44
///   Failed:           1
///   Skipped:          0
///   Pass rate:    97.78%
///   Batches:          3
///   Wall clock:   12.31s (speedup 2.41x)
/// ```
pub fn print_summary(report: &RunReport, wall_clock: Duration, locale: &str) {
    let summary = &report.summary;
    let wall = wall_clock.as_secs_f64();
    let speedup = if wall > 0.0 {
        summary.total_execution_time / wall
    } else {
        1.0
    };

    println!("\n{}", t!("summary.banner", locale = locale).bold());
    println!("  {:<14}{:>8}", t!("summary.total", locale = locale), summary.total_tests);
    println!(
        "  {:<14}{:>8}",
        t!("summary.passed", locale = locale),
        summary.total_passed.to_string().green()
    );
    let failed = summary.total_failed.to_string();
    println!(
        "  {:<14}{:>8}",
        t!("summary.failed", locale = locale),
        if summary.total_failed > 0 { failed.red() } else { failed.normal() }
    );
    println!(
        "  {:<14}{:>8}",
        t!("summary.skipped", locale = locale),
        summary.total_skipped.to_string().dimmed()
    );
    println!(
        "  {:<14}{:>7.2}%",
        t!("summary.pass_rate", locale = locale),
        summary.pass_rate
    );
    println!("  {:<14}{:>8}", t!("summary.batches", locale = locale), report.batches);
    println!(
        "  {:<14}{:>7.2}s ({})",
        t!("summary.wall_clock", locale = locale),
        wall,
        t!("summary.speedup", locale = locale, factor = format!("{speedup:.2}"))
    );
}

/// Prints the first failed tests with the batch they ran in.
/// 打印前几个失败的测试及其所在的批次。
pub fn print_failures(report: &RunReport, locale: &str) {
    if report.failed.is_empty() {
        return;
    }

    println!("\n{}", t!("summary.failures_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));
    for test in report.failed.iter().take(FAILURES_SHOWN) {
        let batch = report.batch_of(test).map_or(0, |b| b + 1);
        println!("  - {} {}", test.to_string().cyan(), t!("summary.in_batch", locale = locale, batch = batch).dimmed());
    }
    if report.failed.len() > FAILURES_SHOWN {
        println!(
            "  {}",
            t!("summary.more_failures", locale = locale, count = report.failed.len() - FAILURES_SHOWN).dimmed()
        );
    }
}

/// Prints collected tests per category.
pub fn print_collection(collected: &IndexMap<TestCategory, Vec<TestId>>, list: bool, locale: &str) {
    let mut total = 0;
    for (category, tests) in collected {
        total += tests.len();
        println!(
            "{}",
            t!("collect.category_count", locale = locale, category = category.as_str(), count = tests.len()).bold()
        );
        if list {
            for test in tests {
                println!("    {test}");
            }
        }
    }
    println!("{}", t!("collect.total", locale = locale, count = total).green());
}

/// Prints the high-risk tests with their risk components.
pub fn print_high_risk(tests: &[RiskBreakdown], locale: &str) {
    if tests.is_empty() {
        println!("{}", t!("risk.none_found", locale = locale).green());
        return;
    }

    println!("\n{}", t!("risk.banner", locale = locale, count = tests.len()).bold());
    for (i, test) in tests.iter().enumerate() {
        println!("{:>3}. {} ({:.2})", i + 1, test.test_path.to_string().cyan(), test.total_risk);
        println!("     {}", t!("risk.failure_risk", locale = locale, value = format!("{:.2}", test.failure_risk)));
        if test.complexity > 0.0 {
            println!("     {}", t!("risk.complexity", locale = locale, value = format!("{:.2}", test.complexity)));
        }
        if test.git_churn > 0.0 {
            println!("     {}", t!("risk.churn", locale = locale, value = format!("{:.2}", test.git_churn)));
        }
        if test.dependency_risk > 0.0 {
            println!("     {}", t!("risk.dependency", locale = locale, value = format!("{:.2}", test.dependency_risk)));
        }
    }
}

/// Prints frequently failing tests from the history.
pub fn print_frequent_failures(failing: &[FrequentFailure], locale: &str) {
    if failing.is_empty() {
        println!("{}", t!("history.none_failing", locale = locale).green());
        return;
    }
    println!("\n{}", t!("history.banner", locale = locale, count = failing.len()).bold());
    for entry in failing {
        println!(
            "  - {:<60} {:>6.1}% ({}/{})",
            entry.test.to_string().cyan(),
            entry.failure_rate * 100.0,
            entry.failures,
            entry.total_runs
        );
    }
}

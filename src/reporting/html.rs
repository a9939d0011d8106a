//! # HTML Reporting Module / HTML 报告模块
//!
//! Renders run and risk reports as standalone HTML pages with `maud`.
//!
//! 使用 `maud` 将运行报告和风险报告渲染为独立的 HTML 页面。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::path::Path;

use crate::core::models::{ExecutionResult, RunReport};
use crate::core::scorer::RiskBreakdown;
use crate::infra::fs::atomic_write;
use crate::infra::t;

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", sans-serif; margin: 2em; color: #222; }
table { border-collapse: collapse; width: 100%; margin-top: 1em; }
th, td { border: 1px solid #ddd; padding: 6px 10px; text-align: left; }
th { background: #f3f3f3; }
.good { color: #1a7f37; }
.bad { color: #cf222e; }
.muted { color: #777; }
.summary span { display: inline-block; margin-right: 2em; }
.risk-bar { width: 120px; height: 10px; background: #eee; display: inline-block; }
.risk-fill { height: 10px; background: #cf222e; }
details pre { background: #f6f8fa; padding: 1em; overflow-x: auto; }
"#;

fn page(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
                style { (PreEscaped(STYLE)) }
            }
            body {
                h1 { (title) }
                (body)
            }
        }
    }
}

fn batch_row(result: &ExecutionResult, locale: &str) -> Markup {
    let status_class = if result.has_failures() { "bad" } else { "good" };
    html! {
        tr {
            td { (result.batch_id + 1) }
            td { (result.tests.len()) }
            td class="good" { (result.passed.len()) }
            td class=(status_class) { (result.failed.len()) }
            td class="muted" { (result.skipped.len()) }
            td { (format!("{:.2}s", result.duration.as_secs_f64())) }
            td { (result.attempts) }
            td {
                @if result.timed_out {
                    span class="bad" { (t!("html_report.timed_out", locale = locale)) }
                } @else {
                    (result.exit_code)
                }
            }
        }
        @if result.has_failures() && (!result.stdout.is_empty() || !result.stderr.is_empty()) {
            tr {
                td colspan="8" {
                    details {
                        summary { (t!("html_report.output", locale = locale)) }
                        pre { (result.stdout) (result.stderr) }
                    }
                }
            }
        }
    }
}

/// Renders the aggregate run report.
/// 渲染汇总运行报告。
pub fn render_run_report(report: &RunReport, locale: &str) -> Markup {
    let summary = &report.summary;
    let body = html! {
        p class="muted" { (report.timestamp) }
        div class="summary" {
            span { (t!("summary.total", locale = locale)) " " strong { (summary.total_tests) } }
            span class="good" { (t!("summary.passed", locale = locale)) " " strong { (summary.total_passed) } }
            span class="bad" { (t!("summary.failed", locale = locale)) " " strong { (summary.total_failed) } }
            span class="muted" { (t!("summary.skipped", locale = locale)) " " strong { (summary.total_skipped) } }
            span { (t!("summary.pass_rate", locale = locale)) " " strong { (format!("{:.2}%", summary.pass_rate)) } }
        }
        h2 { (t!("html_report.batches", locale = locale)) }
        table {
            tr {
                th { "#" }
                th { (t!("html_report.tests", locale = locale)) }
                th { (t!("summary.passed", locale = locale)) }
                th { (t!("summary.failed", locale = locale)) }
                th { (t!("summary.skipped", locale = locale)) }
                th { (t!("html_report.duration", locale = locale)) }
                th { (t!("html_report.attempts", locale = locale)) }
                th { (t!("html_report.exit_code", locale = locale)) }
            }
            @for result in &report.batch_results {
                (batch_row(result, locale))
            }
        }
        @if !report.failed.is_empty() {
            h2 class="bad" { (t!("summary.failures_banner", locale = locale)) }
            ul {
                @for test in &report.failed {
                    li class="bad" { (test.as_str()) }
                }
            }
        }
    };
    page(&t!("html_report.run_title", locale = locale), body)
}

/// Renders the high-risk test report.
/// 渲染高风险测试报告。
pub fn render_risk_report(tests: &[RiskBreakdown], locale: &str) -> Markup {
    let bar = |value: f64| {
        html! {
            div class="risk-bar" { div class="risk-fill" style=(format!("width: {:.0}%;", value * 100.0)) {} }
            " " (format!("{value:.2}"))
        }
    };
    let body = html! {
        @if tests.is_empty() {
            p class="good" { (t!("risk.none_found", locale = locale)) }
        } @else {
            table {
                tr {
                    th { (t!("html_report.test", locale = locale)) }
                    th { (t!("html_report.total_risk", locale = locale)) }
                    th { (t!("html_report.failure_risk", locale = locale)) }
                    th { (t!("html_report.complexity", locale = locale)) }
                    th { (t!("html_report.churn", locale = locale)) }
                    th { (t!("html_report.dependency_risk", locale = locale)) }
                }
                @for test in tests {
                    tr {
                        td { (test.test_path.as_str()) }
                        td { (bar(test.total_risk)) }
                        td { (bar(test.failure_risk)) }
                        td { (bar(test.complexity)) }
                        td { (bar(test.git_churn)) }
                        td { (bar(test.dependency_risk)) }
                    }
                }
            }
        }
    };
    page(&t!("html_report.risk_title", locale = locale), body)
}

pub fn write_run_report(report: &RunReport, path: &Path, locale: &str) -> Result<()> {
    let markup = render_run_report(report, locale);
    atomic_write(path, markup.into_string().as_bytes())
        .with_context(|| format!("Failed to write HTML report to {}", path.display()))
}

pub fn write_risk_report(tests: &[RiskBreakdown], path: &Path, locale: &str) -> Result<()> {
    let markup = render_risk_report(tests, locale);
    atomic_write(path, markup.into_string().as_bytes())
        .with_context(|| format!("Failed to write HTML report to {}", path.display()))
}

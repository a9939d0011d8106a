//! # Risk Command Module / 风险命令模块
//!
//! Identifies high-risk tests from the failure history and prints or writes them.
//!
//! 根据失败历史识别高风险测试，并打印或写出它们。

use anyhow::Result;
use colored::*;
use std::path::PathBuf;

use super::{GlobalOptions, Project};
use crate::core::scorer::RiskScorer;
use crate::infra::t;
use crate::reporting::{ReportFormat, console, html, json};

/// Options of the `risk` subcommand. Flags only ever enable optional terms.
#[derive(Debug, Clone, Default)]
pub struct RiskOptions {
    pub threshold: Option<f64>,
    pub max_tests: Option<usize>,
    pub use_complexity: bool,
    pub use_churn: bool,
    pub use_dependencies: bool,
    pub no_cache: bool,
    pub report: Option<PathBuf>,
}

pub fn execute(global: &GlobalOptions, options: RiskOptions) -> Result<()> {
    let mut project = Project::load(global)?;
    let risk = &mut project.config.risk;
    if let Some(threshold) = options.threshold {
        risk.threshold = threshold;
    }
    if let Some(max_tests) = options.max_tests {
        risk.max_tests = max_tests;
    }
    risk.use_complexity |= options.use_complexity;
    risk.use_churn |= options.use_churn;
    risk.use_dependencies |= options.use_dependencies;

    let mut cache = project.open_cache(options.no_cache);
    let history = project.open_history()?;
    let scorer = RiskScorer::new(&project.root, &project.config);
    let high_risk = scorer.identify_high_risk(&mut cache, &history);
    cache.flush();

    console::print_high_risk(&high_risk, &project.locale);

    if let Some(path) = &options.report {
        match ReportFormat::from_path(path) {
            ReportFormat::Html => html::write_risk_report(&high_risk, path, &project.locale)?,
            ReportFormat::Json => json::write_risk_report(&high_risk, path)?,
        }
        println!(
            "\n{}",
            t!("report_written", locale = &project.locale, path = path.display()).green()
        );
    }
    Ok(())
}

//! # JSON Reporting Module / JSON 报告模块
//!
//! Machine-readable reports for CI consumption.

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::path::Path;

use crate::core::models::RunReport;
use crate::core::scorer::RiskBreakdown;
use crate::infra::fs::atomic_write_json;

#[derive(Serialize)]
struct RiskReport<'a> {
    timestamp: String,
    high_risk_tests: &'a [RiskBreakdown],
}

pub fn write_run_report(report: &RunReport, path: &Path) -> Result<()> {
    atomic_write_json(path, report).with_context(|| format!("Failed to write JSON report to {}", path.display()))
}

/// Writes `{ "timestamp": ..., "high_risk_tests": [...] }`.
pub fn write_risk_report(tests: &[RiskBreakdown], path: &Path) -> Result<()> {
    let report = RiskReport {
        timestamp: Local::now().to_rfc3339(),
        high_risk_tests: tests,
    };
    atomic_write_json(path, &report).with_context(|| format!("Failed to write JSON report to {}", path.display()))
}

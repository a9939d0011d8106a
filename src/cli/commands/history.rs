//! # History Command Module / 历史命令模块
//!
//! Prints the tests that fail frequently according to the failure history.
//!
//! 打印根据失败历史经常失败的测试。

use anyhow::Result;

use super::{GlobalOptions, Project};
use crate::reporting::console;

pub fn execute(global: &GlobalOptions, threshold: f64, min_runs: u64) -> Result<()> {
    let project = Project::load(global)?;
    let history = project.open_history()?;
    let failing = history.frequently_failing(threshold, min_runs);
    console::print_frequent_failures(&failing, &project.locale);
    Ok(())
}

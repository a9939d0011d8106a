//! # Risk Runner Library / Risk Runner 库
//!
//! This library provides the core functionality for the Risk Runner tool,
//! a risk-aware, batch-parallel test execution scheduler.
//!
//! 此库为 Risk Runner 工具提供核心功能，
//! 这是一个风险感知的、批次并行的测试执行调度器。
//!
//! ## Modules / 模块
//!
//! - `core` - Test inventory, risk scoring, failure history, scheduling and execution
//! - `infra` - Infrastructure services like command execution, file system and logging
//! - `reporting` - Console, JSON and HTML reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 测试清单、风险评分、失败历史、调度和执行
//! - `infra` - 基础设施服务，如命令执行、文件系统和日志
//! - `reporting` - 控制台、JSON 和 HTML 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::execution;
pub use core::models;

/// Picks the UI language from `requested`, falling back to its language part
/// (e.g. "en" from "en-US") and finally to "en".
///
/// 从 `requested` 中选择界面语言，依次回退到语言部分（例如 "en-US" 中的 "en"）和 "en"。
pub fn resolve_locale(requested: &str) -> String {
    let available = rust_i18n::available_locales!();
    if available.iter().any(|l| *l == requested) {
        return requested.to_string();
    }
    requested
        .split(['-', '_'])
        .next()
        .filter(|lang| available.iter().any(|l| l == lang))
        .unwrap_or("en")
        .to_string()
}

/// Initializes i18n from the system locale.
pub fn init() {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    rust_i18n::set_locale(&resolve_locale(&locale));
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");

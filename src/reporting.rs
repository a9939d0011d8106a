//! # Reporting Module / 报告模块
//!
//! This module handles the generation and display of reports in multiple formats:
//! colorful console summaries with internationalization support, HTML pages and
//! JSON documents.
//!
//! 此模块处理多种格式的报告生成和显示：支持国际化的彩色控制台摘要、HTML 页面和 JSON 文档。

pub mod console;
pub mod html;
pub mod json;

/// Output format chosen from a report path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Html,
}

impl ReportFormat {
    /// `.html` / `.htm` select HTML; anything else is JSON.
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm") => ReportFormat::Html,
            _ => ReportFormat::Json,
        }
    }
}

//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for the risk runner,
//! including process execution, file system operations, logging and i18n support.
//!
//! 此模块为风险运行器提供基础设施服务，
//! 包括进程执行、文件系统操作、日志记录和国际化支持。

pub mod command;
pub mod fs;
pub mod logging;

// Re-export i18n functions for easier access
pub use rust_i18n::t;

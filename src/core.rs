//! # Core Module / 核心模块
//!
//! This module contains the core functionality of the risk runner: data models,
//! configuration, the inventory and its cache, risk scoring, the failure history,
//! batch scheduling and the execution engine.
//!
//! 此模块包含风险运行器的核心功能：数据模型、配置、测试清单及其缓存、风险评分、
//! 失败历史、批次调度和执行引擎。

pub mod analysis;
pub mod cache;
pub mod config;
pub mod execution;
pub mod history;
pub mod inventory;
pub mod markers;
pub mod models;
pub mod scheduler;
pub mod scorer;

// Re-exports
pub use cache::Cache;
pub use config::RunnerConfig;
pub use execution::{BatchExecutor, EngineOptions, ExecutionEngine};
pub use history::HistoryStore;
pub use models::{Batch, BatchOutcome, ExecutionResult, RunReport, TestId};

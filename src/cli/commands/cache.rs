//! # Cache Command Module / 缓存命令模块
//!
//! Maintenance of the collection and complexity caches. The failure history is kept
//! in the cache directory too but is never removed here.
//!
//! 收集缓存和复杂度缓存的维护。失败历史也保存在缓存目录中，但这里永远不会删除它。

use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;

use super::{GlobalOptions, Project};
use crate::infra::t;

/// `cache clear [--selective]`.
pub fn clear(global: &GlobalOptions, selective: bool) -> Result<()> {
    let project = Project::load(global)?;
    let mut cache = project.open_cache(false);
    cache
        .clear(selective)
        .with_context(|| t!("cache.clear_failed", locale = &project.locale, path = cache.dir().display()).to_string())?;

    let message = if selective {
        t!("cache.cleared_selective", locale = &project.locale)
    } else {
        t!("cache.cleared", locale = &project.locale)
    };
    println!("{}", message.green());
    Ok(())
}

/// `cache invalidate FILES...`: marks the files stale so that the next collection of
/// their directories runs afresh.
pub fn invalidate(global: &GlobalOptions, files: &[PathBuf]) -> Result<()> {
    let project = Project::load(global)?;
    let mut cache = project.open_cache(false);
    let resolved: Vec<PathBuf> = files.iter().map(|file| project.resolve(file)).collect();
    let updated = cache.invalidate(&resolved);
    cache.flush();

    println!(
        "{}",
        t!("cache.invalidated", locale = &project.locale, count = updated, total = files.len()).green()
    );
    Ok(())
}

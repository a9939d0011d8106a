//! # Collect Command Module / 收集命令模块
//!
//! Lists the tests of the selected categories with per-category counts.
//!
//! 列出所选类别的测试以及每个类别的数量。

use anyhow::Result;

use super::{GlobalOptions, Project};
use crate::core::inventory::{CollectFilters, Inventory};
use crate::core::models::TestCategory;
use crate::reporting::console;

pub fn execute(
    global: &GlobalOptions,
    categories: &[TestCategory],
    filters: &CollectFilters,
    list: bool,
    no_cache: bool,
) -> Result<()> {
    let project = Project::load(global)?;
    let mut cache = project.open_cache(no_cache);
    let collector = project.collector();
    let inventory = Inventory::new(&project.root, &project.config, &collector);

    let collected = inventory.collect_all(&mut cache, categories, filters);
    cache.flush();

    console::print_collection(&collected, list, &project.locale);
    Ok(())
}

//! # Batch Scheduler Module / 批次调度模块
//!
//! Partitions a test set into balanced batches with a greedy, descending-cost
//! bin-packing heuristic. Per-test cost comes from a [`CostModel`].
//!
//! 使用贪心的降序成本装箱启发式算法将测试集划分为均衡的批次。每个测试的成本来自 [`CostModel`]。

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::core::config::{CategoryRoots, CostMode};
use crate::core::history::HistoryStore;
use crate::core::models::{Batch, SpeedMarker, TestCategory, TestId};

/// Estimated cost of running a single test.
/// 运行单个测试的估算成本。
pub trait CostModel {
    fn cost(&self, test: &TestId) -> f64;
}

/// Every test costs 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformCost;

impl CostModel for UniformCost {
    fn cost(&self, _test: &TestId) -> f64 {
        1.0
    }
}

/// Recorded mean duration when known, otherwise `1.0 x category factor x marker factor`.
///
/// 已知时使用记录的平均持续时间，否则为 `1.0 x 类别因子 x 标记因子`。
#[derive(Debug, Clone, Default)]
pub struct WeightedCost {
    categories: CategoryRoots,
    durations: HashMap<TestId, f64>,
    markers: HashMap<TestId, SpeedMarker>,
}

impl WeightedCost {
    pub fn new(categories: CategoryRoots) -> Self {
        Self {
            categories,
            ..Self::default()
        }
    }

    /// Uses the mean per-test durations recorded in `history`.
    pub fn with_history(mut self, history: &HistoryStore) -> Self {
        self.durations = history
            .records()
            .filter_map(|(test, record)| {
                record
                    .mean_duration_secs
                    .filter(|secs| *secs > 0.0)
                    .map(|secs| (test.clone(), secs))
            })
            .collect();
        self
    }

    pub fn with_markers(mut self, markers: impl IntoIterator<Item = (TestId, SpeedMarker)>) -> Self {
        self.markers.extend(markers);
        self
    }

    fn category_factor(category: Option<TestCategory>) -> f64 {
        match category {
            Some(TestCategory::Behavior) => 2.0,
            Some(TestCategory::Integration) => 1.5,
            _ => 1.0,
        }
    }
}

impl CostModel for WeightedCost {
    fn cost(&self, test: &TestId) -> f64 {
        if let Some(secs) = self.durations.get(test) {
            return *secs;
        }
        let category = self.categories.categorize(test.as_str());
        let marker = self.markers.get(test).map_or(1.0, |m| m.cost_factor());
        Self::category_factor(category) * marker
    }
}

/// Selects the cost model once from the configured mode. The weighted model is only
/// built in enhanced mode.
/// 根据配置的模式一次性选择成本模型。加权模型仅在增强模式下构建。
pub fn select_cost_model(mode: CostMode, weighted: impl FnOnce() -> WeightedCost) -> Box<dyn CostModel> {
    match mode {
        CostMode::Basic => Box::new(UniformCost),
        CostMode::Enhanced => Box::new(weighted()),
    }
}

/// A test paired with its estimated cost.
#[derive(Debug, Clone, PartialEq)]
pub struct CostedTest {
    pub test: TestId,
    pub cost: f64,
}

pub fn with_costs<M: CostModel + ?Sized>(tests: &[TestId], model: &M) -> Vec<CostedTest> {
    tests
        .iter()
        .map(|test| CostedTest {
            test: test.clone(),
            cost: model.cost(test),
        })
        .collect()
}

/// Greedy descending-cost partition.
///
/// Tests are stably sorted by cost descending, then each goes to the batch with the
/// lowest cumulative cost among batches holding fewer than `target_batch_size` tests
/// (lowest index on ties), opening a new batch when every batch is full. Duplicate ids
/// keep their first occurrence. A target of 0 is treated as 1.
///
/// 贪心降序成本划分。
/// 测试按成本降序稳定排序，然后每个测试分配给成员数少于 `target_batch_size` 的批次中累计成本最低的批次
/// （相同时取最低索引），所有批次都满时打开新批次。重复的 id 保留第一次出现。
pub fn schedule(tests: Vec<CostedTest>, target_batch_size: usize) -> Vec<Batch> {
    let target = target_batch_size.max(1);

    let mut seen = HashSet::new();
    let mut tests: Vec<CostedTest> = tests
        .into_iter()
        .filter(|t| seen.insert(t.test.clone()))
        .collect();
    tests.sort_by(|a, b| b.cost.total_cmp(&a.cost));

    let mut batches: Vec<Batch> = Vec::new();
    for costed in tests {
        let open = batches
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() < target)
            .min_by(|(ia, a), (ib, b)| a.cost.total_cmp(&b.cost).then(ia.cmp(ib)))
            .map(|(index, _)| index);
        let index = match open {
            Some(index) => index,
            None => {
                batches.push(Batch::new(batches.len()));
                batches.len() - 1
            }
        };
        let batch = &mut batches[index];
        batch.cost += costed.cost;
        batch.tests.push(costed.test);
    }

    debug!(batches = batches.len(), target, "scheduled batches");
    batches
}

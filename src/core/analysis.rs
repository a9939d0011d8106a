//! # Static Analysis Module / 静态分析模块
//!
//! Line-based source metrics used by the complexity score, and an import graph used
//! to derive test dependencies. Both are deliberately shallow: they only look at text.
//!
//! 复杂度分数使用的基于行的源代码指标，以及用于推导测试依赖关系的导入图。

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use crate::core::models::TestId;

/// Counts extracted from a test source file.
/// 从测试源文件中提取的计数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceMetrics {
    /// Non-blank, non-comment lines / 非空、非注释行
    pub lines: usize,
    pub asserts: usize,
    pub fixtures: usize,
    pub parametrize: usize,
}

impl SourceMetrics {
    pub fn from_source(source: &str) -> Self {
        let mut metrics = SourceMetrics::default();
        for line in source.lines() {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                metrics.lines += 1;
            }
            if line.contains("assert") {
                metrics.asserts += 1;
            }
            if line.contains("@pytest.fixture") {
                metrics.fixtures += 1;
            }
            if line.contains("@pytest.mark.parametrize") {
                metrics.parametrize += 1;
            }
        }
        metrics
    }

    /// Weighted, saturating combination of the counts, in `[0, 1]`.
    /// 计数的加权饱和组合，范围为 `[0, 1]`。
    pub fn complexity(&self) -> f64 {
        let ratio = |count: usize, cap: f64| (count as f64 / cap).min(1.0);
        let score = 0.4 * ratio(self.lines, 500.0)
            + 0.3 * ratio(self.asserts, 20.0)
            + 0.2 * ratio(self.fixtures, 5.0)
            + 0.1 * ratio(self.parametrize, 3.0);
        score.clamp(0.0, 1.0)
    }
}

pub fn analyze_file(path: &Path) -> io::Result<SourceMetrics> {
    fs::read_to_string(path).map(|source| SourceMetrics::from_source(&source))
}

/// Dotted module name of a source path: `tests/unit/test_a.py` -> `tests.unit.test_a`.
pub fn module_name(path: &str) -> String {
    let path = path.trim_start_matches("./").replace('\\', "/");
    let stem = match path.rfind('.') {
        Some(dot) if !path[dot..].contains('/') => &path[..dot],
        _ => path.as_str(),
    };
    let name = stem.replace('/', ".");
    name.strip_suffix(".__init__").map(str::to_string).unwrap_or(name)
}

/// Modules imported by `source`. Relative imports are resolved against `module`.
///
/// Recognizes `import a.b [as c], d` and `from a.b import c` forms.
pub fn parse_imports(source: &str, module: &str) -> Vec<String> {
    let mut imports = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("import ") {
            for part in rest.split(',') {
                if let Some(name) = part.split_whitespace().next() {
                    imports.push(name.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            let rest = rest.trim_start();
            let Some(target) = rest.split_whitespace().next() else {
                continue;
            };
            if rest[target.len()..].trim_start().starts_with("import") {
                if let Some(resolved) = resolve_relative(target, module) {
                    imports.push(resolved);
                }
            }
        }
    }
    imports
}

fn resolve_relative(target: &str, module: &str) -> Option<String> {
    let level = target.chars().take_while(|c| *c == '.').count();
    if level == 0 {
        return Some(target.to_string());
    }
    let mut package: Vec<&str> = module.split('.').collect();
    // The module itself is not a package.
    package.pop();
    for _ in 1..level {
        package.pop()?;
    }
    let rest = &target[level..];
    if !rest.is_empty() {
        package.push(rest);
    }
    if package.is_empty() { None } else { Some(package.join(".")) }
}

fn prefix_related(import: &str, module: &str) -> bool {
    import == module
        || import.starts_with(&format!("{module}."))
        || module.starts_with(&format!("{import}."))
}

/// Test-to-test dependencies derived from the import graph of the test files.
/// A test depends on every test whose file it imports, by module-name prefix proximity.
///
/// 从测试文件的导入图推导出的测试间依赖关系。
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    by_file: IndexMap<String, Vec<TestId>>,
    file_deps: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Builds the graph for `tests`, reading their source files below `root`.
    /// Unreadable files simply have no dependencies.
    pub fn build(root: &Path, tests: &[TestId]) -> Self {
        let mut by_file: IndexMap<String, Vec<TestId>> = IndexMap::new();
        for test in tests {
            by_file
                .entry(test.file_path().to_string())
                .or_default()
                .push(test.clone());
        }

        let modules: Vec<(String, String)> = by_file
            .keys()
            .map(|file| (file.clone(), module_name(file)))
            .collect();

        let mut file_deps = IndexMap::new();
        for (file, module) in &modules {
            let Ok(source) = fs::read_to_string(root.join(file)) else {
                continue;
            };
            let imports = parse_imports(&source, module);
            let deps: Vec<String> = modules
                .iter()
                .filter(|(other, other_module)| {
                    other != file && imports.iter().any(|i| prefix_related(i, other_module))
                })
                .map(|(other, _)| other.clone())
                .collect();
            file_deps.insert(file.clone(), deps);
        }

        Self { by_file, file_deps }
    }

    /// The tests `test` depends on.
    pub fn dependencies_of(&self, test: &TestId) -> Vec<&TestId> {
        let mut seen = HashSet::new();
        self.file_deps
            .get(test.file_path())
            .into_iter()
            .flatten()
            .filter_map(|file| self.by_file.get(file))
            .flatten()
            .filter(|dep| *dep != test && seen.insert(*dep))
            .collect()
    }
}

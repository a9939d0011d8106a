//! # Marker Detection Module / 标记检测模块
//!
//! Best-effort detection of speed markers in test source files. Detection is an
//! explicit, ordered chain of strategies; the first strategy that yields a marker wins.
//!
//! 在测试源文件中尽力检测速度标记。检测是一个显式的、有序的策略链；
//! 第一个产生标记的策略胜出。

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::core::cache::Cache;
use crate::core::models::{SpeedMarker, TestId};

/// Bytes inspected before a test declaration.
pub const PRECEDING_WINDOW: usize = 1000;
/// Bytes inspected after a test declaration.
pub const FOLLOWING_WINDOW: usize = 500;

/// Everything a strategy may look at for one test.
/// 策略针对一个测试可以查看的所有内容。
#[derive(Debug, Clone, Copy)]
pub struct MarkerContext<'a> {
    pub source: &'a str,
    pub test_name: Option<&'a str>,
    pub class_name: Option<&'a str>,
    /// Decorator prefix, e.g. `@pytest.mark.` / 装饰器前缀
    pub prefix: &'a str,
}

impl<'a> MarkerContext<'a> {
    pub fn new(source: &'a str, test: &'a TestId, prefix: &'a str) -> Self {
        Self {
            source,
            test_name: test.test_name(),
            class_name: test.class_name(),
            prefix,
        }
    }

    /// Byte offset of the test declaration, searched after the enclosing class when
    /// there is one. Also returns the class offset.
    fn declaration(&self) -> Option<(usize, Option<usize>)> {
        let name = self.test_name?;
        match self.class_name {
            Some(class) => {
                let class_pos = find_declaration(self.source, "class", class, 0)?;
                let decl = find_declaration(self.source, "def", name, class_pos)?;
                Some((decl, Some(class_pos)))
            }
            None => find_declaration(self.source, "def", name, 0).map(|decl| (decl, None)),
        }
    }
}

/// A single marker detection strategy.
/// 单个标记检测策略。
pub trait MarkerStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, ctx: &MarkerContext<'_>) -> Option<SpeedMarker>;
}

/// Looks at a bounded window before the declaration, clipped to the enclosing class.
pub struct PrecedingWindow {
    pub bytes: usize,
}

impl MarkerStrategy for PrecedingWindow {
    fn name(&self) -> &'static str {
        "preceding-window"
    }

    fn detect(&self, ctx: &MarkerContext<'_>) -> Option<SpeedMarker> {
        let (decl, class_pos) = ctx.declaration()?;
        let mut start = decl.saturating_sub(self.bytes);
        if let Some(class_pos) = class_pos {
            start = start.max(class_pos);
        }
        let window = slice(ctx.source, start, decl);
        first_marker(window, ctx.prefix)
    }
}

/// Looks at a bounded window after the declaration (misplaced markers).
pub struct FollowingWindow {
    pub bytes: usize,
}

impl MarkerStrategy for FollowingWindow {
    fn name(&self) -> &'static str {
        "following-window"
    }

    fn detect(&self, ctx: &MarkerContext<'_>) -> Option<SpeedMarker> {
        let (decl, _) = ctx.declaration()?;
        let window = slice(ctx.source, decl, decl.saturating_add(self.bytes));
        first_marker(window, ctx.prefix)
    }
}

/// When the test name is known and the file uses exactly one marker type, that type.
pub struct SingleMarkerFile;

impl MarkerStrategy for SingleMarkerFile {
    fn name(&self) -> &'static str {
        "single-marker-file"
    }

    fn detect(&self, ctx: &MarkerContext<'_>) -> Option<SpeedMarker> {
        ctx.test_name?;
        let present: Vec<SpeedMarker> = SpeedMarker::ALL
            .into_iter()
            .filter(|m| contains_marker(ctx.source, ctx.prefix, *m))
            .collect();
        match present.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// First marker type found anywhere in the file, in fast, medium, slow order.
pub struct AnyMarkerInFile;

impl MarkerStrategy for AnyMarkerInFile {
    fn name(&self) -> &'static str {
        "any-marker-in-file"
    }

    fn detect(&self, ctx: &MarkerContext<'_>) -> Option<SpeedMarker> {
        first_marker(ctx.source, ctx.prefix)
    }
}

/// The ordered strategy chain.
/// 有序的策略链。
pub struct MarkerDetector {
    prefix: String,
    strategies: Vec<Box<dyn MarkerStrategy>>,
}

impl MarkerDetector {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_strategies(
            prefix,
            vec![
                Box::new(PrecedingWindow {
                    bytes: PRECEDING_WINDOW,
                }),
                Box::new(FollowingWindow {
                    bytes: FOLLOWING_WINDOW,
                }),
                Box::new(SingleMarkerFile),
                Box::new(AnyMarkerInFile),
            ],
        )
    }

    pub fn with_strategies(prefix: impl Into<String>, strategies: Vec<Box<dyn MarkerStrategy>>) -> Self {
        Self {
            prefix: prefix.into(),
            strategies,
        }
    }

    /// Runs the chain over already loaded source text.
    pub fn detect_in(&self, source: &str, test: &TestId) -> Option<SpeedMarker> {
        let ctx = MarkerContext::new(source, test, &self.prefix);
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.detect(&ctx);
            if let Some(marker) = found {
                debug!(test = %test, strategy = strategy.name(), marker = %marker, "marker detected");
            }
            found
        })
    }

    /// `has_marker(test) -> (bool, marker)`, reading the test's source file from
    /// `root`. An unreadable file means no marker.
    ///
    /// 从 `root` 读取测试的源文件。无法读取的文件意味着没有标记。
    pub fn has_marker(&self, root: &Path, test: &TestId) -> (bool, Option<SpeedMarker>) {
        let path = root.join(test.file_path());
        match fs::read_to_string(&path) {
            Ok(source) => {
                let marker = self.detect_in(&source, test);
                (marker.is_some(), marker)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot read test source for markers");
                (false, None)
            }
        }
    }

    /// Marker lookup memoized in `cache`.
    /// 记忆在 `cache` 中的标记查找。
    pub fn lookup(&self, cache: &mut Cache, root: &Path, test: &TestId) -> Option<SpeedMarker> {
        if let Some(memo) = cache.marker(test) {
            return memo;
        }
        let (_, marker) = self.has_marker(root, test);
        cache.store_marker(test, marker);
        marker
    }
}

/// Finds `<keyword>\s+<name>\s*` followed by `(` (and `:` for classes) starting at `from`.
pub(crate) fn find_declaration(source: &str, keyword: &str, name: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut search = from.min(source.len());
    while let Some(rel) = source.get(search..)?.find(keyword) {
        let start = search + rel;
        search = start + keyword.len();

        let preceded_ok = start == 0 || !is_ident(bytes[start - 1]);
        let mut i = start + keyword.len();
        let ws_start = i;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if !preceded_ok || i == ws_start || !source[i..].starts_with(name) {
            continue;
        }
        i += name.len();
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
        let accepted = match bytes.get(i) {
            Some(b'(') => true,
            Some(b':') => keyword == "class",
            _ => false,
        };
        if accepted {
            return Some(start);
        }
    }
    None
}

/// Whether `text` contains `<prefix><marker>` followed by end of text, whitespace or `(`.
pub fn contains_marker(text: &str, prefix: &str, marker: SpeedMarker) -> bool {
    let needle = format!("{prefix}{}", marker.as_str());
    text.match_indices(&needle).any(|(pos, _)| {
        match text.as_bytes().get(pos + needle.len()) {
            None => true,
            Some(b) => b.is_ascii_whitespace() || *b == b'(',
        }
    })
}

fn first_marker(text: &str, prefix: &str) -> Option<SpeedMarker> {
    SpeedMarker::ALL
        .into_iter()
        .find(|m| contains_marker(text, prefix, *m))
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Slices `source[start..end]` after moving both ends onto char boundaries.
fn slice(source: &str, start: usize, end: usize) -> &str {
    let mut start = start.min(source.len());
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = end.min(source.len()).max(start);
    while !source.is_char_boundary(end) {
        end += 1;
    }
    &source[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_requires_exact_name() {
        let src = "def test_ab():\n    pass\ndef test_a():\n    pass\n";
        let pos = find_declaration(src, "def", "test_a", 0).unwrap();
        assert_eq!(&src[pos..pos + 14], "def test_a():\n");
    }

    #[test]
    fn marker_needs_terminator() {
        assert!(contains_marker("@pytest.mark.slow\n", "@pytest.mark.", SpeedMarker::Slow));
        assert!(contains_marker("@pytest.mark.fast(reason)", "@pytest.mark.", SpeedMarker::Fast));
        assert!(!contains_marker("@pytest.mark.slowish\n", "@pytest.mark.", SpeedMarker::Slow));
    }

    #[test]
    fn window_slicing_respects_char_boundaries() {
        let src = "é".repeat(10);
        assert_eq!(slice(&src, 1, 4), "éé");
    }
}

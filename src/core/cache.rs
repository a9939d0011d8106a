//! # Cache Module / 缓存模块
//!
//! An explicit cache handle for collection results, marker lookups and complexity
//! scores. The handle is opened once per command, passed by `&mut` to whoever needs it
//! and flushed explicitly at the end.
//!
//! 用于收集结果、标记查找和复杂度分数的显式缓存句柄。
//! 每个命令打开一次句柄，以 `&mut` 传递给需要的组件，并在结束时显式刷新。
//!
//! Cache persistence is best effort: a malformed file yields an empty cache and a
//! failed write only logs a warning.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::core::models::{SpeedMarker, TestId};
use crate::infra::fs::{atomic_write_json, modified_secs, path_key, source_files};

pub const COLLECTION_CACHE_FILE: &str = "test_collection_cache.json";
pub const COMPLEXITY_CACHE_FILE: &str = "test_complexity_cache.json";
/// Value written to `last_updated` by a selective clear.
pub const STALE_TIMESTAMP: &str = "2000-01-01T00:00:00";
/// Entry holding memoized marker lookups.
pub const MARKER_ENTRY: &str = "markers_fast,medium,slow";

/// Prefix of collection entry keys.
const COLLECT_PREFIX: &str = "collect:";

/// Metadata record of the collection cache file.
/// 收集缓存文件的元数据记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(default = "now_iso")]
    pub last_updated: String,
    /// Tracked modification time per source file / 每个源文件被跟踪的修改时间
    #[serde(default)]
    pub file_timestamps: IndexMap<String, f64>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            last_updated: now_iso(),
            file_timestamps: IndexMap::new(),
            extra: IndexMap::new(),
        }
    }
}

/// On-disk layout: a `metadata` record plus arbitrary keyed entries.
/// Keys this crate does not know are preserved on rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub metadata: CacheMetadata,
    #[serde(flatten)]
    pub entries: IndexMap<String, Value>,
}

/// A cached collection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub directory: String,
    pub tests: Vec<TestId>,
    /// Source files that contributed to the result / 参与生成结果的源文件
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub collected_at: f64,
}

/// The cache handle.
/// 缓存句柄。
#[derive(Debug)]
pub struct Cache {
    dir: PathBuf,
    source_extension: String,
    enabled: bool,
    document: CacheDocument,
    complexity: IndexMap<String, f64>,
    dirty: bool,
    complexity_dirty: bool,
}

impl Cache {
    /// Opens the cache stored in `dir`. Missing or malformed files give an empty cache.
    /// 打开存储在 `dir` 中的缓存。缺失或格式错误的文件会产生一个空缓存。
    pub fn open(dir: impl Into<PathBuf>, source_extension: &str) -> Self {
        let dir = dir.into();
        let document = load_json::<CacheDocument>(&dir.join(COLLECTION_CACHE_FILE)).unwrap_or_default();
        let complexity =
            load_json::<IndexMap<String, f64>>(&dir.join(COMPLEXITY_CACHE_FILE)).unwrap_or_default();
        Self {
            dir,
            source_extension: source_extension.to_string(),
            enabled: true,
            document,
            complexity,
            dirty: false,
            complexity_dirty: false,
        }
    }

    /// A cache that is bypassed: lookups miss and nothing is written.
    /// 被绕过的缓存：查找总是未命中，且不会写入任何内容。
    pub fn bypassed(dir: impl Into<PathBuf>, source_extension: &str) -> Self {
        Self {
            dir: dir.into(),
            source_extension: source_extension.to_string(),
            enabled: false,
            document: CacheDocument::default(),
            complexity: IndexMap::new(),
            dirty: false,
            complexity_dirty: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn collection_path(&self) -> PathBuf {
        self.dir.join(COLLECTION_CACHE_FILE)
    }

    pub fn complexity_path(&self) -> PathBuf {
        self.dir.join(COMPLEXITY_CACHE_FILE)
    }

    pub fn metadata(&self) -> &CacheMetadata {
        &self.document.metadata
    }

    pub fn document(&self) -> &CacheDocument {
        &self.document
    }

    /// Builds the entry key for a directory and a filter fingerprint.
    pub fn collection_key(directory: &Path, filters: &str) -> String {
        format!("{COLLECT_PREFIX}{}:{filters}", path_key(directory))
    }

    /// Returns the cached tests for `key` when the entry is still valid.
    ///
    /// An entry is stale when any source file under its directory is newer than its
    /// tracked timestamp (untracked files count as 0), is newer than the collection
    /// itself, or when a contributing file has vanished.
    ///
    /// 当条目仍然有效时，返回 `key` 对应的缓存测试。
    pub fn lookup_collection(&self, key: &str) -> Option<Vec<TestId>> {
        if !self.enabled {
            return None;
        }
        let value = self.document.entries.get(key)?;
        let entry: CollectionEntry = match serde_json::from_value(value.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable cache entry");
                return None;
            }
        };
        if self.is_valid(&entry) {
            debug!(key, tests = entry.tests.len(), "collection cache hit");
            Some(entry.tests)
        } else {
            debug!(key, "collection cache entry is stale");
            None
        }
    }

    fn is_valid(&self, entry: &CollectionEntry) -> bool {
        let files = source_files(Path::new(&entry.directory), &self.source_extension);
        let current: Vec<String> = files.iter().map(|f| path_key(f)).collect();

        if entry.files.iter().any(|tracked| !current.contains(tracked)) {
            return false;
        }
        files.iter().zip(&current).all(|(file, key)| {
            let tracked = self
                .document
                .metadata
                .file_timestamps
                .get(key)
                .copied()
                .unwrap_or(0.0);
            match modified_secs(file) {
                Some(mtime) => mtime <= tracked && mtime <= entry.collected_at,
                None => false,
            }
        })
    }

    /// Stores a fresh collection and records the timestamps of every source file under
    /// `directory`. Tracked files that no longer exist there are forgotten.
    pub fn store_collection(&mut self, key: &str, directory: &Path, tests: &[TestId]) {
        if !self.enabled {
            return;
        }
        let files = source_files(directory, &self.source_extension);
        let dir_key = path_key(directory);
        let current: Vec<String> = files.iter().map(|f| path_key(f)).collect();

        let timestamps = &mut self.document.metadata.file_timestamps;
        timestamps.retain(|tracked, _| {
            !(tracked.starts_with(&format!("{dir_key}/")) && !current.contains(tracked))
        });
        for (file, file_key) in files.iter().zip(&current) {
            if let Some(mtime) = modified_secs(file) {
                timestamps.insert(file_key.clone(), mtime);
            }
        }

        let entry = CollectionEntry {
            directory: dir_key,
            tests: tests.to_vec(),
            files: current,
            collected_at: now_secs(),
        };
        match serde_json::to_value(&entry) {
            Ok(value) => {
                self.document.entries.insert(key.to_string(), value);
                self.document.entries.shift_remove(MARKER_ENTRY);
                self.document.metadata.last_updated = now_iso();
                self.dirty = true;
            }
            Err(e) => warn!(key, error = %e, "failed to encode cache entry"),
        }
    }

    /// Memoized marker lookup: `Some(result)` when the test has been looked up before.
    pub fn marker(&self, test: &TestId) -> Option<Option<SpeedMarker>> {
        if !self.enabled {
            return None;
        }
        let markers = self.document.entries.get(MARKER_ENTRY)?.as_object()?;
        let value = markers.get(test.as_str())?;
        Some(value.as_str().and_then(|m| m.parse().ok()))
    }

    pub fn store_marker(&mut self, test: &TestId, marker: Option<SpeedMarker>) {
        if !self.enabled {
            return;
        }
        let entry = self
            .document
            .entries
            .entry(MARKER_ENTRY.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if !entry.is_object() {
            *entry = Value::Object(Default::default());
        }
        if let Value::Object(map) = entry {
            let value = marker.map_or(Value::Null, |m| Value::String(m.as_str().to_string()));
            map.insert(test.as_str().to_string(), value);
            self.dirty = true;
        }
    }

    pub fn complexity(&self, test: &TestId) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        self.complexity.get(test.as_str()).copied()
    }

    pub fn store_complexity(&mut self, test: &TestId, score: f64) {
        if !self.enabled {
            return;
        }
        self.complexity.insert(test.as_str().to_string(), score);
        self.complexity_dirty = true;
    }

    /// Marks the given files stale without deleting the cache structure: their tracked
    /// timestamps are reset to 0 and memoized marker data is dropped.
    /// Returns the number of files whose timestamps were reset.
    ///
    /// 将给定文件标记为过期，而不删除缓存结构：其跟踪的时间戳重置为 0，并丢弃记忆的标记数据。
    pub fn invalidate<P: AsRef<Path>>(&mut self, files: &[P]) -> usize {
        let mut updated = 0;
        for file in files {
            let file = file.as_ref();
            if file.exists() {
                self.document
                    .metadata
                    .file_timestamps
                    .insert(path_key(file), 0.0);
                updated += 1;
            }
        }
        self.document.entries.shift_remove(MARKER_ENTRY);
        self.dirty = true;
        debug!(updated, "invalidated cached file timestamps");
        updated
    }

    /// Clears the cache.
    ///
    /// Selective: `last_updated` is pushed back, tracked timestamps and the complexity
    /// cache are emptied, entries stay in place. Full: the cache files are removed.
    /// The failure history is never touched.
    ///
    /// 清除缓存。选择性清除：`last_updated` 被推回，跟踪的时间戳和复杂度缓存被清空，条目保留。
    /// 完全清除：删除缓存文件。失败历史永远不会被触及。
    pub fn clear(&mut self, selective: bool) -> io::Result<()> {
        if selective {
            self.document.metadata.last_updated = STALE_TIMESTAMP.to_string();
            self.document.metadata.file_timestamps.clear();
            self.complexity.clear();
            self.dirty = true;
            self.complexity_dirty = true;
            self.flush();
            return Ok(());
        }

        for path in [self.collection_path(), self.complexity_path()] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed cache file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        self.document = CacheDocument::default();
        self.complexity.clear();
        self.dirty = false;
        self.complexity_dirty = false;
        Ok(())
    }

    /// Writes pending changes. Failures are logged and otherwise ignored.
    /// 写入待处理的更改。失败只记录日志，否则忽略。
    pub fn flush(&mut self) {
        if !self.enabled {
            return;
        }
        if self.dirty {
            let path = self.collection_path();
            match atomic_write_json(&path, &self.document) {
                Ok(()) => self.dirty = false,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to write cache"),
            }
        }
        if self.complexity_dirty {
            let path = self.complexity_path();
            match atomic_write_json(&path, &self.complexity) {
                Ok(()) => self.complexity_dirty = false,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to write complexity cache"),
            }
        }
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read cache file, starting empty");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed cache file, starting empty");
            None
        }
    }
}

fn now_iso() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

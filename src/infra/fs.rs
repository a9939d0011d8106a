//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations:
//! atomic JSON persistence, source-file discovery and modification timestamps.
//!
//! 此模块提供文件系统操作的实用功能：
//! 原子化 JSON 持久化、源文件发现和修改时间戳。

use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Writes `bytes` to `path` atomically.
///
/// The content goes to a temporary file in the destination directory first, which is
/// then renamed over the target, so readers never observe a half-written file.
///
/// 原子化地将 `bytes` 写入 `path`。
/// 内容首先写入目标目录中的临时文件，然后重命名覆盖目标，因此读取者永远不会看到写了一半的文件。
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    atomic_write(path, &bytes)
}

/// Lists every file under `dir` with the given extension, sorted by path.
/// A missing directory yields an empty list.
///
/// 列出 `dir` 下具有给定扩展名的所有文件，按路径排序。目录不存在时返回空列表。
pub fn source_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    files
}

/// Modification time of `path` in fractional seconds since the Unix epoch.
/// 文件 `path` 的修改时间，以自 Unix 纪元以来的秒数（带小数）表示。
pub fn modified_secs(path: &Path) -> Option<f64> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
}

/// Path key used in persisted maps: forward slashes, no leading `./`.
pub fn path_key(path: &Path) -> String {
    let key = path.to_string_lossy().replace('\\', "/");
    key.strip_prefix("./").map(str::to_string).unwrap_or(key)
}

//! # Command Execution Module / 命令执行模块
//!
//! This module spawns the external test runner: once per batch for execution and once
//! per directory for collection. It expands command templates, captures output and
//! parses the runner's per-test status lines.
//!
//! 此模块派生外部测试运行器：每个批次执行一次，每个目录收集一次。
//! 它展开命令模板、捕获输出并解析运行器的每个测试状态行。

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::core::execution::BatchExecutor;
use crate::core::inventory::{TestCollector, looks_like_test_id};
use crate::core::models::{Batch, BatchOutcome, RunnerReport, TestId};

/// Placeholder for the directory in the collect command.
pub const TARGET_PLACEHOLDER: &str = "{target}";
/// Placeholder for the batch membership in the run command.
pub const TESTS_PLACEHOLDER: &str = "{tests}";

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("failed to expand command `{template}`: {reason}")]
    Expansion { template: String, reason: String },
    #[error("failed to parse command: {0}")]
    Split(String),
    #[error("command template is empty")]
    Empty,
}

/// Expands a command template into program arguments.
///
/// Environment variables and `~` are expanded first, then the template is split with
/// shell rules. A token that is exactly `placeholder` expands to one argument per value;
/// a placeholder embedded in a larger token is replaced by the space-joined values.
///
/// 将命令模板展开为程序参数。
/// 首先展开环境变量和 `~`，然后按照 shell 规则拆分模板。
/// 恰好等于占位符的标记会展开为每个值一个参数；嵌入在更大标记中的占位符会被替换为以空格连接的值。
pub fn expand_template(
    template: &str,
    placeholder: &str,
    values: &[String],
) -> Result<Vec<String>, CommandError> {
    let expanded = shellexpand::full(template).map_err(|e| CommandError::Expansion {
        template: template.to_string(),
        reason: e.to_string(),
    })?;
    let tokens = shlex::split(&expanded).ok_or_else(|| CommandError::Split(expanded.to_string()))?;

    let mut args = Vec::with_capacity(tokens.len() + values.len());
    for token in tokens {
        if token == placeholder {
            args.extend(values.iter().cloned());
        } else if token.contains(placeholder) {
            args.push(token.replace(placeholder, &values.join(" ")));
        } else {
            args.push(token);
        }
    }
    if args.is_empty() {
        return Err(CommandError::Empty);
    }
    Ok(args)
}

const STATUS_WORDS: [&str; 3] = ["PASSED", "FAILED", "SKIPPED"];

/// Parses `<test id> PASSED|FAILED|SKIPPED ...` lines.
///
/// Everything before the status word is the reported id, so parametrized ids that
/// contain spaces stay whole. Summary lines that start with the status word
/// (`FAILED <id> - reason`) report the text up to ` - ` instead. Status words are
/// checked in passed, failed, skipped order.
///
/// 解析 `<test id> PASSED|FAILED|SKIPPED ...` 行。状态词之前的全部内容即为测试 id。
pub fn parse_runner_output(stdout: &str) -> (Vec<TestId>, Vec<TestId>, Vec<TestId>) {
    let mut passed = Vec::new();
    let mut failed = Vec::new();
    let mut skipped = Vec::new();

    for line in stdout.lines() {
        let tokens = token_spans(line);
        let Some((status, start)) = STATUS_WORDS
            .iter()
            .find_map(|word| tokens.iter().find(|(_, tok)| tok == word).map(|(at, _)| (*word, *at)))
        else {
            continue;
        };
        let id = if tokens.first().is_some_and(|(first, _)| *first == start) {
            let rest = &line[start + status.len()..];
            rest.split(" - ").next().unwrap_or_default().trim()
        } else {
            line[..start].trim()
        };
        if id.is_empty() {
            continue;
        }
        let bucket = match status {
            "PASSED" => &mut passed,
            "FAILED" => &mut failed,
            _ => &mut skipped,
        };
        bucket.push(TestId::new(id));
    }
    (passed, failed, skipped)
}

/// Whitespace-separated tokens with their byte offsets.
fn token_spans(line: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, &line[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, &line[s..]));
    }
    spans
}

/// Spawns a command and captures stdout and stderr separately.
/// Both streams are drained concurrently while waiting for the process to exit.
///
/// 派生一个命令并分别捕获 stdout 和 stderr。在等待进程退出的同时并发读取两个流。
pub async fn spawn_and_capture(
    mut cmd: tokio::process::Command,
) -> (std::io::Result<ExitStatus>, String, String) {
    let mut child = match cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return (Err(e), String::new(), String::new()),
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout, stderr, status) = tokio::join!(read_all(stdout), read_all(stderr), child.wait());
    (status, stdout, stderr)
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        warn!(error = %e, "failed to read child output");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Runs each batch as one child process built from the run command template.
/// 将每个批次作为一个由运行命令模板构建的子进程运行。
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    template: String,
    working_dir: PathBuf,
}

impl CommandExecutor {
    pub fn new(template: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            working_dir: working_dir.into(),
        }
    }
}

impl BatchExecutor for CommandExecutor {
    async fn execute(&self, batch: &Batch) -> BatchOutcome {
        let ids: Vec<String> = batch.tests.iter().map(|t| t.to_string()).collect();
        let args = match expand_template(&self.template, TESTS_PLACEHOLDER, &ids) {
            Ok(args) => args,
            Err(e) => return BatchOutcome::Errored(e.to_string()),
        };

        let mut cmd = tokio::process::Command::new(&args[0]);
        cmd.args(&args[1..]).current_dir(&self.working_dir);
        debug!(batch = batch.index, program = %args[0], tests = ids.len(), "spawning runner");

        let (status, stdout, stderr) = spawn_and_capture(cmd).await;
        match status {
            Ok(status) => {
                let (passed, failed, skipped) = parse_runner_output(&stdout);
                if !status.success() && failed.is_empty() {
                    debug!(batch = batch.index, code = ?status.code(), "runner exited non-zero without reported failures");
                }
                BatchOutcome::Completed(RunnerReport {
                    passed,
                    failed,
                    skipped,
                    exit_code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Err(e) => BatchOutcome::Errored(format!("failed to run `{}`: {e}", args[0])),
        }
    }
}

/// Collects test ids by running the collect command template for a directory.
#[derive(Debug, Clone)]
pub struct CommandCollector {
    template: String,
    working_dir: PathBuf,
}

impl CommandCollector {
    pub fn new(template: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            working_dir: working_dir.into(),
        }
    }
}

impl TestCollector for CommandCollector {
    fn collect(&self, directory: &Path) -> anyhow::Result<Vec<TestId>> {
        let target = directory.to_string_lossy().to_string();
        let args = expand_template(&self.template, TARGET_PLACEHOLDER, &[target])?;
        let output = std::process::Command::new(&args[0])
            .args(&args[1..])
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            debug!(code = ?output.status.code(), "collect command exited non-zero");
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_collect_output(&stdout))
    }
}

/// One test id per line; blank lines, `=` banners and non-test lines are dropped.
pub fn parse_collect_output(stdout: &str) -> Vec<TestId> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('='))
        .filter(|line| looks_like_test_id(line))
        .map(TestId::from)
        .collect()
}

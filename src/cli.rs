//! # CLI Module / 命令行模块
//!
//! Builds the command-line interface with clap's builder API, localizes help text and
//! dispatches to the subcommands in [`commands`].
//!
//! 使用 clap 的构建器 API 构建命令行接口，本地化帮助文本，并分派到 [`commands`] 中的子命令。

pub mod commands;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::core::config::CostMode;
use crate::core::inventory::CollectFilters;
use crate::core::models::{SpeedFilter, TestCategory};
use crate::infra::logging::{LogLevel, init_logging};
use crate::infra::t;
use commands::GlobalOptions;

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` argument.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    let pos = args.iter().position(|arg| arg == "--lang")?;
    args.get(pos + 1).cloned()
}

fn category_arg(locale: &str) -> Arg {
    Arg::new("categories")
        .help(t!("arg_categories", locale = locale).to_string())
        .value_name("CATEGORY")
        .value_parser(["all", "unit", "integration", "behavior", "performance", "property"])
        .num_args(0..)
        .action(ArgAction::Append)
}

/// Arguments shared by `run` and `collect`.
fn filter_args(command: Command, locale: &str) -> Command {
    command
        .arg(category_arg(locale))
        .arg(
            Arg::new("speed")
                .long("speed")
                .help(t!("arg_speed", locale = locale).to_string())
                .value_name("SPEED")
                .value_parser(clap::value_parser!(SpeedFilter))
                .default_value("all")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("pattern")
                .short('k')
                .long("pattern")
                .help(t!("arg_pattern", locale = locale).to_string())
                .value_name("PATTERN")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("module")
                .short('m')
                .long("module")
                .help(t!("arg_module", locale = locale).to_string())
                .value_name("MODULE")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("exclude-pattern")
                .long("exclude-pattern")
                .help(t!("arg_exclude_pattern", locale = locale).to_string())
                .value_name("PATTERN")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("exclude-module")
                .long("exclude-module")
                .help(t!("arg_exclude_module", locale = locale).to_string())
                .value_name("MODULE")
                .action(ArgAction::Append),
        )
        .arg(no_cache_arg(locale))
}

fn no_cache_arg(locale: &str) -> Arg {
    Arg::new("no-cache")
        .long("no-cache")
        .help(t!("arg_no_cache", locale = locale).to_string())
        .action(ArgAction::SetTrue)
}

fn report_arg(locale: &str) -> Arg {
    Arg::new("report")
        .short('o')
        .long("report")
        .help(t!("arg_report", locale = locale).to_string())
        .value_name("PATH")
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

pub fn build_cli(locale: &str) -> Command {
    Command::new("risk-runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli_about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help(t!("arg_config", locale = locale).to_string())
                .value_name("CONFIG")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("project-dir")
                .long("project-dir")
                .help(t!("arg_project_dir", locale = locale).to_string())
                .value_name("PROJECT_DIR")
                .default_value(".")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help(t!("arg_log_level", locale = locale).to_string())
                .value_name("LEVEL")
                .value_parser(clap::value_parser!(LogLevel))
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help(t!("arg_verbose", locale = locale).to_string())
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            filter_args(Command::new("run"), locale)
                .about(t!("cmd_run_about", locale = locale).to_string())
                .arg(
                    Arg::new("workers")
                        .short('j')
                        .long("workers")
                        .help(t!("arg_workers", locale = locale).to_string())
                        .value_name("WORKERS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help(t!("arg_timeout", locale = locale).to_string())
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("max-retries")
                        .long("max-retries")
                        .help(t!("arg_max_retries", locale = locale).to_string())
                        .value_name("RETRIES")
                        .value_parser(clap::value_parser!(u32))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("batch-size")
                        .long("batch-size")
                        .help(t!("arg_batch_size", locale = locale).to_string())
                        .value_name("SIZE")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("fail-fast")
                        .short('x')
                        .long("fail-fast")
                        .help(t!("arg_fail_fast", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .help(t!("arg_mode", locale = locale).to_string())
                        .value_name("MODE")
                        .value_parser(["basic", "enhanced"])
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("min-risk")
                        .long("min-risk")
                        .help(t!("arg_min_risk", locale = locale).to_string())
                        .value_name("RISK")
                        .value_parser(clap::value_parser!(f64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .help(t!("arg_limit", locale = locale).to_string())
                        .value_name("COUNT")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("run-id")
                        .long("run-id")
                        .help(t!("arg_run_id", locale = locale).to_string())
                        .value_name("ID")
                        .action(ArgAction::Set),
                )
                .arg(report_arg(locale)),
        )
        .subcommand(
            filter_args(Command::new("collect"), locale)
                .about(t!("cmd_collect_about", locale = locale).to_string())
                .arg(
                    Arg::new("list")
                        .short('l')
                        .long("list")
                        .help(t!("arg_list", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("risk")
                .about(t!("cmd_risk_about", locale = locale).to_string())
                .arg(
                    Arg::new("threshold")
                        .long("threshold")
                        .help(t!("arg_risk_threshold", locale = locale).to_string())
                        .value_name("THRESHOLD")
                        .value_parser(clap::value_parser!(f64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("max-tests")
                        .long("max-tests")
                        .help(t!("arg_max_tests", locale = locale).to_string())
                        .value_name("COUNT")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("complexity")
                        .long("complexity")
                        .help(t!("arg_use_complexity", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("churn")
                        .long("churn")
                        .help(t!("arg_use_churn", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("dependencies")
                        .long("dependencies")
                        .help(t!("arg_use_dependencies", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(no_cache_arg(locale))
                .arg(report_arg(locale)),
        )
        .subcommand(
            Command::new("history")
                .about(t!("cmd_history_about", locale = locale).to_string())
                .arg(
                    Arg::new("threshold")
                        .long("threshold")
                        .help(t!("arg_failure_threshold", locale = locale).to_string())
                        .value_name("RATE")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("0.1")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("min-runs")
                        .long("min-runs")
                        .help(t!("arg_min_runs", locale = locale).to_string())
                        .value_name("RUNS")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("3")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("cache")
                .about(t!("cmd_cache_about", locale = locale).to_string())
                .subcommand_required(true)
                .subcommand(
                    Command::new("clear")
                        .about(t!("cmd_cache_clear_about", locale = locale).to_string())
                        .arg(
                            Arg::new("selective")
                                .long("selective")
                                .help(t!("arg_selective", locale = locale).to_string())
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    Command::new("invalidate")
                        .about(t!("cmd_cache_invalidate_about", locale = locale).to_string())
                        .arg(
                            Arg::new("files")
                                .help(t!("arg_files", locale = locale).to_string())
                                .value_name("FILES")
                                .value_parser(clap::value_parser!(PathBuf))
                                .num_args(1..)
                                .required(true)
                                .action(ArgAction::Append),
                        ),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .help(t!("arg_force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Selected categories; none or `all` selects every category.
fn categories(matches: &ArgMatches) -> Vec<TestCategory> {
    let names = strings(matches, "categories");
    if names.is_empty() || names.iter().any(|n| n == "all") {
        return TestCategory::ALL.to_vec();
    }
    let mut selected = Vec::new();
    for category in names.iter().filter_map(|n| n.parse::<TestCategory>().ok()) {
        if !selected.contains(&category) {
            selected.push(category);
        }
    }
    selected
}

fn filters(matches: &ArgMatches) -> CollectFilters {
    CollectFilters {
        speed: matches.get_one::<SpeedFilter>("speed").copied().unwrap_or_default(),
        patterns: strings(matches, "pattern"),
        modules: strings(matches, "module"),
        exclude_patterns: strings(matches, "exclude-pattern"),
        exclude_modules: strings(matches, "exclude-module"),
    }
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let requested = pre_parse_language();
    let detected = crate::resolve_locale(
        &requested
            .clone()
            .or_else(sys_locale::get_locale)
            .unwrap_or_else(|| "en".to_string()),
    );
    rust_i18n::set_locale(&detected);

    let matches = build_cli(&detected).get_matches();

    let level = if matches.get_flag("verbose") {
        Some(LogLevel::Debug)
    } else {
        matches.get_one::<LogLevel>("log-level").copied()
    };
    init_logging(level);

    let global = GlobalOptions {
        config: matches.get_one::<PathBuf>("config").cloned(),
        project_dir: matches
            .get_one::<PathBuf>("project-dir")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(".")),
        lang: requested.map(|lang| crate::resolve_locale(&lang)),
        detected_locale: detected,
    };

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let options = commands::run::RunOptions {
                categories: categories(run_matches),
                filters: filters(run_matches),
                workers: run_matches.get_one::<usize>("workers").copied(),
                timeout_secs: run_matches.get_one::<u64>("timeout").copied(),
                max_retries: run_matches.get_one::<u32>("max-retries").copied(),
                batch_size: run_matches.get_one::<usize>("batch-size").copied(),
                fail_fast: run_matches.get_flag("fail-fast"),
                mode: run_matches
                    .get_one::<String>("mode")
                    .map(|mode| if mode == "basic" { CostMode::Basic } else { CostMode::Enhanced }),
                no_cache: run_matches.get_flag("no-cache"),
                min_risk: run_matches.get_one::<f64>("min-risk").copied(),
                limit: run_matches.get_one::<usize>("limit").copied(),
                run_id: run_matches.get_one::<String>("run-id").cloned(),
                report: run_matches.get_one::<PathBuf>("report").cloned(),
            };
            commands::run::execute(&global, options).await?;
        }
        Some(("collect", collect_matches)) => {
            commands::collect::execute(
                &global,
                &categories(collect_matches),
                &filters(collect_matches),
                collect_matches.get_flag("list"),
                collect_matches.get_flag("no-cache"),
            )?;
        }
        Some(("risk", risk_matches)) => {
            let options = commands::risk::RiskOptions {
                threshold: risk_matches.get_one::<f64>("threshold").copied(),
                max_tests: risk_matches.get_one::<usize>("max-tests").copied(),
                use_complexity: risk_matches.get_flag("complexity"),
                use_churn: risk_matches.get_flag("churn"),
                use_dependencies: risk_matches.get_flag("dependencies"),
                no_cache: risk_matches.get_flag("no-cache"),
                report: risk_matches.get_one::<PathBuf>("report").cloned(),
            };
            commands::risk::execute(&global, options)?;
        }
        Some(("history", history_matches)) => {
            let threshold = history_matches.get_one::<f64>("threshold").copied().unwrap_or(0.1);
            let min_runs = history_matches.get_one::<u64>("min-runs").copied().unwrap_or(3);
            commands::history::execute(&global, threshold, min_runs)?;
        }
        Some(("cache", cache_matches)) => match cache_matches.subcommand() {
            Some(("clear", clear_matches)) => {
                commands::cache::clear(&global, clear_matches.get_flag("selective"))?;
            }
            Some(("invalidate", invalidate_matches)) => {
                let files: Vec<PathBuf> = invalidate_matches
                    .get_many::<PathBuf>("files")
                    .map(|files| files.cloned().collect())
                    .unwrap_or_default();
                commands::cache::invalidate(&global, &files)?;
            }
            _ => {}
        },
        Some(("init", init_matches)) => {
            commands::init::execute(
                &global,
                init_matches.get_flag("non-interactive"),
                init_matches.get_flag("force"),
            )?;
        }
        _ => {
            // Clap has already printed help for a missing subcommand.
        }
    }
    Ok(())
}

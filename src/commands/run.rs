//! # run 命令实现
//!
//! 在本地以固定数量的工作进程对每个样本目录运行求解器。
//!
//! ## 功能
//! - 发现 `frame_<n>/atom_<m>/feff.inp`
//! - 已有完整结果的样本默认跳过（中断后重跑只补做剩余样本）
//! - 单样本失败或超时只记入汇总，不影响其他样本
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的参数
//! - 使用 `batch/`, `utils/output.rs`

use crate::batch::layout::{discover_samples, DECK_FILE};
use crate::batch::{solve_samples, BatchResult, BatchRunner, LocalSolver};
use crate::cli::run::RunArgs;
use crate::config::Config;
use crate::error::{MdExafsError, Result};
use crate::utils::output;

use std::path::PathBuf;

/// 汇总中列出的失败样本数
const MAX_PRINTED_FAILURES: usize = 20;

/// 未配置求解器时的缺省可执行文件
pub const DEFAULT_SOLVER: &str = "feff8l";

/// 合并命令行与配置文件后的运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub base_dir: PathBuf,
    pub workers: usize,
    pub solver: PathBuf,
    pub solver_args: Vec<String>,
    pub timeout: Option<u64>,
    pub overwrite: bool,
}

/// 命令行优先，其次 `[solver]` / `[extraction]`，最后内置缺省值
pub fn resolve_settings(args: &RunArgs) -> Result<RunSettings> {
    let config = args.config.as_deref().map(Config::load).transpose()?;
    let solver_config = config.as_ref().map(Config::solver).unwrap_or_default();

    let base_dir = match &args.base_dir {
        Some(dir) => dir.clone(),
        None => config
            .as_ref()
            .and_then(|c| c.extraction.as_ref())
            .map(|e| e.output_directory.clone())
            .ok_or_else(|| {
                MdExafsError::InvalidArgument(
                    "--base-dir is required without an [extraction] section in --config"
                        .to_string(),
                )
            })?,
    };

    let workers = args.workers.or(solver_config.workers).ok_or_else(|| {
        MdExafsError::InvalidArgument(
            "--workers is required without [solver] workers in --config".to_string(),
        )
    })?;
    if workers == 0 {
        return Err(MdExafsError::InvalidArgument(
            "--workers must be at least 1".to_string(),
        ));
    }

    let solver = args
        .solver
        .clone()
        .or(solver_config.executable)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOLVER));
    let solver_args = if args.solver_args.is_empty() {
        solver_config.args
    } else {
        args.solver_args.clone()
    };

    Ok(RunSettings {
        base_dir,
        workers,
        solver,
        solver_args,
        timeout: args.timeout.or(solver_config.timeout_seconds),
        overwrite: args.overwrite,
    })
}

/// 执行 run 命令
pub fn execute(args: RunArgs) -> Result<()> {
    output::print_header("Scattering Solver Runs");

    let settings = resolve_settings(&args)?;

    let samples = discover_samples(&settings.base_dir, None, &[DECK_FILE])?;
    if samples.is_empty() {
        return Err(MdExafsError::NoInputFiles {
            path: settings.base_dir.display().to_string(),
        });
    }

    output::print_field("base directory", settings.base_dir.display());
    output::print_field("samples", samples.len());
    let runner = BatchRunner::new(settings.workers);
    output::print_field("workers", runner.workers());
    output::print_field("solver", settings.solver.display());
    output::print_field(
        "timeout",
        settings
            .timeout
            .map(|s| format!("{} s", s))
            .unwrap_or_else(|| "none".to_string()),
    );
    println!();

    let solver = LocalSolver::new(&settings.solver)
        .with_args(&settings.solver_args)
        .with_timeout(settings.timeout);
    let result = solve_samples(&runner, samples, &solver, settings.overwrite)?;

    print_summary(&result);

    if result.all_failed() {
        return Err(MdExafsError::Other(format!(
            "All {} samples failed",
            result.total()
        )));
    }
    Ok(())
}

fn print_summary(result: &BatchResult) {
    output::print_separator();
    output::print_field("succeeded", result.success);
    output::print_field("already complete", result.skipped);
    output::print_field("failed", result.failed);
    if result.skipped > 0 {
        output::print_skip(&format!(
            "{} samples already had results (use --overwrite to recompute)",
            result.skipped
        ));
    }

    if !result.failures.is_empty() {
        println!();
        for (id, reason) in result.failures.iter().take(MAX_PRINTED_FAILURES) {
            let first = reason.lines().next().unwrap_or_default();
            output::print_error(&format!("{}: {}", id, first));
        }
        if result.failures.len() > MAX_PRINTED_FAILURES {
            output::print_info(&format!(
                "... and {} more",
                result.failures.len() - MAX_PRINTED_FAILURES
            ));
        }
    }

    if result.failed == 0 {
        output::print_done(&format!("{} samples processed", result.total()));
    } else {
        output::print_warning(&format!(
            "{} of {} samples failed; re-run to retry them",
            result.failed,
            result.total()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CONFIG: &str = r#"
[extraction]
absorber = "U"
frame_range = [0, 10]
cutoff = 5.0
output_directory = "decks"

[solver]
executable = "feff85"
timeout_seconds = 900
workers = 6
args = ["-q"]
"#;

    fn write_config(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("run.toml");
        fs::write(&path, CONFIG).unwrap();
        path
    }

    #[test]
    fn test_config_supplies_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let args = RunArgs {
            config: Some(write_config(tmp.path())),
            ..RunArgs::default()
        };
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.base_dir, tmp.path().join("decks"));
        assert_eq!(settings.workers, 6);
        assert_eq!(settings.solver, PathBuf::from("feff85"));
        assert_eq!(settings.solver_args, vec!["-q".to_string()]);
        assert_eq!(settings.timeout, Some(900));
    }

    #[test]
    fn test_flags_override_config() {
        let tmp = tempfile::tempdir().unwrap();
        let args = RunArgs {
            config: Some(write_config(tmp.path())),
            base_dir: Some(PathBuf::from("elsewhere")),
            workers: Some(2),
            solver: Some(PathBuf::from("feff8l")),
            solver_args: vec!["--verbose".to_string()],
            timeout: Some(30),
            overwrite: true,
        };
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.base_dir, PathBuf::from("elsewhere"));
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.solver, PathBuf::from("feff8l"));
        assert_eq!(settings.solver_args, vec!["--verbose".to_string()]);
        assert_eq!(settings.timeout, Some(30));
        assert!(settings.overwrite);
    }

    #[test]
    fn test_flags_only() {
        let args = RunArgs {
            base_dir: Some(PathBuf::from("samples")),
            workers: Some(4),
            ..RunArgs::default()
        };
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.solver, PathBuf::from(DEFAULT_SOLVER));
        assert!(settings.solver_args.is_empty());
        assert_eq!(settings.timeout, None);
    }

    #[test]
    fn test_missing_or_zero_workers() {
        let mut args = RunArgs {
            base_dir: Some(PathBuf::from("samples")),
            ..RunArgs::default()
        };
        assert!(matches!(
            resolve_settings(&args),
            Err(MdExafsError::InvalidArgument(_))
        ));

        args.workers = Some(0);
        assert!(matches!(
            resolve_settings(&args),
            Err(MdExafsError::InvalidArgument(_))
        ));

        args.base_dir = None;
        args.workers = Some(1);
        assert!(resolve_settings(&args).is_err());
    }
}

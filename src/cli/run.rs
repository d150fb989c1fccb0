//! # run 子命令 CLI 定义
//!
//! 未给出的选项依次取 `--config` 的 `[solver]` 段与内置缺省值。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Configuration file ([solver] defaults, [extraction] output directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Root of the frame_<n>/atom_<m> sample tree
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Number of concurrent solver processes
    #[arg(long)]
    pub workers: Option<usize>,

    /// Solver executable, run inside each sample directory [default: feff8l]
    #[arg(long, env = "MD_EXAFS_SOLVER")]
    pub solver: Option<PathBuf>,

    /// Extra argument passed to the solver (repeatable)
    #[arg(long = "solver-arg", allow_hyphen_values = true)]
    pub solver_args: Vec<String>,

    /// Per-sample wall-clock limit in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Re-run samples that already have results
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}

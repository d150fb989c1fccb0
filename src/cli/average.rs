//! # average 子命令 CLI 定义
//!
//! 两种输入方式：`--config` 读取 [averaging] 节，或直接给出
//! `--input-dir/--start/--end/--output`。命令行给出的选项覆盖配置文件。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/average.rs`

use crate::averaging::filter::AveragingMode;
use clap::Args;
use std::path::PathBuf;

/// average 子命令参数
#[derive(Args, Debug)]
pub struct AverageArgs {
    /// TOML configuration file with an [averaging] section
    #[arg(short, long, conflicts_with_all = ["input_dir", "start", "end"])]
    pub config: Option<PathBuf>,

    /// Root of the frame_<n>/atom_<m> result tree
    #[arg(long, required_unless_present = "config")]
    pub input_dir: Option<PathBuf>,

    /// First frame (inclusive)
    #[arg(long, required_unless_present = "config")]
    pub start: Option<usize>,

    /// Last frame (exclusive)
    #[arg(long, required_unless_present = "config")]
    pub end: Option<usize>,

    /// Frame stride
    #[arg(long)]
    pub step: Option<usize>,

    /// Output chi(k) file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Comma-separated path labels, e.g. 'U-O,U-O-O' (omit for total chi.dat averaging)
    #[arg(long)]
    pub paths: Option<String>,

    /// Maximum effective distance: one value for all labels or one per label ('2.5,4.0')
    #[arg(long)]
    pub max_distance: Option<String>,

    /// Minimum effective distance: one value for all labels or one per label
    #[arg(long)]
    pub min_distance: Option<String>,

    /// Keep only paths with this number of legs
    #[arg(long)]
    pub nleg: Option<usize>,

    /// Parallel workers for parsing (0 = all CPUs)
    #[arg(long)]
    pub num_processes: Option<usize>,

    /// How selected paths are combined
    #[arg(long, value_enum)]
    pub mode: Option<AveragingMode>,

    /// Build (or reuse) the path database before averaging
    #[arg(long, default_value_t = false)]
    pub build_database: bool,

    /// Path database file
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Average from the path database instead of raw outputs
    #[arg(long, default_value_t = false)]
    pub use_database: bool,

    /// Discard an existing database and rebuild it
    #[arg(long, default_value_t = false)]
    pub rebuild: bool,

    /// Plot k^w * chi(k) to this file (.png or .svg)
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// k-weight for the plot
    #[arg(long, default_value_t = 2)]
    pub kweight: i32,
}

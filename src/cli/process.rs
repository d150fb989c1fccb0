//! # process 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/process.rs`

use clap::Args;
use std::path::PathBuf;

/// process 子命令参数
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// TOML configuration file ([trajectory], [extraction], optional [lattice], [solver])
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override extraction.output_directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

//! # rdf 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/rdf.rs`

use clap::Args;
use std::path::PathBuf;

/// rdf 子命令参数
#[derive(Args, Debug)]
pub struct RdfArgs {
    /// TOML configuration file ([trajectory], [rdf], optional [lattice])
    #[arg(short, long)]
    pub config: PathBuf,

    /// Plot g(r) to this file (.png or .svg)
    #[arg(long)]
    pub plot: Option<PathBuf>,
}

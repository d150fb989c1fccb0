//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `process`: 轨迹 → FEFF 输入目录树
//! - `run`: 本地并行运行求解器
//! - `average`: 多路径 χ(k) 平均（可选路径数据库）
//! - `rdf`: 径向分布函数与第一壳层分析
//! - `inspect-db`: 查看路径数据库内容
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: process, run, average, rdf, inspect

pub mod average;
pub mod inspect;
pub mod process;
pub mod rdf;
pub mod run;

use clap::{Parser, Subcommand};

/// md-exafs - 由分子动力学轨迹计算平均 EXAFS χ(k)
#[derive(Parser)]
#[command(name = "md-exafs")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Averaged EXAFS chi(k) spectra from molecular-dynamics trajectories", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Extract absorber neighborhoods from a trajectory and write FEFF input decks
    Process(process::ProcessArgs),

    /// Run the scattering solver on every sample directory with a local worker pool
    Run(run::RunArgs),

    /// Average per-path or total chi(k) over frames and absorbers
    Average(average::AverageArgs),

    /// Radial distribution function and first-shell analysis
    Rdf(rdf::RdfArgs),

    /// Show the contents of a path database
    InspectDb(inspect::InspectArgs),
}

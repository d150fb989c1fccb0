//! # md-exafs - 由分子动力学轨迹计算平均 EXAFS χ(k)
//!
//! 从 MD 轨迹中为采样的吸收原子提取周期性近邻壳层，生成散射路径求解器
//! (FEFF) 输入；求解器运行后，跨帧、跨原子、跨路径类型收集 χ(k)，
//! 按路径标签与有效距离筛选并求平均。可选的路径数据库让重复的筛选平均
//! 不必重新解析原始输出。
//!
//! ## 子命令
//! - `process`    - 轨迹 → FEFF 输入目录树
//! - `run`        - 本地并行运行求解器
//! - `average`    - 多路径 χ(k) 平均
//! - `rdf`        - 径向分布函数与第一壳层分析
//! - `inspect-db` - 查看路径数据库
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── parsers/    (LAMMPS 轨迹、FEFF 输入输出)
//!   │     ├── geometry/   (周期边界、近邻提取)
//!   │     ├── batch/      (样本目录、求解器调度)
//!   │     ├── database/   (路径数据库)
//!   │     ├── averaging/  (筛选与平均)
//!   │     ├── rdf/        (径向分布函数)
//!   │     └── models/     (数据模型)
//!   ├── config.rs   (TOML 配置)
//!   ├── utils/      (输出、进度条、绘图)
//!   └── error.rs    (错误处理)
//! ```

mod averaging;
mod batch;
mod cli;
mod commands;
mod config;
mod database;
mod error;
mod geometry;
mod models;
mod parsers;
mod rdf;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}

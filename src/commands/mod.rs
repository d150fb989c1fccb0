//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `config.rs` 与各领域模块
//! - 子模块: process, run, average, rdf, inspect

pub mod average;
pub mod inspect;
pub mod process;
pub mod rdf;
pub mod run;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Process(args) => process::execute(args),
        Commands::Run(args) => run::execute(args),
        Commands::Average(args) => average::execute(args),
        Commands::Rdf(args) => rdf::execute(args),
        Commands::InspectDb(args) => inspect::execute(args),
    }
}

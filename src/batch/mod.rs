//! # 批量处理模块
//!
//! 样本目录布局与求解器批量执行。
//!
//! ## 功能
//! - `frame_<f>/atom_<a>` 样本目录的生成与发现
//! - 共享队列 + 固定工作线程的求解器调度
//! - 进度反馈与统计
//!
//! ## 依赖关系
//! - 被 `commands/`, `averaging/`, `database/` 使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod layout;
pub mod queue;
pub mod runner;
pub mod solver;

pub use runner::{solve_samples, BatchResult, BatchRunner};
pub use solver::LocalSolver;

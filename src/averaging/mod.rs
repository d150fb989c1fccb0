//! # χ(k) 平均模块
//!
//! 多路径筛选、加权累加与结果导出。
//!
//! ## 依赖关系
//! - 被 `commands/average.rs`, `config.rs` 使用
//! - 子模块: filter, accumulator, engine, export

pub mod accumulator;
pub mod engine;
pub mod export;
pub mod filter;

pub use engine::{average, AveragingReport, AveragingRequest, PathSource};
pub use filter::{AveragingMode, DistanceBound, PathFilter, PathSelection};

//! # 径向分布函数与峰分析
//!
//! 用于在跑求解器之前检查截断半径与第一壳层结构。
//!
//! ## 子模块
//! - `histogram`: 距离直方图与 g(r) 归一化、直接壳层分析
//! - `peak`: 高斯峰拟合
//! - `export`: CSV 与报告
//!
//! ## 依赖关系
//! - 被 `commands/rdf.rs` 使用
//! - 使用 `geometry/`

pub mod export;
pub mod histogram;
pub mod peak;

pub use histogram::RdfAccumulator;
pub use peak::fit_gaussian;

//! # 几何模块
//!
//! 周期边界条件下的最小镜像位移与近邻提取。
//!
//! ## 子模块
//! - `pbc`: 模拟盒子、最小镜像、静态/动态晶格模式
//! - `neighbors`: 近邻壳层提取（直接遍历或 cell list）
//!
//! ## 依赖关系
//! - 被 `commands/process.rs`, `rdf/` 使用
//! - 使用 `models/`

pub mod neighbors;
pub mod pbc;

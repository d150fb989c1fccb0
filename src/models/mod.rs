//! # 数据模型模块
//!
//! 定义晶格、轨迹帧、元素表和散射路径的统一数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `geometry/`, `database/`, `averaging/` 和 `commands/` 使用
//! - 子模块: structure, frame, elements, path

pub mod elements;
pub mod frame;
pub mod path;
pub mod structure;

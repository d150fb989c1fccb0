//! # 工具函数模块
//!
//! 终端输出、进度条与绘图。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/`, `database/`, `averaging/` 使用
//! - 子模块: output, progress, plot

pub mod output;
pub mod plot;
pub mod progress;

//! # 路径数据库
//!
//! 把全部样本的散射路径一次性写入单个索引文件，之后按标签、帧范围与
//! 距离筛选时无需重新解析原始输出。
//!
//! ## 依赖关系
//! - 被 `commands/average.rs`, `commands/inspect.rs`, `averaging/engine.rs` 使用
//! - 子模块: format, builder, query

pub mod builder;
pub mod format;
pub mod query;

pub use builder::{build_database, BuildOutcome};
pub use query::PathDatabase;

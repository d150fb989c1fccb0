//! # 解析器模块
//!
//! 读取 MD 轨迹、生成 FEFF 输入、解析 FEFF 输出。
//!
//! ## 依赖关系
//! - 被 `commands/`, `averaging/`, `database/` 使用
//! - 使用 `models/` 数据模型
//! - 子模块: lammps_dump, feff_inp, feff_out

pub mod feff_inp;
pub mod feff_out;
pub mod lammps_dump;

use crate::config::{TrajectoryConfig, TrajectoryFormat};
use crate::error::Result;
use crate::models::frame::Trajectory;
use std::collections::BTreeMap;

/// 按配置打开轨迹
pub fn open_trajectory(
    config: &TrajectoryConfig,
    atom_types: &BTreeMap<String, String>,
) -> Result<Box<dyn Trajectory + Sync>> {
    match config.format {
        TrajectoryFormat::LammpsDump => {
            Ok(Box::new(lammps_dump::LammpsDump::open(&config.path, atom_types)?))
        }
    }
}

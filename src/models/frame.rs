//! # 轨迹帧数据模型
//!
//! 定义单帧原子坐标及轨迹读取接口。核心模块只借用帧数据，不修改。
//!
//! ## 依赖关系
//! - 被 `parsers/lammps_dump.rs`, `geometry/`, `commands/process.rs`, `rdf/` 使用
//! - 使用 `geometry/pbc.rs`, `config.rs` (FrameRange)

use crate::config::FrameRange;
use crate::error::{MdExafsError, Result};
use crate::geometry::pbc::LatticeBox;

/// 单帧
#[derive(Debug, Clone)]
pub struct Frame {
    /// 帧号：MD 时间步；文件未提供时为在轨迹中的位置
    pub index: usize,

    /// MD 时间步（若文件提供）
    pub timestep: Option<u64>,

    /// 笛卡尔坐标 (Å)
    pub positions: Vec<[f64; 3]>,

    /// 元素符号，与 positions 一一对应
    pub elements: Vec<String>,

    /// 本帧晶胞（动态晶胞模式下使用）
    pub lattice: Option<LatticeBox>,
}

impl Frame {
    pub fn new(index: usize, positions: Vec<[f64; 3]>, elements: Vec<String>) -> Self {
        Frame {
            index,
            timestep: None,
            positions,
            elements,
            lattice: None,
        }
    }

    pub fn with_lattice(mut self, lattice: LatticeBox) -> Self {
        self.lattice = Some(lattice);
        self
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// 某种元素的全部原子序号
    pub fn indices_of(&self, element: &str) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.eq_ignore_ascii_case(element))
            .map(|(i, _)| i)
            .collect()
    }

    /// 带边界检查的坐标访问
    pub fn position(&self, index: usize) -> Result<[f64; 3]> {
        self.positions
            .get(index)
            .copied()
            .ok_or(MdExafsError::AtomIndexOutOfRange {
                frame: self.index,
                index,
                count: self.positions.len(),
            })
    }
}

/// 轨迹读取接口
///
/// `position` 是帧在轨迹中的位置；帧范围按帧号（`frame_id`）选取。
pub trait Trajectory {
    /// 帧总数
    fn frame_count(&self) -> usize;

    /// 第 position 帧的帧号
    fn frame_id(&self, position: usize) -> usize {
        position
    }

    /// 读取第 position 帧
    fn frame(&self, position: usize) -> Result<Frame>;

    /// 帧号落在范围内的全部帧位置，按轨迹顺序
    fn select(&self, range: &FrameRange) -> Vec<usize> {
        (0..self.frame_count())
            .filter(|&position| range.contains(self.frame_id(position)))
            .collect()
    }
}

/// 内存中的轨迹
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrajectory {
    frames: Vec<Frame>,
}

#[cfg(test)]
impl InMemoryTrajectory {
    pub fn new(frames: Vec<Frame>) -> Self {
        InMemoryTrajectory { frames }
    }
}

#[cfg(test)]
impl Trajectory for InMemoryTrajectory {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame_id(&self, position: usize) -> usize {
        self.frames.get(position).map_or(position, |f| f.index)
    }

    fn frame(&self, position: usize) -> Result<Frame> {
        self.frames.get(position).cloned().ok_or_else(|| {
            MdExafsError::InvalidArgument(format!("frame {} out of range", position))
        })
    }
}

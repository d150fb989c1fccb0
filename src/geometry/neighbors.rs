//! # 近邻提取
//!
//! 对给定帧与中心原子，返回截断半径内的全部近邻（最小镜像位移与距离）。
//!
//! ## 算法
//! - 小体系直接遍历所有原子
//! - 大体系先按分数坐标把原子分入边长 ≥ cutoff 的格子（cell list），
//!   查询时只检查中心所在格子及其 26 个相邻格子
//!
//! 每个近邻原子在同一样本中只出现一次，保留最近的周期镜像。即使截断
//! 球内同时包含同一原子的多个镜像，也只计一次；因此截断半径不得超过
//! 最短周期宽度的一半，构造时即校验。
//!
//! ## 依赖关系
//! - 被 `commands/process.rs`, `rdf/` 使用
//! - 使用 `geometry/pbc.rs`, `models/frame.rs`

use crate::error::{MdExafsError, Result};
use crate::geometry::pbc::LatticeBox;
use crate::models::frame::Frame;
use crate::models::structure::norm;

use serde::Deserialize;

/// 低于此原子数时 `Auto` 使用直接遍历
const BRUTE_FORCE_THRESHOLD: usize = 256;

/// 近邻搜索方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NeighborMethod {
    #[default]
    Auto,
    BruteForce,
    CellList,
}

/// 单个近邻
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// 近邻在帧中的原子序号
    pub index: usize,

    pub element: String,

    /// 相对中心原子的最小镜像位移
    pub displacement: [f64; 3],

    pub distance: f64,
}

/// 中心原子的近邻壳层，按 (距离, 序号) 排序
#[derive(Debug, Clone)]
pub struct NeighborShell {
    pub frame: usize,
    pub center: usize,
    pub center_element: String,
    pub cutoff: f64,
    pub neighbors: Vec<Neighbor>,
}

impl NeighborShell {
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// 分数坐标格子
struct CellList {
    dims: [usize; 3],
    /// 每个原子所在格子的三维序号
    atom_cells: Vec<[usize; 3]>,
    /// 扁平化格子 → 原子序号
    cells: Vec<Vec<usize>>,
}

impl CellList {
    fn build(frame: &Frame, lattice_box: &LatticeBox, cutoff: f64) -> Self {
        let widths = lattice_box.lattice().perpendicular_widths();
        let pbc = lattice_box.pbc();

        let mut dims = [1usize; 3];
        for axis in 0..3 {
            dims[axis] = ((widths[axis] / cutoff).floor() as usize).max(1);
        }

        let mut cells = vec![Vec::new(); dims[0] * dims[1] * dims[2]];
        let mut atom_cells = Vec::with_capacity(frame.len());

        for (i, &position) in frame.positions.iter().enumerate() {
            let frac = lattice_box.fractional_position(position);
            let mut cell = [0usize; 3];
            for axis in 0..3 {
                let s = if pbc[axis] {
                    frac[axis] - frac[axis].floor()
                } else {
                    frac[axis]
                };
                // 非周期轴上盒子外的原子夹到边缘格子，相邻关系保持单调
                let bin = (s * dims[axis] as f64).floor();
                cell[axis] = bin.clamp(0.0, (dims[axis] - 1) as f64) as usize;
            }
            cells[Self::flat(dims, cell)].push(i);
            atom_cells.push(cell);
        }

        CellList {
            dims,
            atom_cells,
            cells,
        }
    }

    fn flat(dims: [usize; 3], cell: [usize; 3]) -> usize {
        (cell[0] * dims[1] + cell[1]) * dims[2] + cell[2]
    }

    /// 中心格子及相邻格子中的候选原子（去重）
    fn candidates(&self, center: usize, pbc: [bool; 3]) -> Vec<usize> {
        let home = self.atom_cells[center];

        let mut axis_cells: [Vec<usize>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for axis in 0..3 {
            let n = self.dims[axis] as isize;
            let c = home[axis] as isize;
            let mut list: Vec<usize> = (-1..=1)
                .filter_map(|offset| {
                    let idx = c + offset;
                    if pbc[axis] {
                        Some(idx.rem_euclid(n) as usize)
                    } else if idx >= 0 && idx < n {
                        Some(idx as usize)
                    } else {
                        None
                    }
                })
                .collect();
            list.sort_unstable();
            list.dedup();
            axis_cells[axis] = list;
        }

        let mut out = Vec::new();
        for &i in &axis_cells[0] {
            for &j in &axis_cells[1] {
                for &k in &axis_cells[2] {
                    out.extend_from_slice(&self.cells[Self::flat(self.dims, [i, j, k])]);
                }
            }
        }
        out
    }
}

/// 为一帧准备的近邻查询器
///
/// 一帧只构建一次格子，随后可服务任意多个中心原子。
pub struct FrameNeighbors<'a> {
    frame: &'a Frame,
    lattice_box: &'a LatticeBox,
    cutoff: f64,
    cells: Option<CellList>,
}

impl<'a> FrameNeighbors<'a> {
    /// 校验截断半径并按需要构建格子
    pub fn new(
        frame: &'a Frame,
        lattice_box: &'a LatticeBox,
        cutoff: f64,
        method: NeighborMethod,
    ) -> Result<Self> {
        if !(cutoff > 0.0) {
            return Err(MdExafsError::InvalidConfig(format!(
                "cutoff must be positive, got {}",
                cutoff
            )));
        }
        lattice_box.validate_cutoff(cutoff)?;

        let use_cells = match method {
            NeighborMethod::BruteForce => false,
            NeighborMethod::CellList => true,
            NeighborMethod::Auto => frame.len() >= BRUTE_FORCE_THRESHOLD,
        };

        let cells = if use_cells {
            Some(CellList::build(frame, lattice_box, cutoff))
        } else {
            None
        };

        Ok(FrameNeighbors {
            frame,
            lattice_box,
            cutoff,
            cells,
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// 提取中心原子的近邻壳层
    pub fn shell(&self, center: usize) -> Result<NeighborShell> {
        let origin = self.frame.position(center)?;

        let candidates: Vec<usize> = match &self.cells {
            Some(cells) => cells.candidates(center, self.lattice_box.pbc()),
            None => (0..self.frame.len()).collect(),
        };

        let mut neighbors: Vec<Neighbor> = candidates
            .into_iter()
            .filter(|&j| j != center)
            .filter_map(|j| {
                let displacement = self
                    .lattice_box
                    .displacement(origin, self.frame.positions[j]);
                let distance = norm(displacement);
                (distance <= self.cutoff).then(|| Neighbor {
                    index: j,
                    element: self.frame.elements[j].clone(),
                    displacement,
                    distance,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });

        Ok(NeighborShell {
            frame: self.frame.index,
            center,
            center_element: self.frame.elements[center].clone(),
            cutoff: self.cutoff,
            neighbors,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::structure::Lattice;
    use std::collections::HashSet;

    /// n×n×n 的 fcc 超胞
    pub(crate) fn fcc_frame(a: f64, n: usize, element: &str) -> (Frame, LatticeBox) {
        let basis = [
            [0.0, 0.0, 0.0],
            [0.5, 0.5, 0.0],
            [0.5, 0.0, 0.5],
            [0.0, 0.5, 0.5],
        ];
        let mut positions = Vec::new();
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    for b in &basis {
                        positions.push([
                            (i as f64 + b[0]) * a,
                            (j as f64 + b[1]) * a,
                            (k as f64 + b[2]) * a,
                        ]);
                    }
                }
            }
        }
        let elements = vec![element.to_string(); positions.len()];
        let size = a * n as f64;
        let lattice_box = LatticeBox::new(Lattice::orthorhombic(size, size, size), [true; 3])
            .unwrap();
        (Frame::new(0, positions, elements), lattice_box)
    }

    #[test]
    fn test_fcc_first_shell() {
        let a = 4.078;
        let (frame, lattice_box) = fcc_frame(a, 3, "Au");
        let neighbors =
            FrameNeighbors::new(&frame, &lattice_box, 3.2, NeighborMethod::BruteForce).unwrap();
        let shell = neighbors.shell(0).unwrap();

        assert_eq!(shell.len(), 12);
        for n in &shell.neighbors {
            assert!((n.distance - a / 2f64.sqrt()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_shell_invariants() {
        let (frame, lattice_box) = fcc_frame(4.078, 3, "Au");
        let cutoff = 6.0;
        let neighbors =
            FrameNeighbors::new(&frame, &lattice_box, cutoff, NeighborMethod::CellList).unwrap();

        for center in [0, 17, 63, 107] {
            let shell = neighbors.shell(center).unwrap();
            let mut seen = HashSet::new();
            for n in &shell.neighbors {
                assert!(n.distance <= cutoff);
                assert_ne!(n.index, center);
                assert!(seen.insert(n.index), "atom {} appears twice", n.index);
            }
        }
    }

    #[test]
    fn test_cell_list_matches_brute_force() {
        let (mut frame, lattice_box) = fcc_frame(4.078, 4, "Au");
        // 打乱位置，避免完美晶格的对称巧合
        for (i, p) in frame.positions.iter_mut().enumerate() {
            let jitter = ((i * 7919) % 97) as f64 / 97.0 - 0.5;
            p[0] += 0.3 * jitter;
            p[1] -= 0.2 * jitter;
            p[2] += 0.1 * jitter;
        }
        let cutoff = 5.5;
        let brute =
            FrameNeighbors::new(&frame, &lattice_box, cutoff, NeighborMethod::BruteForce).unwrap();
        let cells =
            FrameNeighbors::new(&frame, &lattice_box, cutoff, NeighborMethod::CellList).unwrap();

        for center in [0, 5, 100, 255] {
            let a: Vec<usize> = brute.shell(center).unwrap().neighbors.iter().map(|n| n.index).collect();
            let b: Vec<usize> = cells.shell(center).unwrap().neighbors.iter().map(|n| n.index).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_cell_list_matches_brute_force_triclinic() {
        let lattice = Lattice::from_parameters(20.0, 22.0, 24.0, 80.0, 95.0, 105.0);
        let lattice_box = LatticeBox::new(lattice, [true; 3]).unwrap();

        // 线性同余序列生成的分数坐标，部分落在盒子外
        let mut state: u64 = 12345;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64 * 1.4 - 0.2
        };
        let positions: Vec<[f64; 3]> = (0..600)
            .map(|_| lattice_box.frac_to_cart([next(), next(), next()]))
            .collect();
        let elements = vec!["O".to_string(); positions.len()];
        let frame = Frame::new(0, positions, elements);

        let cutoff = 5.0;
        let brute =
            FrameNeighbors::new(&frame, &lattice_box, cutoff, NeighborMethod::BruteForce).unwrap();
        let cells =
            FrameNeighbors::new(&frame, &lattice_box, cutoff, NeighborMethod::CellList).unwrap();

        for center in (0..600).step_by(37) {
            let a = brute.shell(center).unwrap();
            let b = cells.shell(center).unwrap();
            let ia: Vec<usize> = a.neighbors.iter().map(|n| n.index).collect();
            let ib: Vec<usize> = b.neighbors.iter().map(|n| n.index).collect();
            assert_eq!(ia, ib, "center {}", center);
            for (x, y) in a.neighbors.iter().zip(&b.neighbors) {
                assert!((x.distance - y.distance).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_cutoff_beyond_half_box_is_rejected() {
        let (frame, lattice_box) = fcc_frame(4.078, 2, "Au");
        let err = FrameNeighbors::new(&frame, &lattice_box, 4.5, NeighborMethod::Auto)
            .err()
            .unwrap();
        assert!(matches!(err, MdExafsError::CutoffTooLarge { .. }));
    }

    #[test]
    fn test_non_periodic_cluster() {
        let positions = vec![[0.0, 0.0, 0.0], [1.5, 0.0, 0.0], [0.0, 2.5, 0.0], [9.0, 0.0, 0.0]];
        let elements = vec!["U".into(), "O".into(), "O".into(), "O".into()];
        let frame = Frame::new(0, positions, elements);
        let lattice_box =
            LatticeBox::new(Lattice::orthorhombic(10.0, 10.0, 10.0), [false; 3]).unwrap();
        let neighbors =
            FrameNeighbors::new(&frame, &lattice_box, 3.0, NeighborMethod::CellList).unwrap();
        let shell = neighbors.shell(0).unwrap();

        let indices: Vec<usize> = shell.neighbors.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(shell.center_element, "U");
    }
}

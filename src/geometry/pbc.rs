//! # 周期边界条件与最小镜像
//!
//! `LatticeBox` 在晶格之外记录原点与逐轴周期性标志，并回答最小镜像位移查询。
//!
//! 对三斜晶胞，逐轴取整并不一定给出最短位移，因此在把分数坐标约化到
//! [-0.5, 0.5) 之后，还要在周期轴上搜索相邻的 3×3×3 镜像。
//!
//! ## 依赖关系
//! - 被 `geometry/neighbors.rs`, `rdf/`, `commands/process.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{MdExafsError, Result};
use crate::models::frame::Frame;
use crate::models::structure::{dot, norm, Lattice};

/// 体积/边长乘积低于此比例视为退化晶胞
const DEGENERACY_TOLERANCE: f64 = 1e-8;

/// 带周期性标志的模拟盒子
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeBox {
    lattice: Lattice,
    inverse: [[f64; 3]; 3],
    origin: [f64; 3],
    pbc: [bool; 3],
}

impl LatticeBox {
    /// 创建盒子，拒绝近零体积的晶胞
    pub fn new(lattice: Lattice, pbc: [bool; 3]) -> Result<Self> {
        let volume = lattice.volume();
        let scale: f64 = lattice.matrix.iter().map(|v| norm(*v)).product();
        if !volume.is_finite() || scale <= 0.0 || volume.abs() <= DEGENERACY_TOLERANCE * scale {
            return Err(MdExafsError::DegenerateLattice { volume });
        }

        let inverse = lattice
            .inverse()
            .ok_or(MdExafsError::DegenerateLattice { volume })?;

        Ok(LatticeBox {
            lattice,
            inverse,
            origin: [0.0; 3],
            pbc,
        })
    }

    /// 设置盒子原点（用于分箱，不影响位移计算）
    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    #[cfg(test)]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn volume(&self) -> f64 {
        self.lattice.volume().abs()
    }

    /// 笛卡尔位移 → 分数位移
    pub fn cart_to_frac(&self, cart: [f64; 3]) -> [f64; 3] {
        let m = &self.inverse;
        [
            cart[0] * m[0][0] + cart[1] * m[1][0] + cart[2] * m[2][0],
            cart[0] * m[0][1] + cart[1] * m[1][1] + cart[2] * m[2][1],
            cart[0] * m[0][2] + cart[1] * m[1][2] + cart[2] * m[2][2],
        ]
    }

    /// 分数位移 → 笛卡尔位移
    pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
        self.lattice.frac_to_cart(frac)
    }

    /// 绝对位置相对于原点的分数坐标
    pub fn fractional_position(&self, position: [f64; 3]) -> [f64; 3] {
        self.cart_to_frac([
            position[0] - self.origin[0],
            position[1] - self.origin[1],
            position[2] - self.origin[2],
        ])
    }

    /// 最小周期宽度的一半；没有周期轴时为 `None`
    pub fn max_safe_cutoff(&self) -> Option<f64> {
        let widths = self.lattice.perpendicular_widths();
        (0..3)
            .filter(|&i| self.pbc[i])
            .map(|i| widths[i] * 0.5)
            .reduce(f64::min)
    }

    /// 截断半径超过最短周期宽度一半时，最小镜像约定不再可靠
    pub fn validate_cutoff(&self, cutoff: f64) -> Result<()> {
        if let Some(limit) = self.max_safe_cutoff() {
            if cutoff > limit {
                return Err(MdExafsError::CutoffTooLarge { cutoff, limit });
            }
        }
        Ok(())
    }

    /// 最小镜像位移
    ///
    /// 非周期轴保持不变；周期轴先约化到 [-0.5, 0.5)，再在 ±1 镜像中搜索最短者。
    pub fn minimum_image(&self, displacement: [f64; 3]) -> [f64; 3] {
        if !self.pbc.iter().any(|&p| p) {
            return displacement;
        }

        let mut frac = self.cart_to_frac(displacement);
        for axis in 0..3 {
            if self.pbc[axis] {
                frac[axis] -= frac[axis].round();
            }
        }
        let reduced = self.frac_to_cart(frac);

        let range = |axis: usize| -> &'static [f64] {
            if self.pbc[axis] {
                &[-1.0, 0.0, 1.0]
            } else {
                &[0.0]
            }
        };

        let mut best = reduced;
        let mut best_sq = dot(reduced, reduced);
        for &i in range(0) {
            for &j in range(1) {
                for &k in range(2) {
                    if i == 0.0 && j == 0.0 && k == 0.0 {
                        continue;
                    }
                    let shift = self.frac_to_cart([i, j, k]);
                    let candidate = [
                        reduced[0] + shift[0],
                        reduced[1] + shift[1],
                        reduced[2] + shift[2],
                    ];
                    let sq = dot(candidate, candidate);
                    if sq < best_sq {
                        best_sq = sq;
                        best = candidate;
                    }
                }
            }
        }
        best
    }

    /// 两点之间的最小镜像位移 (to - from)
    pub fn displacement(&self, from: [f64; 3], to: [f64; 3]) -> [f64; 3] {
        self.minimum_image([to[0] - from[0], to[1] - from[1], to[2] - from[2]])
    }
}

/// 晶格模式：整条轨迹固定，或逐帧读取
///
/// 在配置阶段选定一次，几何查询时不再做类型判断。
#[derive(Debug, Clone)]
pub enum LatticeMode {
    Static(LatticeBox),
    Dynamic,
}

impl LatticeMode {
    /// 取得某一帧使用的盒子
    pub fn resolve<'a>(&'a self, frame: &'a Frame) -> Result<&'a LatticeBox> {
        match self {
            LatticeMode::Static(lattice_box) => Ok(lattice_box),
            LatticeMode::Dynamic => frame
                .lattice
                .as_ref()
                .ok_or(MdExafsError::MissingLattice { frame: frame.index }),
        }
    }
}

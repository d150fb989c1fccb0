//! # 晶格数据模型
//!
//! 定义晶格向量矩阵及其基本几何量（体积、晶格参数、倒易变换）。
//! 周期边界与最小镜像逻辑在 `geometry/pbc.rs` 中。
//!
//! ## 依赖关系
//! - 被 `geometry/`, `parsers/lammps_dump.rs`, `config.rs` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

/// 晶格参数表示
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let cos_gamma = gamma.to_radians().cos();
        let sin_gamma = gamma.to_radians().sin();

        let a_vec = [a, 0.0, 0.0];
        let b_vec = [b * cos_gamma, b * sin_gamma, 0.0];

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [a_vec, b_vec, [c1, c2, c3]],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }

    /// 正交盒子
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Self {
        Lattice::from_vectors([[a, 0.0, 0.0], [0.0, b, 0.0], [0.0, 0.0, c]])
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;

        let a = norm(a_vec);
        let b = norm(b_vec);
        let c = norm(c_vec);

        let alpha = (dot(b_vec, c_vec) / (b * c)).acos().to_degrees();
        let beta = (dot(a_vec, c_vec) / (a * c)).acos().to_degrees();
        let gamma = (dot(a_vec, b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 计算晶格体积（带符号的行列式）
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.matrix;
        dot(a, cross(b, c))
    }

    /// 三个晶面间距方向上的盒子宽度 V / |b×c|, V / |c×a|, V / |a×b|
    ///
    /// 任意两点的分数坐标差 |Δs_i| ≤ |Δr| / width_i。
    pub fn perpendicular_widths(&self) -> [f64; 3] {
        let [a, b, c] = self.matrix;
        let volume = self.volume().abs();
        [
            volume / norm(cross(b, c)),
            volume / norm(cross(c, a)),
            volume / norm(cross(a, b)),
        ]
    }

    /// 逆矩阵（行向量约定下 frac = cart · M⁻¹）
    ///
    /// 体积为零时返回 `None`。
    pub fn inverse(&self) -> Option<[[f64; 3]; 3]> {
        let m = self.matrix;
        let det = self.volume();
        if det.abs() < f64::MIN_POSITIVE {
            return None;
        }

        Some([
            [
                (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
            ],
            [
                (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
            ],
        ])
    }

    /// 分数坐标转笛卡尔坐标
    pub fn frac_to_cart(&self, frac: [f64; 3]) -> [f64; 3] {
        let m = self.matrix;
        [
            frac[0] * m[0][0] + frac[1] * m[1][0] + frac[2] * m[2][0],
            frac[0] * m[0][1] + frac[1] * m[1][1] + frac[2] * m[2][1],
            frac[0] * m[0][2] + frac[1] * m[1][2] + frac[2] * m[2][2],
        ]
    }
}

/// 点积
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// 叉积
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// 向量模长
pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_from_parameters_cubic() {
        let lattice = Lattice::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 90.0);
        let (a, b, c, alpha, beta, gamma) = lattice.parameters();

        assert!((a - 5.0).abs() < 1e-6);
        assert!((b - 5.0).abs() < 1e-6);
        assert!((c - 5.0).abs() < 1e-6);
        assert!((alpha - 90.0).abs() < 1e-6);
        assert!((beta - 90.0).abs() < 1e-6);
        assert!((gamma - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_lattice_volume_cubic() {
        let lattice = Lattice::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 90.0);
        assert!((lattice.volume().abs() - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_lattice_hexagonal() {
        let lattice = Lattice::from_parameters(3.0, 3.0, 5.0, 90.0, 90.0, 120.0);
        let (a, b, c, _, _, gamma) = lattice.parameters();

        assert!((a - 3.0).abs() < 0.01);
        assert!((b - 3.0).abs() < 0.01);
        assert!((c - 5.0).abs() < 0.01);
        assert!((gamma - 120.0).abs() < 0.01);
    }

    #[test]
    fn test_inverse_round_trip() {
        let lattice = Lattice::from_parameters(5.47, 5.8, 6.1, 80.0, 95.0, 110.0);
        let inv = lattice.inverse().unwrap();
        let frac = [0.25, -0.4, 0.9];
        let cart = lattice.frac_to_cart(frac);
        let back = [
            cart[0] * inv[0][0] + cart[1] * inv[1][0] + cart[2] * inv[2][0],
            cart[0] * inv[0][1] + cart[1] * inv[1][1] + cart[2] * inv[2][1],
            cart[0] * inv[0][2] + cart[1] * inv[1][2] + cart[2] * inv[2][2],
        ];
        for i in 0..3 {
            assert!((back[i] - frac[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_perpendicular_widths_orthorhombic() {
        let lattice = Lattice::orthorhombic(4.0, 5.0, 6.0);
        let w = lattice.perpendicular_widths();
        assert!((w[0] - 4.0).abs() < 1e-12);
        assert!((w[1] - 5.0).abs() < 1e-12);
        assert!((w[2] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_lattice_has_no_inverse() {
        let lattice = Lattice::from_vectors([[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(lattice.inverse().is_none());
    }
}

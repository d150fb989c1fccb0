//! # 高斯峰拟合
//!
//! 在峰窗口内对直方图计数取对数，做最小二乘抛物线拟合
//! ln n(r) = c0 + c1·r + c2·r²，得到高斯峰的中心、σ² 与积分面积。
//!
//! ## 依赖关系
//! - 被 `commands/rdf.rs` 使用
//! - 使用 `rdf/histogram.rs` 的 RdfCurve

use crate::rdf::histogram::RdfCurve;

use std::f64::consts::PI;

/// 拟合得到的高斯峰
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPeak {
    pub center: f64,
    pub sigma2: f64,
    /// 峰值（每箱计数）
    pub amplitude: f64,
    /// 积分得到的配位数
    pub coordination: f64,
}

/// 3×3 线性方程组（高斯消元，部分主元）
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..3 {
            let f = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// 对 (r, 计数) 序列拟合高斯
///
/// 仅使用窗口内计数为正的点；少于 3 个点或曲率不为负时返回 `None`。
pub fn fit_gaussian_points(
    r: &[f64],
    counts: &[f64],
    window: (f64, f64),
    bin_width: f64,
    centers: usize,
) -> Option<GaussianPeak> {
    let points: Vec<(f64, f64)> = r
        .iter()
        .zip(counts)
        .filter(|(x, n)| **x >= window.0 && **x <= window.1 && **n > 0.0)
        .map(|(x, n)| (*x, n.ln()))
        .collect();
    if points.len() < 3 || centers == 0 {
        return None;
    }

    // 以窗口中点为原点改善条件数
    let shift = 0.5 * (window.0 + window.1);
    let mut ata = [[0.0; 3]; 3];
    let mut atb = [0.0; 3];
    for &(x, y) in &points {
        let x = x - shift;
        let basis = [1.0, x, x * x];
        for i in 0..3 {
            for j in 0..3 {
                ata[i][j] += basis[i] * basis[j];
            }
            atb[i] += basis[i] * y;
        }
    }

    let [c0, c1, c2] = solve3(ata, atb)?;
    if !(c2 < 0.0) {
        return None;
    }

    let sigma2 = -1.0 / (2.0 * c2);
    let center = shift - c1 / (2.0 * c2);
    let amplitude = (c0 - c1 * c1 / (4.0 * c2)).exp();
    let area = amplitude * (2.0 * PI * sigma2).sqrt() / bin_width;

    Some(GaussianPeak {
        center,
        sigma2,
        amplitude,
        coordination: area / centers as f64,
    })
}

/// 对累加后的 RDF 直方图拟合高斯
pub fn fit_gaussian(curve: &RdfCurve, window: (f64, f64), centers: usize) -> Option<GaussianPeak> {
    let counts: Vec<f64> = curve.counts.iter().map(|&n| n as f64).collect();
    fit_gaussian_points(&curve.r, &counts, window, curve.bin_width, centers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_gaussian_is_recovered() {
        let dr = 0.01;
        let (mu, s2, centers) = (2.37, 0.0042, 50usize);
        let cn = 8.0;
        let amplitude = cn * centers as f64 * dr / (2.0 * PI * s2).sqrt();

        let r: Vec<f64> = (0..400).map(|i| (i as f64 + 0.5) * dr).collect();
        let counts: Vec<f64> = r
            .iter()
            .map(|x| amplitude * (-(x - mu).powi(2) / (2.0 * s2)).exp())
            .collect();

        let peak = fit_gaussian_points(&r, &counts, (2.2, 2.55), dr, centers).unwrap();
        assert_relative_eq!(peak.center, mu, epsilon = 1e-8);
        assert_relative_eq!(peak.sigma2, s2, max_relative = 1e-6);
        assert_relative_eq!(peak.coordination, cn, max_relative = 1e-6);
    }

    #[test]
    fn test_too_few_points() {
        let r = [1.0, 1.1, 1.2];
        let counts = [0.0, 5.0, 0.0];
        assert!(fit_gaussian_points(&r, &counts, (0.9, 1.3), 0.1, 1).is_none());
    }

    #[test]
    fn test_convex_data_rejected() {
        let r = [1.0, 1.1, 1.2, 1.3];
        let counts = [10.0, 5.0, 5.0, 10.0];
        assert!(fit_gaussian_points(&r, &counts, (0.9, 1.4), 0.1, 1).is_none());
    }

    #[test]
    fn test_solve3() {
        let a = [[2.0, 1.0, -1.0], [-3.0, -1.0, 2.0], [-2.0, 1.0, 2.0]];
        let x = solve3(a, [8.0, -11.0, -3.0]).unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], -1.0, epsilon = 1e-12);
    }
}

//! # 径向分布函数累加
//!
//! 统计中心原子与近邻元素之间的最小镜像距离，跨帧累加后归一化为 g(r)。
//!
//! 分箱覆盖 (0, cutoff]，第 i 个箱为 (i·dr, (i+1)·dr]。
//! 归一化：g_i = n_i / (Σ_f N_center,f · ρ_f · V_shell,i)，
//! ρ_f 为该帧近邻元素的数密度（中心与近邻同种元素时扣除自身）。
//!
//! ## 依赖关系
//! - 被 `commands/rdf.rs` 使用
//! - 使用 `geometry/neighbors.rs`, `geometry/pbc.rs`

use crate::error::{MdExafsError, Result};
use crate::geometry::neighbors::{FrameNeighbors, NeighborMethod};
use crate::geometry::pbc::LatticeBox;
use crate::models::frame::Frame;
use crate::models::path::normalize_element;

use std::f64::consts::PI;

/// 峰窗口内的直接统计量
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct WindowSums {
    pairs: u64,
    sum: f64,
    sum_sq: f64,
}

/// 峰窗口内的直接壳层分析
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellAnalysis {
    pub window: (f64, f64),
    /// 窗口内近邻对数
    pub pairs: u64,
    /// 平均配位数
    pub coordination: f64,
    /// 平均距离
    pub mean_distance: f64,
    /// 均方相对位移 σ²
    pub msrd: f64,
}

/// 归一化后的 g(r)
#[derive(Debug, Clone, PartialEq)]
pub struct RdfCurve {
    /// 箱中心
    pub r: Vec<f64>,
    pub g: Vec<f64>,
    pub counts: Vec<u64>,
    pub bin_width: f64,
}

/// 跨帧累加器
#[derive(Debug, Clone)]
pub struct RdfAccumulator {
    center: String,
    neighbor: String,
    cutoff: f64,
    bin_width: f64,
    counts: Vec<u64>,
    window: Option<(f64, f64)>,
    window_sums: WindowSums,
    frames: usize,
    centers: usize,
    /// Σ_f N_center,f · ρ_f
    norm: f64,
}

impl RdfAccumulator {
    pub fn new(center: &str, neighbor: &str, cutoff: f64, bins: usize) -> Result<Self> {
        if bins == 0 || !(cutoff > 0.0 && cutoff.is_finite()) {
            return Err(MdExafsError::InvalidConfig(format!(
                "RDF needs a positive cutoff and at least one bin (cutoff {}, bins {})",
                cutoff, bins
            )));
        }
        Ok(RdfAccumulator {
            center: normalize_element(center),
            neighbor: normalize_element(neighbor),
            cutoff,
            bin_width: cutoff / bins as f64,
            counts: vec![0; bins],
            window: None,
            window_sums: WindowSums::default(),
            frames: 0,
            centers: 0,
            norm: 0.0,
        })
    }

    /// 设置峰窗口 [lo, hi]，用于直接壳层分析
    pub fn with_window(mut self, lo: f64, hi: f64) -> Self {
        self.window = Some((lo, hi));
        self
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn centers(&self) -> usize {
        self.centers
    }

    fn bin_of(&self, distance: f64) -> Option<usize> {
        if distance <= 0.0 || distance > self.cutoff {
            return None;
        }
        let bin = (distance / self.bin_width).ceil() as usize;
        Some(bin.clamp(1, self.counts.len()) - 1)
    }

    /// 累加一帧
    pub fn add_frame(
        &mut self,
        frame: &Frame,
        lattice_box: &LatticeBox,
        method: NeighborMethod,
    ) -> Result<()> {
        let centers = frame.indices_of(&self.center);
        let neighbor_count = frame.indices_of(&self.neighbor).len();
        let same_species = self.center == self.neighbor;

        let partners = if same_species {
            neighbor_count.saturating_sub(1)
        } else {
            neighbor_count
        };
        let density = partners as f64 / lattice_box.volume();

        let finder = FrameNeighbors::new(frame, lattice_box, self.cutoff, method)?;
        for &center in &centers {
            let shell = finder.shell(center)?;
            for neighbor in &shell.neighbors {
                if !neighbor.element.eq_ignore_ascii_case(&self.neighbor) {
                    continue;
                }
                if let Some(bin) = self.bin_of(neighbor.distance) {
                    self.counts[bin] += 1;
                }
                if let Some((lo, hi)) = self.window {
                    if neighbor.distance >= lo && neighbor.distance <= hi {
                        self.window_sums.pairs += 1;
                        self.window_sums.sum += neighbor.distance;
                        self.window_sums.sum_sq += neighbor.distance * neighbor.distance;
                    }
                }
            }
        }

        self.frames += 1;
        self.centers += centers.len();
        self.norm += centers.len() as f64 * density;
        Ok(())
    }

    /// 归一化为 g(r)
    pub fn curve(&self) -> RdfCurve {
        let dr = self.bin_width;
        let mut r = Vec::with_capacity(self.counts.len());
        let mut g = Vec::with_capacity(self.counts.len());

        for (i, &count) in self.counts.iter().enumerate() {
            let lo = i as f64 * dr;
            let hi = lo + dr;
            r.push(lo + 0.5 * dr);

            let shell_volume = 4.0 / 3.0 * PI * (hi.powi(3) - lo.powi(3));
            let ideal = self.norm * shell_volume;
            g.push(if ideal > 0.0 { count as f64 / ideal } else { 0.0 });
        }

        RdfCurve {
            r,
            g,
            counts: self.counts.clone(),
            bin_width: dr,
        }
    }

    /// 峰窗口内的配位数、平均距离与 σ²；未设窗口或没有中心原子时为 `None`
    pub fn shell_analysis(&self) -> Option<ShellAnalysis> {
        let window = self.window?;
        if self.centers == 0 {
            return None;
        }
        let sums = self.window_sums;
        let (mean, msrd) = if sums.pairs > 0 {
            let n = sums.pairs as f64;
            let mean = sums.sum / n;
            (mean, (sums.sum_sq / n - mean * mean).max(0.0))
        } else {
            (0.0, 0.0)
        };
        Some(ShellAnalysis {
            window,
            pairs: sums.pairs,
            coordination: sums.pairs as f64 / self.centers as f64,
            mean_distance: mean,
            msrd,
        })
    }
}

//! # χ(k) 累加器
//!
//! 以 (加权和, 总权重) 对的形式累加 χ(k)。合并只做逐点加法，因此满足
//! 交换律与结合律；最终平均 = 加权和 / 总权重。
//!
//! ## 依赖关系
//! - 被 `averaging/engine.rs` 使用
//! - 使用 `models/path.rs`

use crate::error::{MdExafsError, Result};
use crate::models::path::ChiData;

/// k 网格逐点比较的绝对容差
const K_GRID_TOLERANCE: f64 = 1e-6;

/// 加权 χ(k) 部分和
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChiAccumulator {
    k: Vec<f64>,
    weighted_sum: Vec<f64>,
    total_weight: f64,
    /// 参与累加的 χ(k) 条数
    contributions: usize,
}

impl ChiAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.contributions == 0
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    #[cfg(test)]
    pub fn contributions(&self) -> usize {
        self.contributions
    }

    /// 累加一条 χ(k)，`source` 仅用于错误信息
    pub fn add(&mut self, chi: &ChiData, weight: f64, source: &str) -> Result<()> {
        if chi.is_empty() {
            return Err(MdExafsError::KGridMismatch {
                path: source.to_string(),
                reason: "empty k-grid".to_string(),
            });
        }

        if self.k.is_empty() {
            self.k = chi.k.clone();
            self.weighted_sum = vec![0.0; chi.len()];
        } else {
            check_grid(&self.k, &chi.k, source)?;
        }

        for (acc, value) in self.weighted_sum.iter_mut().zip(&chi.chi) {
            *acc += weight * value;
        }
        self.total_weight += weight;
        self.contributions += 1;
        Ok(())
    }

    /// 合并另一个部分和
    pub fn merge(&mut self, other: ChiAccumulator, source: &str) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other;
            return Ok(());
        }

        check_grid(&self.k, &other.k, source)?;
        for (acc, value) in self.weighted_sum.iter_mut().zip(&other.weighted_sum) {
            *acc += value;
        }
        self.total_weight += other.total_weight;
        self.contributions += other.contributions;
        Ok(())
    }

    /// 未归一化的加权和
    pub fn sum(&self) -> ChiData {
        ChiData {
            k: self.k.clone(),
            chi: self.weighted_sum.clone(),
        }
    }

    /// 加权平均；总权重为零时返回 `None`
    pub fn mean(&self) -> Option<ChiData> {
        if self.is_empty() || self.total_weight == 0.0 {
            return None;
        }
        Some(ChiData {
            k: self.k.clone(),
            chi: self
                .weighted_sum
                .iter()
                .map(|s| s / self.total_weight)
                .collect(),
        })
    }
}

fn check_grid(expected: &[f64], found: &[f64], source: &str) -> Result<()> {
    if expected.len() != found.len() {
        return Err(MdExafsError::KGridMismatch {
            path: source.to_string(),
            reason: format!("{} k points, expected {}", found.len(), expected.len()),
        });
    }
    if let Some((i, (a, b))) = expected
        .iter()
        .zip(found)
        .enumerate()
        .find(|(_, (a, b))| (*a - *b).abs() > K_GRID_TOLERANCE)
    {
        return Err(MdExafsError::KGridMismatch {
            path: source.to_string(),
            reason: format!("k[{}] = {} differs from {}", i, b, a),
        });
    }
    Ok(())
}

//! # 路径筛选
//!
//! 按路径标签、逐标签有效距离区间与腿数筛选散射路径。
//!
//! 一条路径被选中，当且仅当其标签在请求列表中，reff 落在该标签的
//! `[下限, 上限]` 内（未设的一端不限制），并且在设置了腿数时 nleg 相等。
//! 上限增大时选中集合只会扩大。
//!
//! ## 依赖关系
//! - 被 `config.rs`, `averaging/engine.rs`, `database/query.rs` 使用
//! - 使用 `models/path.rs`

use crate::error::{MdExafsError, Result};
use crate::models::path::canonical_label;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// 平均方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AveragingMode {
    /// 以简并度为权重的平均
    #[default]
    Weighted,
    /// 先在每个样本内求和，再对样本等权平均
    PerAtomSum,
}

impl fmt::Display for AveragingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AveragingMode::Weighted => write!(f, "degeneracy-weighted"),
            AveragingMode::PerAtomSum => write!(f, "per-atom sum"),
        }
    }
}

/// 距离界限：统一标量或与标签一一对应的列表
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DistanceBound {
    Scalar(f64),
    PerLabel(Vec<f64>),
}

impl DistanceBound {
    /// 解析命令行输入 "3.0" 或 "2.5,4.0"
    pub fn parse(text: &str) -> Result<Self> {
        let values: Vec<f64> = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>().map_err(|_| {
                    MdExafsError::InvalidArgument(format!("invalid distance '{}'", s))
                })
            })
            .collect::<Result<_>>()?;

        match values.as_slice() {
            [] => Err(MdExafsError::InvalidArgument(
                "empty distance list".to_string(),
            )),
            [single] if !text.contains(',') => Ok(DistanceBound::Scalar(*single)),
            _ => Ok(DistanceBound::PerLabel(values)),
        }
    }

    /// 列表长度必须与标签数一致
    pub fn validate(&self, labels: usize) -> Result<()> {
        match self {
            DistanceBound::Scalar(d) => check_positive(*d),
            DistanceBound::PerLabel(list) => {
                if list.len() != labels {
                    return Err(MdExafsError::DistanceListMismatch {
                        labels,
                        distances: list.len(),
                    });
                }
                list.iter().try_for_each(|d| check_positive(*d))
            }
        }
    }

    fn bound_for(&self, position: usize) -> f64 {
        match self {
            DistanceBound::Scalar(d) => *d,
            DistanceBound::PerLabel(list) => list[position],
        }
    }
}

fn check_positive(d: f64) -> Result<()> {
    if d > 0.0 && d.is_finite() {
        Ok(())
    } else {
        Err(MdExafsError::InvalidArgument(format!(
            "distance bound must be positive, got {}",
            d
        )))
    }
}

/// 单个标签的 reff 区间
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReffWindow {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ReffWindow {
    pub fn contains(&self, reff: f64) -> bool {
        self.min.map_or(true, |min| reff >= min) && self.max.map_or(true, |max| reff <= max)
    }
}

impl fmt::Display for ReffWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "{:.3} <= reff <= {:.3}", min, max),
            (Some(min), None) => write!(f, "reff >= {:.3}", min),
            (None, Some(max)) => write!(f, "reff <= {:.3}", max),
            (None, None) => Ok(()),
        }
    }
}

/// 逐标签的路径筛选器
#[derive(Debug, Clone, PartialEq)]
pub struct PathFilter {
    /// 请求顺序下的 (标签, 距离区间)
    entries: Vec<(String, ReffWindow)>,
    lookup: BTreeMap<String, ReffWindow>,
    nleg: Option<usize>,
}

impl PathFilter {
    pub fn new(labels: &[String], max_distance: Option<&DistanceBound>) -> Result<Self> {
        if labels.is_empty() {
            return Err(MdExafsError::InvalidArgument(
                "at least one path label is required".to_string(),
            ));
        }
        if let Some(md) = max_distance {
            md.validate(labels.len())?;
        }

        let mut entries = Vec::with_capacity(labels.len());
        let mut lookup = BTreeMap::new();
        for (i, raw) in labels.iter().enumerate() {
            let label = canonical_label(raw);
            if label.is_empty() {
                return Err(MdExafsError::InvalidArgument(format!(
                    "invalid path label '{}'",
                    raw
                )));
            }
            let window = ReffWindow {
                min: None,
                max: max_distance.map(|md| md.bound_for(i)),
            };
            if lookup.insert(label.clone(), window).is_some() {
                return Err(MdExafsError::InvalidArgument(format!(
                    "path label '{}' requested twice",
                    label
                )));
            }
            entries.push((label, window));
        }

        Ok(PathFilter {
            entries,
            lookup,
            nleg: None,
        })
    }

    /// 设置逐标签的距离下限
    pub fn with_min_distance(mut self, min_distance: Option<&DistanceBound>) -> Result<Self> {
        let Some(md) = min_distance else {
            return Ok(self);
        };
        md.validate(self.entries.len())?;

        for (i, (label, window)) in self.entries.iter_mut().enumerate() {
            let min = md.bound_for(i);
            if window.max.is_some_and(|max| min > max) {
                return Err(MdExafsError::InvalidArgument(format!(
                    "path '{}': min distance {} exceeds max distance {}",
                    label,
                    min,
                    window.max.unwrap_or_default()
                )));
            }
            window.min = Some(min);
            self.lookup.insert(label.clone(), *window);
        }
        Ok(self)
    }

    /// 只保留给定腿数的路径
    pub fn with_nleg(mut self, nleg: Option<usize>) -> Result<Self> {
        if nleg.is_some_and(|n| n < 2) {
            return Err(MdExafsError::InvalidArgument(
                "nleg must be at least 2".to_string(),
            ));
        }
        self.nleg = nleg;
        Ok(self)
    }

    /// 请求的 (标签, 距离区间)，保持输入顺序
    pub fn entries(&self) -> &[(String, ReffWindow)] {
        &self.entries
    }

    pub fn nleg(&self) -> Option<usize> {
        self.nleg
    }

    /// 路径是否被选中
    pub fn accepts(&self, label: &str, nleg: usize, reff: f64) -> bool {
        if self.nleg.is_some_and(|n| n != nleg) {
            return false;
        }
        self.lookup
            .get(label)
            .is_some_and(|window| window.contains(reff))
    }
}

/// 平均请求中的路径选择
#[derive(Debug, Clone, PartialEq)]
pub enum PathSelection {
    /// 不分解路径，平均每个样本的总 χ(k)
    Total,
    /// 按标签与距离筛选的多路径平均
    Paths(PathFilter),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_distance_bound() {
        assert_eq!(DistanceBound::parse("3.0").unwrap(), DistanceBound::Scalar(3.0));
        assert_eq!(
            DistanceBound::parse("2.5, 4").unwrap(),
            DistanceBound::PerLabel(vec![2.5, 4.0])
        );
        assert!(DistanceBound::parse("abc").is_err());
        assert!(DistanceBound::parse("").is_err());
    }

    #[test]
    fn test_per_label_bounds() {
        let filter = PathFilter::new(
            &labels(&["u-o", "U-O-O"]),
            Some(&DistanceBound::PerLabel(vec![2.5, 4.0])),
        )
        .unwrap();

        assert!(filter.accepts("U-O", 2, 2.3));
        assert!(filter.accepts("U-O", 2, 2.5));
        assert!(!filter.accepts("U-O", 2, 2.6));
        assert!(filter.accepts("U-O-O", 3, 3.9));
        assert!(!filter.accepts("U-U", 2, 1.0));
        assert_eq!(filter.entries()[0].1.max, Some(2.5));
    }

    #[test]
    fn test_unbounded_label_accepts_everything() {
        let filter = PathFilter::new(&labels(&["Au-Au"]), None).unwrap();
        assert!(filter.accepts("Au-Au", 2, 100.0));
    }

    #[test]
    fn test_min_distance_and_nleg() {
        let filter = PathFilter::new(&labels(&["U-O", "U-U"]), Some(&DistanceBound::Scalar(4.0)))
            .unwrap()
            .with_min_distance(Some(&DistanceBound::PerLabel(vec![2.0, 3.5])))
            .unwrap()
            .with_nleg(Some(2))
            .unwrap();

        assert!(!filter.accepts("U-O", 2, 1.9));
        assert!(filter.accepts("U-O", 2, 2.0));
        assert!(!filter.accepts("U-U", 2, 3.4));
        assert!(filter.accepts("U-U", 2, 3.9));
        assert!(!filter.accepts("U-U", 3, 3.9));
        assert_eq!(filter.entries()[1].1.to_string(), "3.500 <= reff <= 4.000");
    }

    #[test]
    fn test_invalid_min_distance_or_nleg() {
        let base = || PathFilter::new(&labels(&["U-O"]), Some(&DistanceBound::Scalar(2.5))).unwrap();
        assert!(base().with_min_distance(Some(&DistanceBound::Scalar(3.0))).is_err());
        assert!(base()
            .with_min_distance(Some(&DistanceBound::PerLabel(vec![1.0, 2.0])))
            .is_err());
        assert!(base().with_nleg(Some(1)).is_err());
        assert_eq!(base().with_nleg(None).unwrap().nleg(), None);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = PathFilter::new(
            &labels(&["U-O", "U-O-O"]),
            Some(&DistanceBound::PerLabel(vec![2.5])),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MdExafsError::DistanceListMismatch {
                labels: 2,
                distances: 1
            }
        ));
    }

    #[test]
    fn test_duplicate_label_rejected() {
        assert!(PathFilter::new(&labels(&["U-O", "u-o"]), None).is_err());
    }

    #[test]
    fn test_increasing_bound_is_monotonic() {
        let distances = [1.8, 2.2, 2.35, 2.9, 3.4, 4.1, 4.6];
        let mut previous = 0;
        for max in [2.0, 2.4, 3.0, 3.5, 5.0] {
            let filter =
                PathFilter::new(&labels(&["U-O"]), Some(&DistanceBound::Scalar(max))).unwrap();
            let count = distances.iter().filter(|&&r| filter.accepts("U-O", 2, r)).count();
            assert!(count >= previous);
            previous = count;
        }
        assert_eq!(previous, distances.len());
    }
}

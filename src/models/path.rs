//! # 散射路径数据模型
//!
//! 定义样本标识 (frame, atom)、规范化路径标签以及单条散射路径的 χ(k) 贡献。
//!
//! ## 依赖关系
//! - 被 `parsers/feff_out.rs`, `database/`, `averaging/` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};
use std::fmt;

/// 一次局域结构提取的样本标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleId {
    pub frame: usize,
    pub atom: usize,
}

impl SampleId {
    pub fn new(frame: usize, atom: usize) -> Self {
        SampleId { frame, atom }
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {} / atom {}", self.frame, self.atom)
    }
}

/// k 网格上的 χ(k)
#[derive(Debug, Clone, PartialEq)]
pub struct ChiData {
    pub k: Vec<f64>,
    pub chi: Vec<f64>,
}

impl ChiData {
    pub fn len(&self) -> usize {
        self.k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.k.is_empty()
    }
}

/// 单条散射路径
#[derive(Debug, Clone, PartialEq)]
pub struct ScatteringPath {
    /// 来源样本
    pub sample: SampleId,

    /// 求解器输出中的路径编号
    pub index: usize,

    /// 规范化标签，例如 "U-O" 或 "U-O-O"
    pub label: String,

    /// 腿数
    pub nleg: usize,

    /// 简并度（作为权重）
    pub degeneracy: f64,

    /// 有效路径长度 reff (Å)
    pub reff: f64,

    pub chi: ChiData,
}

/// 规范化元素符号：去掉数字及非字母字符，首字母大写
///
/// `"o2"` → `"O"`, `"AU "` → `"Au"`
pub fn normalize_element(raw: &str) -> String {
    let letters: String = raw.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    let mut chars = letters.chars();
    match chars.next() {
        Some(first) => {
            let mut symbol = first.to_ascii_uppercase().to_string();
            symbol.extend(chars.map(|c| c.to_ascii_lowercase()));
            symbol
        }
        None => String::new(),
    }
}

/// 由有序元素序列生成路径标签
pub fn label_from_elements<S: AsRef<str>>(elements: &[S]) -> String {
    elements
        .iter()
        .map(|e| normalize_element(e.as_ref()))
        .collect::<Vec<_>>()
        .join("-")
}

/// 规范化用户输入的标签，例如 `"u-o-o"` → `"U-O-O"`
pub fn canonical_label(label: &str) -> String {
    let parts: Vec<&str> = label.split('-').map(str::trim).collect();
    label_from_elements(&parts)
}

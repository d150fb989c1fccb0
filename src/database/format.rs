//! # 路径数据库文件格式
//!
//! ```text
//! 0      8        12       16              24              32
//! +------+--------+--------+---------------+---------------+
//! | MDXCHIDB | version | state | index offset | index length |
//! +------+--------+--------+---------------+---------------+
//! | χ(k) 数据块 (小端 f64，连续存放) ...                     |
//! +--------------------------------------------------------+
//! | JSON 索引                                               |
//! +--------------------------------------------------------+
//! ```
//!
//! 构建开始时写入 state = 0 的文件头，索引落盘后才改写为 state = 1。
//! 因此 state = 0 的文件即为被中断的构建。
//!
//! 索引按 标签 → 帧 → 条目 组织（均为 B 树），按标签与帧范围查询时
//! 不会扫描无关条目。
//!
//! ## 依赖关系
//! - 被 `database/builder.rs`, `database/query.rs` 使用
//! - 使用 `serde` 派生索引结构

use crate::error::{MdExafsError, Result};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const MAGIC: &[u8; 8] = b"MDXCHIDB";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_LEN: u64 = 32;

/// 构建状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Building,
    Complete,
}

impl BuildState {
    fn code(self) -> u32 {
        match self {
            BuildState::Building => 0,
            BuildState::Complete => 1,
        }
    }
}

/// 32 字节文件头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub state: BuildState,
    pub index_offset: u64,
    pub index_len: u64,
}

impl Header {
    pub fn building() -> Self {
        Header {
            version: FORMAT_VERSION,
            state: BuildState::Building,
            index_offset: 0,
            index_len: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN as usize] {
        let mut buf = [0u8; HEADER_LEN as usize];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.state.code().to_le_bytes());
        buf[16..24].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[24..32].copy_from_slice(&self.index_len.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        let corrupt = |reason: String| MdExafsError::DatabaseCorrupt {
            path: path.display().to_string(),
            reason,
        };

        if bytes.len() < HEADER_LEN as usize {
            return Err(corrupt(format!("header is {} bytes", bytes.len())));
        }
        if &bytes[0..8] != MAGIC {
            return Err(corrupt("bad magic, not a path database".to_string()));
        }

        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let u64_at = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[i..i + 8]);
            u64::from_le_bytes(b)
        };

        let version = u32_at(8);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", version)));
        }
        let state = match u32_at(12) {
            0 => BuildState::Building,
            1 => BuildState::Complete,
            other => return Err(corrupt(format!("unknown build state {}", other))),
        };

        Ok(Header {
            version,
            state,
            index_offset: u64_at(16),
            index_len: u64_at(24),
        })
    }
}

/// 读取数据库文件头
pub fn read_header(path: &Path) -> Result<Header> {
    let mut file = File::open(path).map_err(|e| MdExafsError::read(path, e))?;
    let mut buf = Vec::with_capacity(HEADER_LEN as usize);
    file.by_ref()
        .take(HEADER_LEN)
        .read_to_end(&mut buf)
        .map_err(|e| MdExafsError::read(path, e))?;
    Header::from_bytes(&buf, path)
}

/// 数据块引用：k 网格序号 + 文件偏移 + f64 个数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub grid: usize,
    pub offset: u64,
    pub len: usize,
}

/// 单条路径的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub atom: usize,
    pub path_index: usize,
    pub nleg: usize,
    pub degeneracy: f64,
    pub reff: f64,
    pub chi: BlockRef,
}

/// 单个样本的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub atom: usize,
    /// 成功解析的路径条数；没有 paths.dat 或解析失败时为 `None`
    pub paths: Option<usize>,
    /// 总 χ(k)
    pub total: Option<BlockRef>,
}

/// 构建时解析失败的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailedPart {
    Paths,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub frame: usize,
    pub atom: usize,
    pub part: FailedPart,
    pub reason: String,
}

/// JSON 索引
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseIndex {
    /// 构建时的结果根目录
    pub source_root: String,
    /// 去重后的 k 网格
    pub grids: Vec<Vec<f64>>,
    /// 标签 → 帧 → 条目（帧内按 (atom, path_index) 排序）
    pub labels: BTreeMap<String, BTreeMap<usize, Vec<EntryMeta>>>,
    /// 帧 → 样本
    pub samples: BTreeMap<usize, Vec<SampleRecord>>,
    pub failures: Vec<FailureRecord>,
}

impl DatabaseIndex {
    /// 登记 k 网格，返回其序号
    pub fn intern_grid(&mut self, k: &[f64]) -> usize {
        match self.grids.iter().position(|g| g.as_slice() == k) {
            Some(i) => i,
            None => {
                self.grids.push(k.to_vec());
                self.grids.len() - 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_header_bytes() {
        let header = Header {
            version: FORMAT_VERSION,
            state: BuildState::Complete,
            index_offset: 4096,
            index_len: 123,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..8], MAGIC);
        assert_eq!(Header::from_bytes(&bytes, &PathBuf::from("db")).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_garbage() {
        let path = PathBuf::from("db");
        assert!(Header::from_bytes(b"short", &path).is_err());
        assert!(Header::from_bytes(&[0u8; 32], &path).is_err());

        let mut bytes = Header::building().to_bytes();
        bytes[12] = 7;
        assert!(matches!(
            Header::from_bytes(&bytes, &path),
            Err(MdExafsError::DatabaseCorrupt { .. })
        ));
    }

    #[test]
    fn test_intern_grid_deduplicates() {
        let mut index = DatabaseIndex::default();
        assert_eq!(index.intern_grid(&[0.0, 0.05]), 0);
        assert_eq!(index.intern_grid(&[0.0, 0.1]), 1);
        assert_eq!(index.intern_grid(&[0.0, 0.05]), 0);
        assert_eq!(index.grids.len(), 2);
    }
}

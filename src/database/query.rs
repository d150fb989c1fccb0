//! # 路径数据库查询
//!
//! 打开已完成的数据库，只读加载 JSON 索引；χ(k) 数据块按需读取。
//! 多个读取者可以同时打开同一个数据库。
//!
//! ## 依赖关系
//! - 被 `averaging/engine.rs`, `commands/inspect.rs` 使用
//! - 使用 `database/format.rs`, `averaging/filter.rs`

use crate::averaging::filter::PathFilter;
use crate::config::FrameRange;
use crate::database::format::{
    read_header, BlockRef, BuildState, DatabaseIndex, EntryMeta, FailedPart, SampleRecord,
    HEADER_LEN,
};
use crate::error::{MdExafsError, Result};
use crate::models::path::{ChiData, SampleId, ScatteringPath};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// 已打开的路径数据库
#[derive(Debug)]
pub struct PathDatabase {
    path: PathBuf,
    file_len: u64,
    index: DatabaseIndex,
}

/// 按样本分组的查询结果，样本按 (frame, atom) 排序，样本内按路径编号排序
pub type SampleHits<'a> = BTreeMap<SampleId, Vec<(&'a str, &'a EntryMeta)>>;

/// 单个标签的统计
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStats {
    pub label: String,
    pub count: usize,
    pub reff_min: f64,
    pub reff_max: f64,
}

/// 数据库统计
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub source_root: String,
    pub labels: Vec<LabelStats>,
    /// 帧 → 样本数
    pub frames: BTreeMap<usize, usize>,
    pub entries: usize,
    pub grids: usize,
    pub failures: usize,
}

impl PathDatabase {
    /// 打开数据库；不存在、未完成或损坏时报错
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MdExafsError::DatabaseNotFound {
                path: path.display().to_string(),
            });
        }

        let header = read_header(path)?;
        if header.state == BuildState::Building {
            return Err(MdExafsError::DatabaseIncomplete {
                path: path.display().to_string(),
            });
        }

        let corrupt = |reason: String| MdExafsError::DatabaseCorrupt {
            path: path.display().to_string(),
            reason,
        };

        let mut file = File::open(path).map_err(|e| MdExafsError::read(path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| MdExafsError::read(path, e))?
            .len();

        let index_end = header.index_offset.checked_add(header.index_len);
        if header.index_offset < HEADER_LEN || index_end.map_or(true, |end| end > file_len) {
            return Err(corrupt(format!(
                "index [{}, +{}) lies outside the {}-byte file",
                header.index_offset, header.index_len, file_len
            )));
        }

        let mut json = vec![0u8; header.index_len as usize];
        file.seek(SeekFrom::Start(header.index_offset))
            .and_then(|_| file.read_exact(&mut json))
            .map_err(|e| MdExafsError::read(path, e))?;

        let index: DatabaseIndex =
            serde_json::from_slice(&json).map_err(|e| corrupt(format!("bad index: {}", e)))?;

        Ok(PathDatabase {
            path: path.to_path_buf(),
            file_len,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_root(&self) -> &str {
        &self.index.source_root
    }

    /// 按标签与帧范围查找条目，距离上限由筛选器决定
    ///
    /// 先按标签定位，再按帧号区间截取，不扫描其他标签或范围外的帧。
    pub fn lookup(&self, filter: &PathFilter, range: &FrameRange) -> SampleHits<'_> {
        let mut hits: SampleHits<'_> = BTreeMap::new();

        for (label, _) in filter.entries() {
            let Some((stored_label, frames)) = self.index.labels.get_key_value(label.as_str())
            else {
                continue;
            };
            for (&frame, entries) in frames.range(range.start..range.end) {
                if !range.contains(frame) {
                    continue;
                }
                for entry in entries {
                    if filter.accepts(stored_label, entry.nleg, entry.reff) {
                        hits.entry(SampleId::new(frame, entry.atom))
                            .or_default()
                            .push((stored_label.as_str(), entry));
                    }
                }
            }
        }

        for entries in hits.values_mut() {
            entries.sort_by_key(|(_, e)| e.path_index);
        }
        hits
    }

    /// 帧范围内有路径记录的样本
    pub fn samples_with_paths(&self, range: &FrameRange) -> Vec<SampleId> {
        self.samples_in(range)
            .filter(|(_, record)| record.paths.is_some())
            .map(|(id, _)| id)
            .collect()
    }

    /// 帧范围内的总 χ(k) 数据块
    pub fn totals(&self, range: &FrameRange) -> Vec<(SampleId, BlockRef)> {
        self.samples_in(range)
            .filter_map(|(id, record)| record.total.map(|block| (id, block)))
            .collect()
    }

    /// 帧范围内构建时解析失败的样本
    pub fn failures(&self, range: &FrameRange, part: FailedPart) -> Vec<(SampleId, String)> {
        self.index
            .failures
            .iter()
            .filter(|f| f.part == part && range.contains(f.frame))
            .map(|f| (SampleId::new(f.frame, f.atom), f.reason.clone()))
            .collect()
    }

    fn samples_in<'a>(
        &'a self,
        range: &'a FrameRange,
    ) -> impl Iterator<Item = (SampleId, &'a SampleRecord)> + 'a {
        self.index
            .samples
            .range(range.start..range.end)
            .filter(move |(frame, _)| range.contains(**frame))
            .flat_map(|(&frame, records)| {
                records
                    .iter()
                    .map(move |r| (SampleId::new(frame, r.atom), r))
            })
    }

    /// 新建一个数据块读取器，每个线程各用一个
    pub fn reader(&self) -> Result<BlockReader<'_>> {
        let file = File::open(&self.path).map_err(|e| MdExafsError::read(&self.path, e))?;
        Ok(BlockReader {
            db: self,
            reader: BufReader::new(file),
        })
    }

    /// 统计信息
    pub fn stats(&self) -> DatabaseStats {
        let labels = self
            .index
            .labels
            .iter()
            .map(|(label, frames)| {
                let mut stats = LabelStats {
                    label: label.clone(),
                    count: 0,
                    reff_min: f64::INFINITY,
                    reff_max: f64::NEG_INFINITY,
                };
                for entry in frames.values().flatten() {
                    stats.count += 1;
                    stats.reff_min = stats.reff_min.min(entry.reff);
                    stats.reff_max = stats.reff_max.max(entry.reff);
                }
                stats
            })
            .collect::<Vec<_>>();

        DatabaseStats {
            source_root: self.index.source_root.clone(),
            entries: labels.iter().map(|l| l.count).sum(),
            labels,
            frames: self
                .index
                .samples
                .iter()
                .map(|(frame, records)| (*frame, records.len()))
                .collect(),
            grids: self.index.grids.len(),
            failures: self.index.failures.len(),
        }
    }
}

/// 数据块读取器
pub struct BlockReader<'a> {
    db: &'a PathDatabase,
    reader: BufReader<File>,
}

impl<'a> BlockReader<'a> {
    /// 读取一个 χ(k) 数据块
    pub fn read_chi(&mut self, block: &BlockRef) -> Result<ChiData> {
        let db = self.db;
        let path = &db.path;
        let corrupt = |reason: String| MdExafsError::DatabaseCorrupt {
            path: path.display().to_string(),
            reason,
        };

        let k = db
            .index
            .grids
            .get(block.grid)
            .ok_or_else(|| corrupt(format!("unknown k-grid #{}", block.grid)))?;
        if k.len() != block.len {
            return Err(corrupt(format!(
                "block at {} holds {} values but its k-grid has {}",
                block.offset,
                block.len,
                k.len()
            )));
        }
        let byte_len = block.len as u64 * 8;
        if block.offset < HEADER_LEN || block.offset + byte_len > db.file_len {
            return Err(corrupt(format!("block at {} exceeds file", block.offset)));
        }

        let mut bytes = vec![0u8; byte_len as usize];
        self.reader
            .seek(SeekFrom::Start(block.offset))
            .and_then(|_| self.reader.read_exact(&mut bytes))
            .map_err(|e| MdExafsError::read(path, e))?;

        let chi = bytes
            .chunks_exact(8)
            .map(|b| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(b);
                f64::from_le_bytes(buf)
            })
            .collect();

        Ok(ChiData { k: k.clone(), chi })
    }

    /// 还原为散射路径记录
    pub fn load_path(
        &mut self,
        sample: SampleId,
        label: &str,
        entry: &EntryMeta,
    ) -> Result<ScatteringPath> {
        Ok(ScatteringPath {
            sample,
            index: entry.path_index,
            label: label.to_string(),
            nleg: entry.nleg,
            degeneracy: entry.degeneracy,
            reff: entry.reff,
            chi: self.read_chi(&entry.chi)?,
        })
    }
}

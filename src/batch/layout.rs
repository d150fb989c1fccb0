//! # 样本目录布局
//!
//! 每个 (frame, atom) 样本占用独立目录 `<root>/frame_<frame>/atom_<atom>/`，
//! 目录名可反向解析为 [`SampleId`]。
//!
//! ## 依赖关系
//! - 被 `commands/`, `averaging/engine.rs`, `database/builder.rs` 使用
//! - 使用 `walkdir` 遍历目录, `regex` 解析目录名

use crate::config::FrameRange;
use crate::error::{MdExafsError, Result};
use crate::models::path::SampleId;

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 求解器输入文件名
pub const DECK_FILE: &str = "feff.inp";

static FRAME_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^frame_(\d+)$").expect("valid frame dir regex"));
static ATOM_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^atom_(\d+)$").expect("valid atom dir regex"));

/// 样本目录路径
pub fn sample_dir(root: &Path, sample: SampleId) -> PathBuf {
    root.join(format!("frame_{}", sample.frame))
        .join(format!("atom_{}", sample.atom))
}

fn capture_index(re: &Regex, name: &str) -> Option<usize> {
    re.captures(name)?.get(1)?.as_str().parse().ok()
}

/// 从样本目录路径解析 (frame, atom)
pub fn parse_sample_dir(path: &Path) -> Option<SampleId> {
    let atom_name = path.file_name()?.to_str()?;
    let frame_name = path.parent()?.file_name()?.to_str()?;
    Some(SampleId::new(
        capture_index(&FRAME_DIR, frame_name)?,
        capture_index(&ATOM_DIR, atom_name)?,
    ))
}

/// 发现根目录下的样本
///
/// 只返回至少包含 `markers` 之一的样本目录，按 (frame, atom) 排序；
/// 给定 `range` 时只保留帧号在范围内的样本。
pub fn discover_samples(
    root: &Path,
    range: Option<&FrameRange>,
    markers: &[&str],
) -> Result<Vec<(SampleId, PathBuf)>> {
    if !root.is_dir() {
        return Err(MdExafsError::DirectoryNotFound {
            path: root.display().to_string(),
        });
    }

    let mut samples: Vec<(SampleId, PathBuf)> = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let id = parse_sample_dir(e.path())?;
            Some((id, e.into_path()))
        })
        .filter(|(id, _)| range.map_or(true, |r| r.contains(id.frame)))
        .filter(|(_, dir)| markers.iter().any(|m| dir.join(m).is_file()))
        .collect();

    samples.sort_by_key(|(id, _)| *id);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sample_dir_round_trip() {
        let root = Path::new("/data/run");
        let dir = sample_dir(root, SampleId::new(180020, 17));
        assert_eq!(dir, PathBuf::from("/data/run/frame_180020/atom_17"));
        assert_eq!(parse_sample_dir(&dir), Some(SampleId::new(180020, 17)));
        assert_eq!(parse_sample_dir(Path::new("/data/frame_1/other_2")), None);
    }

    #[test]
    fn test_discover_filters_by_range_and_marker() {
        let tmp = tempfile::tempdir().unwrap();
        for (frame, atom) in [(0, 3), (0, 1), (2, 5), (4, 0), (5, 2)] {
            let dir = sample_dir(tmp.path(), SampleId::new(frame, atom));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(DECK_FILE), "TITLE\n").unwrap();
        }
        // 没有输入文件的目录被忽略
        fs::create_dir_all(sample_dir(tmp.path(), SampleId::new(2, 9))).unwrap();
        fs::create_dir_all(tmp.path().join("frame_x").join("atom_1")).unwrap();

        let range = FrameRange::new(0, 5, 2).unwrap();
        let found = discover_samples(tmp.path(), Some(&range), &[DECK_FILE]).unwrap();
        let ids: Vec<SampleId> = found.iter().map(|(id, _)| *id).collect();
        assert_eq!(
            ids,
            vec![SampleId::new(0, 1), SampleId::new(0, 3), SampleId::new(2, 5), SampleId::new(4, 0)]
        );

        let all = discover_samples(tmp.path(), None, &[DECK_FILE]).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_missing_root() {
        assert!(matches!(
            discover_samples(Path::new("/nonexistent/md-exafs"), None, &[DECK_FILE]),
            Err(MdExafsError::DirectoryNotFound { .. })
        ));
    }
}

//! # FEFF 输出解析器
//!
//! 读取单个样本目录中的散射路径目录与 χ(k) 文件。
//!
//! ## paths.dat 格式说明
//! ```text
//! Au fcc                                        # 标题，直到一行虚线
//! ---------------------------------------------------------------
//!     1    2  12.000  index, nleg, degeneracy, r=  2.8838
//!       x           y           z     ipot  label      rleg      beta        eta
//!      0.000000    2.039178    2.039178  1 'Au    '     2.8838  180.0000    0.0000
//!      0.000000    0.000000    0.000000  0 'Au    '     2.8838  180.0000    0.0000
//! ```
//! 每个路径块的最后一行是吸收原子。标签 = 吸收原子 + 依次经过的散射原子。
//!
//! ## chipNNNN.dat / chi.dat 格式说明
//! `#` 开头为注释，数据行前两列为 k 与 χ(k)。k 值按原样读取，不做插值。
//!
//! ## 依赖关系
//! - 被 `averaging/engine.rs`, `database/builder.rs` 使用
//! - 使用 `models/path.rs`

use crate::error::{MdExafsError, Result};
use crate::models::path::{label_from_elements, ChiData, SampleId, ScatteringPath};

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

/// 路径目录文件名
pub const PATHS_FILE: &str = "paths.dat";

/// 总 χ(k) 文件名
pub const TOTAL_CHI_FILE: &str = "chi.dat";

/// 路径块首行: index nleg degeneracy ... r= reff
static PATH_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s+(\d+)\s+([-+0-9.eEdD]+)\s+.*r\s*=\s*([-+0-9.eEdD]+)")
        .expect("valid path header regex")
});

/// paths.dat 中的单个路径块
#[derive(Debug, Clone, PartialEq)]
pub struct PathHeader {
    pub index: usize,
    pub nleg: usize,
    pub degeneracy: f64,
    pub reff: f64,
    pub label: String,
}

/// 单路径 χ(k) 文件名
pub fn chip_file_name(index: usize) -> String {
    format!("chip{:04}.dat", index)
}

/// Fortran 风格数字（允许 D 指数）
fn parse_number(token: &str) -> Option<f64> {
    let token = token.trim();
    token
        .parse::<f64>()
        .ok()
        .or_else(|| token.replace(['D', 'd'], "E").parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// 坐标行中的元素标签：优先取引号内内容，否则取第 5 列
fn row_label(line: &str) -> Option<String> {
    if let Some(start) = line.find('\'') {
        let rest = &line[start + 1..];
        let end = rest.find('\'')?;
        let label = rest[..end].trim();
        return (!label.is_empty()).then(|| label.to_string());
    }
    line.split_whitespace().nth(4).map(|s| s.to_string())
}

/// 解析 paths.dat 文件
pub fn parse_paths_file(path: &Path) -> Result<Vec<PathHeader>> {
    let content = fs::read_to_string(path).map_err(|e| MdExafsError::read(path, e))?;
    parse_paths_content(&content, path)
}

/// 从字符串内容解析 paths.dat
pub fn parse_paths_content(content: &str, source: &Path) -> Result<Vec<PathHeader>> {
    let lines: Vec<&str> = content.lines().collect();

    let body_start = lines
        .iter()
        .position(|l| l.trim_start().starts_with("-----"))
        .map(|i| i + 1)
        .ok_or_else(|| MdExafsError::parse("paths.dat", source, "missing dashed header separator"))?;

    let mut headers = Vec::new();
    let mut i = body_start;

    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        let caps = PATH_HEADER.captures(line).ok_or_else(|| {
            MdExafsError::parse(
                "paths.dat",
                source,
                format!("unexpected line {}: '{}'", i + 1, line.trim()),
            )
        })?;

        let index: usize = caps[1].parse().map_err(|_| {
            MdExafsError::parse("paths.dat", source, format!("bad path index at line {}", i + 1))
        })?;
        let nleg: usize = caps[2].parse().map_err(|_| {
            MdExafsError::parse("paths.dat", source, format!("bad nleg at line {}", i + 1))
        })?;
        let degeneracy = parse_number(&caps[3]).ok_or_else(|| {
            MdExafsError::parse("paths.dat", source, format!("bad degeneracy at line {}", i + 1))
        })?;
        let reff = parse_number(&caps[4]).ok_or_else(|| {
            MdExafsError::parse("paths.dat", source, format!("bad reff at line {}", i + 1))
        })?;

        if nleg < 2 {
            return Err(MdExafsError::parse(
                "paths.dat",
                source,
                format!("path {} has nleg = {}", index, nleg),
            ));
        }

        // 列标题行
        i += 1;
        if i < lines.len() && parse_number(lines[i].split_whitespace().next().unwrap_or("")).is_none()
        {
            i += 1;
        }

        let mut elements = Vec::with_capacity(nleg);
        for leg in 0..nleg {
            let row = lines.get(i + leg).ok_or_else(|| {
                MdExafsError::parse(
                    "paths.dat",
                    source,
                    format!("path {} truncated after {} of {} atoms", index, leg, nleg),
                )
            })?;
            let coords_ok = row
                .split_whitespace()
                .take(4)
                .filter(|t| parse_number(t).is_some())
                .count()
                == 4;
            let label = row_label(row).filter(|_| coords_ok).ok_or_else(|| {
                MdExafsError::parse(
                    "paths.dat",
                    source,
                    format!("path {} has a malformed atom row: '{}'", index, row.trim()),
                )
            })?;
            elements.push(label);
        }
        i += nleg;

        // 最后一行是吸收原子，放到标签最前面
        let absorber = elements.pop().unwrap_or_default();
        let mut ordered = Vec::with_capacity(nleg);
        ordered.push(absorber);
        ordered.extend(elements);

        headers.push(PathHeader {
            index,
            nleg,
            degeneracy,
            reff,
            label: label_from_elements(&ordered),
        });
    }

    if headers.is_empty() {
        return Err(MdExafsError::parse("paths.dat", source, "no paths listed"));
    }

    Ok(headers)
}

/// 解析 χ(k) 文件
pub fn parse_chi_file(path: &Path) -> Result<ChiData> {
    let content = fs::read_to_string(path).map_err(|e| MdExafsError::read(path, e))?;
    parse_chi_content(&content, path)
}

/// 从字符串内容解析 χ(k)
pub fn parse_chi_content(content: &str, source: &Path) -> Result<ChiData> {
    let mut k = Vec::new();
    let mut chi = Vec::new();

    for (n, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let kv = tokens.next().and_then(parse_number);
        let cv = tokens.next().and_then(parse_number);

        match (kv, cv) {
            (Some(kv), Some(cv)) => {
                if let Some(&last) = k.last() {
                    if kv <= last {
                        return Err(MdExafsError::parse(
                            "chi",
                            source,
                            format!("k not increasing at line {} ({} after {})", n + 1, kv, last),
                        ));
                    }
                }
                k.push(kv);
                chi.push(cv);
            }
            // 数据开始前的非数字行视为表头
            _ if k.is_empty() => continue,
            _ => {
                return Err(MdExafsError::parse(
                    "chi",
                    source,
                    format!("malformed data row at line {}: '{}'", n + 1, trimmed),
                ))
            }
        }
    }

    if k.is_empty() {
        return Err(MdExafsError::parse("chi", source, "no data rows"));
    }

    Ok(ChiData { k, chi })
}

/// 读取一个样本的全部散射路径（按路径编号排序）
///
/// paths.dat 列出但没有 chipNNNN.dat 的路径被求解器的重要性筛选剔除，直接跳过。
pub fn read_sample_paths(dir: &Path, sample: SampleId) -> Result<Vec<ScatteringPath>> {
    let paths_file = dir.join(PATHS_FILE);
    if !paths_file.exists() {
        return Err(MdExafsError::FileNotFound {
            path: paths_file.display().to_string(),
        });
    }
    let headers = parse_paths_file(&paths_file)?;

    let mut paths = Vec::with_capacity(headers.len());
    for header in headers {
        let chip = dir.join(chip_file_name(header.index));
        if !chip.exists() {
            continue;
        }
        let chi = parse_chi_file(&chip)?;
        paths.push(ScatteringPath {
            sample,
            index: header.index,
            label: header.label,
            nleg: header.nleg,
            degeneracy: header.degeneracy,
            reff: header.reff,
            chi,
        });
    }

    if paths.is_empty() {
        return Err(MdExafsError::parse(
            "paths.dat",
            &paths_file,
            "no per-path chipNNNN.dat files found for listed paths",
        ));
    }

    paths.sort_by_key(|p| p.index);
    Ok(paths)
}

/// 读取一个样本的总 χ(k)
pub fn read_sample_total(dir: &Path) -> Result<ChiData> {
    let file = dir.join(TOTAL_CHI_FILE);
    if !file.exists() {
        return Err(MdExafsError::FileNotFound {
            path: file.display().to_string(),
        });
    }
    parse_chi_file(&file)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) const PATHS_DAT: &str = r#" UO2 frame 0 atom 3
 Pot  0  U     ...
 ---------------------------------------------------------------
     1    2   8.000  index, nleg, degeneracy, r=  2.3681
      x           y           z     ipot  label      rleg      beta        eta
      1.367200    1.367200    1.367200  2 'O     '     2.3681  180.0000    0.0000
      0.000000    0.000000    0.000000  0 'U     '     2.3681  180.0000    0.0000
     2    3  24.000  index, nleg, degeneracy, r=  3.5400
      x           y           z     ipot  label      rleg      beta        eta
      1.367200    1.367200    1.367200  2 'O     '     2.3681  125.2644    0.0000
     -1.367200    1.367200    1.367200  2 'O     '     2.7344  125.2644    0.0000
      0.000000    0.000000    0.000000  0 'U     '     2.3681  109.4712    0.0000
     3    2  12.000  index, nleg, degeneracy, r=  3.8671
      x           y           z     ipot  label      rleg      beta        eta
      2.734400    2.734400    0.000000  1 'U     '     3.8671  180.0000    0.0000
      0.000000    0.000000    0.000000  0 'U     '     3.8671  180.0000    0.0000
"#;

    pub(crate) fn chi_text(values: &[(f64, f64)]) -> String {
        let mut s = String::from("# chi(k) for one path\n#  k   chi   mag   phase\n");
        for (k, c) in values {
            s.push_str(&format!("{:10.4} {:16.8e} 0.0 0.0\n", k, c));
        }
        s
    }

    /// 合成一个完整的求解器结果目录（3 条路径 + chi.dat）
    pub(crate) fn write_fake_sample(root: &Path, sample: SampleId) -> std::path::PathBuf {
        let dir = crate::batch::layout::sample_dir(root, sample);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PATHS_FILE), PATHS_DAT).unwrap();

        let grid: Vec<f64> = (0..41).map(|i| i as f64 * 0.05).collect();
        let mut total = vec![0.0; grid.len()];
        for index in 1..=3 {
            let amplitude = 0.01 * (sample.frame + 1) as f64 / index as f64;
            let values: Vec<(f64, f64)> = grid
                .iter()
                .map(|&k| (k, amplitude * (k * (index + 1) as f64).sin() + sample.atom as f64 * 1e-4))
                .collect();
            for (t, (_, c)) in total.iter_mut().zip(&values) {
                *t += c;
            }
            fs::write(dir.join(chip_file_name(index)), chi_text(&values)).unwrap();
        }
        let total: Vec<(f64, f64)> = grid.iter().copied().zip(total).collect();
        fs::write(dir.join(TOTAL_CHI_FILE), chi_text(&total)).unwrap();
        dir
    }

    #[test]
    fn test_parse_paths_dat() {
        let headers = parse_paths_content(PATHS_DAT, &PathBuf::from("paths.dat")).unwrap();
        assert_eq!(headers.len(), 3);

        assert_eq!(headers[0].label, "U-O");
        assert_eq!(headers[0].nleg, 2);
        assert!((headers[0].degeneracy - 8.0).abs() < 1e-12);
        assert!((headers[0].reff - 2.3681).abs() < 1e-12);

        assert_eq!(headers[1].label, "U-O-O");
        assert_eq!(headers[1].nleg, 3);

        assert_eq!(headers[2].label, "U-U");
        assert_eq!(headers[2].index, 3);
    }

    #[test]
    fn test_truncated_paths_dat_is_error() {
        let truncated: String = PATHS_DAT.lines().take(11).collect::<Vec<_>>().join("\n");
        let err = parse_paths_content(&truncated, &PathBuf::from("frame_0/atom_3/paths.dat"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("truncated"), "{}", msg);
        assert!(msg.contains("frame_0/atom_3"), "{}", msg);
    }

    #[test]
    fn test_parse_chi_verbatim_grid() {
        let text = chi_text(&[(0.0, 0.0), (0.05, 1.25e-3), (0.1, -2.5e-3)]);
        let chi = parse_chi_content(&text, &PathBuf::from("chip0001.dat")).unwrap();
        assert_eq!(chi.k, vec![0.0, 0.05, 0.1]);
        assert!((chi.chi[2] + 2.5e-3).abs() < 1e-15);
    }

    #[test]
    fn test_fortran_exponent() {
        let chi = parse_chi_content("0.0 1.0D-02\n0.1 2.0D-02\n", &PathBuf::from("chi.dat"))
            .unwrap();
        assert!((chi.chi[1] - 0.02).abs() < 1e-15);
    }

    #[test]
    fn test_malformed_chi_rows() {
        let src = PathBuf::from("chip0002.dat");
        assert!(parse_chi_content("# only comments\n", &src).is_err());
        assert!(parse_chi_content("0.0 1.0\n0.1 2.0\ngarbage here\n", &src).is_err());
        assert!(parse_chi_content("0.1 1.0\n0.0 2.0\n", &src).is_err());
    }

    #[test]
    fn test_read_sample_skips_filtered_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PATHS_FILE), PATHS_DAT).unwrap();
        fs::write(
            dir.path().join(chip_file_name(1)),
            chi_text(&[(0.0, 0.1), (0.5, 0.2)]),
        )
        .unwrap();
        fs::write(
            dir.path().join(chip_file_name(3)),
            chi_text(&[(0.0, 0.3), (0.5, 0.4)]),
        )
        .unwrap();

        let paths = read_sample_paths(dir.path(), SampleId::new(0, 3)).unwrap();
        let indices: Vec<usize> = paths.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(paths[1].label, "U-U");
        assert_eq!(paths[0].sample, SampleId::new(0, 3));
    }

    #[test]
    fn test_sample_without_chip_files_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PATHS_FILE), PATHS_DAT).unwrap();
        assert!(read_sample_paths(dir.path(), SampleId::new(0, 0)).is_err());
    }
}

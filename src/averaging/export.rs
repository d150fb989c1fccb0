//! # 平均结果导出
//!
//! - χ(k) 文件：`#` 注释头 + `k chi` 两列
//! - 汇总报告：`<output 文件名主干>_summary.txt`
//!
//! ## 依赖关系
//! - 被 `commands/average.rs` 调用
//! - 使用 `averaging/engine.rs` 的 AveragingReport 结构

use crate::averaging::engine::{AveragedSpectrum, AveragingReport, AveragingRequest};
use crate::averaging::filter::PathSelection;
use crate::error::{MdExafsError, Result};

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// 汇总报告中最多列出的失败样本数
const MAX_LISTED_FAILURES: usize = 50;

/// 汇总报告路径
pub fn summary_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "chi_avg".to_string());
    output.with_file_name(format!("{}_summary.txt", stem))
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| MdExafsError::write(parent, e))
        }
        _ => Ok(()),
    }
}

/// 写出平均 χ(k)
pub fn write_chi(spectrum: &AveragedSpectrum, header: &[String], output: &Path) -> Result<()> {
    let mut text = String::new();
    text.push_str("# md-exafs averaged chi(k)\n");
    for line in header {
        let _ = writeln!(text, "# {}", line);
    }
    let _ = writeln!(
        text,
        "# samples = {}, paths = {}, total weight = {}",
        spectrum.samples, spectrum.paths, spectrum.total_weight
    );
    text.push_str("#       k              chi\n");

    for (k, chi) in spectrum.k.iter().zip(&spectrum.chi) {
        let _ = writeln!(text, "{:10.4} {:20.10e}", k, chi);
    }

    ensure_parent(output)?;
    fs::write(output, text).map_err(|e| MdExafsError::write(output, e))
}

/// 请求的描述行，用于 χ(k) 文件头与汇总报告
pub fn describe_request(request: &AveragingRequest, source: &str) -> Vec<String> {
    let mut lines = vec![
        format!("input: {}", request.input_dir.display()),
        format!("source: {}", source),
        format!("frames: {}", request.frame_range),
    ];
    match &request.selection {
        PathSelection::Total => lines.push("paths: all (total chi per sample, equal weight)".to_string()),
        PathSelection::Paths(filter) => {
            lines.push(format!("mode: {}", request.mode));
            let parts: Vec<String> = filter
                .entries()
                .iter()
                .map(|(label, window)| match (window.min, window.max) {
                    (None, None) => label.clone(),
                    _ => format!("{} ({})", label, window),
                })
                .collect();
            lines.push(format!("paths: {}", parts.join(", ")));
            if let Some(nleg) = filter.nleg() {
                lines.push(format!("nleg: {}", nleg));
            }
        }
    }
    lines
}

/// 写出汇总报告
pub fn write_summary(report: &AveragingReport, header: &[String], output: &Path) -> Result<()> {
    let spectrum = &report.spectrum;
    let mut text = String::new();

    text.push_str("md-exafs averaging summary\n");
    text.push_str(&"=".repeat(60));
    text.push('\n');
    for line in header {
        let _ = writeln!(text, "{}", line);
    }
    text.push('\n');

    let _ = writeln!(text, "candidate samples:    {}", report.candidates);
    let _ = writeln!(text, "contributing samples: {}", spectrum.samples);
    let _ = writeln!(text, "contributing paths:   {}", spectrum.paths);
    let _ = writeln!(text, "total weight:         {}", spectrum.total_weight);
    if let (Some(first), Some(last)) = (spectrum.k.first(), spectrum.k.last()) {
        let _ = writeln!(
            text,
            "k grid:               {:.4} .. {:.4} ({} points)",
            first,
            last,
            spectrum.k.len()
        );
    }

    if !report.label_counts.is_empty() {
        text.push_str("\npaths per label\n");
        for (label, count) in &report.label_counts {
            let _ = writeln!(text, "  {:<16} {}", label, count);
        }
    }

    let _ = writeln!(text, "\nfailed samples: {}", report.failures.len());
    for (id, reason) in report.failures.iter().take(MAX_LISTED_FAILURES) {
        let first_line = reason.lines().next().unwrap_or_default();
        let _ = writeln!(text, "  {}: {}", id, first_line);
    }
    if report.failures.len() > MAX_LISTED_FAILURES {
        let _ = writeln!(
            text,
            "  ... and {} more",
            report.failures.len() - MAX_LISTED_FAILURES
        );
    }

    ensure_parent(output)?;
    fs::write(output, text).map_err(|e| MdExafsError::write(output, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::path::SampleId;
    use crate::parsers::feff_out::parse_chi_file;
    use std::collections::BTreeMap;

    fn report() -> AveragingReport {
        AveragingReport {
            spectrum: AveragedSpectrum {
                k: vec![0.0, 0.05, 0.1],
                chi: vec![0.0, 1.5e-3, -2.25e-3],
                samples: 2,
                paths: 4,
                total_weight: 40.0,
            },
            label_counts: BTreeMap::from([("U-O".to_string(), 2), ("U-U".to_string(), 2)]),
            candidates: 3,
            failures: vec![(SampleId::new(4, 1), "Failed to parse paths.dat file\nmore".to_string())],
        }
    }

    #[test]
    fn test_summary_path() {
        assert_eq!(
            summary_path(Path::new("out/chi_avg.dat")),
            PathBuf::from("out/chi_avg_summary.txt")
        );
    }

    #[test]
    fn test_chi_file_is_readable_back() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("nested").join("chi_avg.dat");
        let report = report();
        write_chi(&report.spectrum, &["frames: [0, 10) step 1".to_string()], &out).unwrap();

        let chi = parse_chi_file(&out).unwrap();
        assert_eq!(chi.k, report.spectrum.k);
        for (a, b) in chi.chi.iter().zip(&report.spectrum.chi) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_summary_lists_counts_and_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("chi_avg_summary.txt");
        write_summary(&report(), &["mode: degeneracy-weighted".to_string()], &out).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("contributing samples: 2"));
        assert!(text.contains("U-O"));
        assert!(text.contains("frame 4 / atom 1: Failed to parse paths.dat file"));
        assert!(!text.contains("more"));
    }
}

//! # RDF 结果导出
//!
//! - CSV：`r, g_r, count` 三列
//! - 报告：壳层分析与高斯拟合结果的表格
//!
//! ## 依赖关系
//! - 被 `commands/rdf.rs` 调用
//! - 使用 `csv` 写入，`tabled` 排版

use crate::error::{MdExafsError, Result};
use crate::rdf::histogram::{RdfCurve, ShellAnalysis};
use crate::rdf::peak::GaussianPeak;

use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// 导出 g(r) 为 CSV
pub fn to_csv(curve: &RdfCurve, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| MdExafsError::write(parent, e))?;
        }
    }
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record(["r", "g_r", "count"])?;
    for ((r, g), n) in curve.r.iter().zip(&curve.g).zip(&curve.counts) {
        wtr.write_record(&[format!("{:.4}", r), format!("{:.6}", g), n.to_string()])?;
    }

    wtr.flush().map_err(|e| MdExafsError::write(output_path, e))?;
    Ok(())
}

/// 报告文件路径：`<csv 主干>_report.txt`
pub fn report_path(csv_path: &Path) -> PathBuf {
    let stem = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "rdf".to_string());
    csv_path.with_file_name(format!("{}_report.txt", stem))
}

#[derive(Tabled)]
struct PeakRow {
    #[tabled(rename = "Method")]
    method: &'static str,
    #[tabled(rename = "CN")]
    coordination: String,
    #[tabled(rename = "R (Å)")]
    distance: String,
    #[tabled(rename = "σ² (Å²)")]
    sigma2: String,
}

/// 壳层分析表格
pub fn peak_table(shell: Option<&ShellAnalysis>, fit: Option<&GaussianPeak>) -> String {
    let mut rows = Vec::new();
    if let Some(s) = shell {
        rows.push(PeakRow {
            method: "direct",
            coordination: format!("{:.4}", s.coordination),
            distance: format!("{:.5}", s.mean_distance),
            sigma2: format!("{:.6}", s.msrd),
        });
    }
    if let Some(p) = fit {
        rows.push(PeakRow {
            method: "gaussian fit",
            coordination: format!("{:.4}", p.coordination),
            distance: format!("{:.5}", p.center),
            sigma2: format!("{:.6}", p.sigma2),
        });
    }
    Table::new(&rows).to_string()
}

/// 写出文本报告
pub fn write_report(header: &[String], table: &str, output_path: &Path) -> Result<()> {
    let mut text = String::from("md-exafs RDF report\n");
    text.push_str(&"=".repeat(60));
    text.push('\n');
    for line in header {
        text.push_str(line);
        text.push('\n');
    }
    text.push('\n');
    text.push_str(table);
    text.push('\n');
    std::fs::write(output_path, text).map_err(|e| MdExafsError::write(output_path, e))
}

//! # 曲线绘图
//!
//! 使用 `plotters` 把平均 χ(k) 或 g(r) 画成 PNG / SVG。
//! 输出格式由文件扩展名决定（`.svg` 为矢量图，其余为 PNG）。
//!
//! ## 依赖关系
//! - 被 `commands/average.rs`, `commands/rdf.rs` 调用
//! - 使用 `plotters` 渲染图表

use crate::error::{MdExafsError, Result};

use plotters::prelude::*;
use std::path::Path;

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 650;

/// 一条待绘制的曲线
#[derive(Debug, Clone)]
pub struct Curve<'a> {
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub title: String,
    pub x_desc: &'a str,
    pub y_desc: &'a str,
    /// 需要高亮的 x 区间（如 RDF 峰窗口）
    pub highlight: Option<(f64, f64)>,
}

fn plot_err<E: std::fmt::Debug>(e: E) -> MdExafsError {
    MdExafsError::Other(format!("Plot rendering failed: {:?}", e))
}

/// 绘制曲线并写入文件
pub fn plot_curve(curve: &Curve, output: &Path) -> Result<()> {
    if curve.x.is_empty() || curve.x.len() != curve.y.len() {
        return Err(MdExafsError::InvalidArgument(format!(
            "cannot plot {} x values against {} y values",
            curve.x.len(),
            curve.y.len()
        )));
    }
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| MdExafsError::write(parent, e))?;
        }
    }

    let svg = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("svg"))
        .unwrap_or(false);

    if svg {
        let root = SVGBackend::new(output, (WIDTH, HEIGHT)).into_drawing_area();
        draw_curve(&root, curve)?;
        root.present().map_err(plot_err)?;
    } else {
        let root = BitMapBackend::new(output, (WIDTH, HEIGHT)).into_drawing_area();
        draw_curve(&root, curve)?;
        root.present().map_err(plot_err)?;
    }
    Ok(())
}

/// 坐标范围，上下各留 5% 余量
fn y_range(y: &[f64]) -> (f64, f64) {
    let min = y.iter().copied().fold(f64::INFINITY, f64::min).min(0.0);
    let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(0.0);
    let pad = ((max - min) * 0.05).max(1e-12);
    (min - pad, max + pad)
}

fn draw_curve<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    curve: &Curve,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_err)?;

    let x_min = curve.x[0];
    let x_max = curve.x[curve.x.len() - 1].max(x_min + 1e-9);
    let (y_min, y_max) = y_range(curve.y);

    let mut chart = ChartBuilder::on(root)
        .caption(&curve.title, ("sans-serif", 26).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc(curve.x_desc)
        .y_desc(curve.y_desc)
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(plot_err)?;

    if let Some((lo, hi)) = curve.highlight {
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(lo, y_min), (hi, y_max)],
                RGBColor(255, 153, 0).mix(0.15).filled(),
            )))
            .map_err(plot_err)?;
    }

    // 零线
    chart
        .draw_series(LineSeries::new(
            vec![(x_min, 0.0), (x_max, 0.0)],
            BLACK.mix(0.4).stroke_width(1),
        ))
        .map_err(plot_err)?;

    let line_color = RGBColor(0, 102, 204);
    chart
        .draw_series(LineSeries::new(
            curve.x.iter().zip(curve.y).map(|(x, y)| (*x, *y)),
            line_color.stroke_width(2),
        ))
        .map_err(plot_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_y_range_includes_zero() {
        let (lo, hi) = y_range(&[1.0, 2.0, 3.0]);
        assert!(lo < 0.0 && hi > 3.0);
        let (lo, hi) = y_range(&[-0.2, 0.1]);
        assert!(lo < -0.2 && hi > 0.1);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let curve = Curve {
            x: &[0.0, 1.0],
            y: &[0.0],
            title: "bad".to_string(),
            x_desc: "x",
            y_desc: "y",
            highlight: None,
        };
        assert!(plot_curve(&curve, &tmp.path().join("bad.png")).is_err());
    }
}

//! # inspect-db 命令实现
//!
//! 列出路径数据库中的标签、数量与有效距离范围，以及每帧样本数。
//!
//! ## 依赖关系
//! - 使用 `cli/inspect.rs` 定义的参数
//! - 使用 `database/query.rs`, `tabled`

use crate::cli::inspect::InspectArgs;
use crate::database::query::DatabaseStats;
use crate::database::PathDatabase;
use crate::error::Result;
use crate::utils::output;

use tabled::{Table, Tabled};

#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "Path")]
    label: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "reff min (Å)")]
    reff_min: String,
    #[tabled(rename = "reff max (Å)")]
    reff_max: String,
}

/// 执行 inspect-db 命令
pub fn execute(args: InspectArgs) -> Result<()> {
    output::print_header("Path Database");

    let db = PathDatabase::open(&args.database)?;
    let stats = db.stats();

    output::print_field("file", args.database.display());
    output::print_field("built from", &stats.source_root);
    output::print_field("paths", stats.entries);
    output::print_field("distinct k-grids", stats.grids);
    output::print_field("frames", frame_summary(&stats));
    output::print_field("indexing failures", stats.failures);

    println!("\n{}\n", label_table(&stats));
    Ok(())
}

fn label_table(stats: &DatabaseStats) -> String {
    let rows: Vec<LabelRow> = stats
        .labels
        .iter()
        .map(|l| LabelRow {
            label: l.label.clone(),
            count: l.count,
            reff_min: format!("{:.4}", l.reff_min),
            reff_max: format!("{:.4}", l.reff_max),
        })
        .collect();
    Table::new(&rows).to_string()
}

/// 例如 "4 frames (0..60), 12 samples"
fn frame_summary(stats: &DatabaseStats) -> String {
    let samples: usize = stats.frames.values().sum();
    match (stats.frames.keys().next(), stats.frames.keys().next_back()) {
        (Some(first), Some(last)) => format!(
            "{} frames ({}..{}), {} samples",
            stats.frames.len(),
            first,
            last,
            samples
        ),
        _ => "none".to_string(),
    }
}

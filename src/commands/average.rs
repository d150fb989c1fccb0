//! # average 命令实现
//!
//! 多帧、多吸收原子、多路径的 χ(k) 平均。
//!
//! ## 流程
//! 1. 合并配置文件与命令行选项（命令行优先），校验路径标签与距离上限
//! 2. 按需构建 / 复用 / 重建路径数据库
//! 3. 从数据库或原始输出取路径并平均
//! 4. 写出 χ(k)、汇总报告，可选绘图
//!
//! ## 依赖关系
//! - 使用 `cli/average.rs` 定义的参数
//! - 使用 `averaging/`, `database/`, `utils/`

use crate::averaging::export::{describe_request, summary_path, write_chi, write_summary};
use crate::averaging::{
    average, AveragingMode, AveragingReport, AveragingRequest, DistanceBound, PathFilter, PathSelection,
    PathSource,
};
use crate::cli::average::AverageArgs;
use crate::config::{Config, FrameRange};
use crate::database::{build_database, BuildOutcome, PathDatabase};
use crate::error::{MdExafsError, Result};
use crate::utils::output;
use crate::utils::plot::{plot_curve, Curve};

use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// 未指定 `--database` 时数据库放在输入目录下
pub const DEFAULT_DATABASE_NAME: &str = "paths.mdxdb";

/// 数据库相关选项
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub build: bool,
    pub rebuild: bool,
    pub use_database: bool,
}

/// 合并后的平均设置
#[derive(Debug, Clone)]
pub struct AverageSettings {
    pub request: AveragingRequest,
    pub output: PathBuf,
    pub database: Option<DatabaseSettings>,
}

/// 执行 average 命令
pub fn execute(args: AverageArgs) -> Result<()> {
    output::print_header("Multipath chi(k) Averaging");

    let settings = resolve_settings(&args)?;
    let report = run_average(&settings)?;

    if let Some(plot) = &args.plot {
        let spectrum = &report.spectrum;
        let weighted: Vec<f64> = spectrum
            .k
            .iter()
            .zip(&spectrum.chi)
            .map(|(k, chi)| k.powi(args.kweight) * chi)
            .collect();
        let y_desc = format!("k^{} χ(k)", args.kweight);
        plot_curve(
            &Curve {
                x: &spectrum.k,
                y: &weighted,
                title: format!("Averaged EXAFS ({} samples)", spectrum.samples),
                x_desc: "k (Å⁻¹)",
                y_desc: &y_desc,
                highlight: None,
            },
            plot,
        )?;
        output::print_written("plot", plot);
    }
    Ok(())
}

fn parse_labels(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 标签之外的路径条件
#[derive(Debug, Default)]
struct PathCriteria {
    max_distance: Option<DistanceBound>,
    min_distance: Option<DistanceBound>,
    nleg: Option<usize>,
}

fn build_selection(labels: &[String], criteria: &PathCriteria) -> Result<PathSelection> {
    if labels.is_empty() {
        if criteria.max_distance.is_some() || criteria.min_distance.is_some() || criteria.nleg.is_some() {
            return Err(MdExafsError::InvalidArgument(
                "distance and nleg filters need path labels (--paths)".to_string(),
            ));
        }
        return Ok(PathSelection::Total);
    }
    let filter = PathFilter::new(labels, criteria.max_distance.as_ref())?
        .with_min_distance(criteria.min_distance.as_ref())?
        .with_nleg(criteria.nleg)?;
    Ok(PathSelection::Paths(filter))
}

/// 合并配置文件与命令行选项
pub fn resolve_settings(args: &AverageArgs) -> Result<AverageSettings> {
    let mut labels: Vec<String> = Vec::new();
    let mut criteria = PathCriteria::default();
    let mut num_processes = 0;
    let mut mode = AveragingMode::default();
    let mut database: Option<DatabaseSettings> = None;

    let (input_dir, mut frame_range, mut output) = match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            let averaging = config.averaging()?.clone();
            if let Some(multipath) = averaging.multipath {
                labels = multipath.paths;
                criteria = PathCriteria {
                    max_distance: multipath.max_distance,
                    min_distance: multipath.min_distance,
                    nleg: multipath.nleg,
                };
                num_processes = multipath.num_processes;
                mode = multipath.mode;
            }
            database = averaging.database.map(|db| DatabaseSettings {
                path: db.path,
                build: db.build,
                rebuild: db.rebuild,
                use_database: db.use_database,
            });
            (
                averaging.input_directory,
                averaging.frame_range,
                Some(averaging.output_file),
            )
        }
        None => {
            let missing = |flag: &str| {
                MdExafsError::InvalidArgument(format!("{} is required without --config", flag))
            };
            let input_dir = args.input_dir.clone().ok_or_else(|| missing("--input-dir"))?;
            let start = args.start.ok_or_else(|| missing("--start"))?;
            let end = args.end.ok_or_else(|| missing("--end"))?;
            let range = FrameRange::new(start, end, args.step.unwrap_or(1))?;
            (input_dir, range, None)
        }
    };

    // 命令行覆盖
    if let Some(step) = args.step {
        frame_range = FrameRange::new(frame_range.start, frame_range.end, step)?;
    }
    if let Some(path) = &args.output {
        output = Some(path.clone());
    }
    let output = output
        .ok_or_else(|| MdExafsError::InvalidArgument("--output is required without --config".to_string()))?;
    if let Some(text) = &args.paths {
        labels = parse_labels(text);
    }
    if let Some(text) = &args.max_distance {
        criteria.max_distance = Some(DistanceBound::parse(text)?);
    }
    if let Some(text) = &args.min_distance {
        criteria.min_distance = Some(DistanceBound::parse(text)?);
    }
    if let Some(nleg) = args.nleg {
        criteria.nleg = Some(nleg);
    }
    if let Some(n) = args.num_processes {
        num_processes = n;
    }
    if let Some(m) = args.mode {
        mode = m;
    }

    let wants_database = args.build_database || args.use_database || args.rebuild || args.database.is_some();
    if wants_database || database.is_some() {
        let mut db = database.unwrap_or_else(|| DatabaseSettings {
            path: input_dir.join(DEFAULT_DATABASE_NAME),
            build: false,
            rebuild: false,
            use_database: false,
        });
        if let Some(path) = &args.database {
            db.path = path.clone();
        }
        db.build |= args.build_database;
        db.rebuild |= args.rebuild;
        db.use_database |= args.use_database;
        // 重建隐含构建
        db.build |= db.rebuild;
        database = Some(db);
    }

    let selection = build_selection(&labels, &criteria)?;

    Ok(AverageSettings {
        request: AveragingRequest {
            input_dir,
            frame_range,
            selection,
            mode,
            num_processes,
        },
        output,
        database,
    })
}

#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "Path")]
    label: String,
    #[tabled(rename = "reff window (Å)")]
    window: String,
    #[tabled(rename = "Paths averaged")]
    count: usize,
}

/// 构建数据库（如需要）、平均并写出结果
pub fn run_average(settings: &AverageSettings) -> Result<AveragingReport> {
    let request = &settings.request;

    output::print_field("input", request.input_dir.display());
    output::print_field("frames", request.frame_range);
    match &request.selection {
        PathSelection::Total => output::print_field("paths", "all (total chi.dat)"),
        PathSelection::Paths(filter) => {
            let labels: Vec<&str> = filter.entries().iter().map(|(l, _)| l.as_str()).collect();
            output::print_field("paths", labels.join(", "));
            if let Some(nleg) = filter.nleg() {
                output::print_field("nleg", nleg);
            }
            output::print_field("mode", request.mode);
        }
    }

    let mut opened = None;
    if let Some(db) = &settings.database {
        if db.build {
            match build_database(&request.input_dir, &db.path, db.rebuild, request.num_processes)? {
                BuildOutcome::Built(report) => {
                    output::print_success(&format!(
                        "Built path database {}: {} samples, {} paths, {} totals",
                        db.path.display(),
                        report.samples,
                        report.entries,
                        report.totals
                    ));
                    if !report.failures.is_empty() {
                        output::print_warning(&format!(
                            "{} sample files could not be indexed",
                            report.failures.len()
                        ));
                    }
                }
                BuildOutcome::Reused => output::print_info(&format!(
                    "Reusing existing path database {} (pass --rebuild to regenerate)",
                    db.path.display()
                )),
            }
        }
        if db.use_database {
            let database = PathDatabase::open(&db.path)?;
            let source_root = Path::new(database.source_root());
            if source_root != request.input_dir.as_path() {
                output::print_warning(&format!(
                    "Database was built from {}, not {}",
                    source_root.display(),
                    request.input_dir.display()
                ));
            }
            opened = Some(database);
        }
    }

    let source = match &opened {
        Some(db) => PathSource::Database(db),
        None => PathSource::Raw,
    };
    output::print_field("source", source.describe());
    println!();

    let report = average(request, source)?;
    let header = describe_request(request, &source.describe());

    write_chi(&report.spectrum, &header, &settings.output)?;
    output::print_written("averaged chi(k)", &settings.output);
    let summary = summary_path(&settings.output);
    write_summary(&report, &header, &summary)?;
    output::print_written("summary", &summary);

    if let PathSelection::Paths(filter) = &request.selection {
        let rows: Vec<LabelRow> = filter
            .entries()
            .iter()
            .map(|(label, window)| LabelRow {
                label: label.clone(),
                window: match (window.min, window.max) {
                    (None, None) => "-".to_string(),
                    _ => window.to_string(),
                },
                count: report.label_counts.get(label).copied().unwrap_or(0),
            })
            .collect();
        println!("\n{}\n", Table::new(&rows));
    }

    if !report.failures.is_empty() {
        output::print_warning(&format!(
            "{} of {} samples skipped (see {})",
            report.failures.len(),
            report.candidates,
            summary.display()
        ));
    }
    output::print_done(&format!(
        "Averaged {} paths from {} samples",
        report.spectrum.paths, report.spectrum.samples
    ));
    Ok(report)
}

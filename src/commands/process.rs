//! # process 命令实现
//!
//! 轨迹 → 每个 (帧, 中心原子) 一份 `feff.inp`。
//!
//! ## 流程
//! 1. 按帧范围逐帧读取轨迹
//! 2. 确定晶格：配置给出的静态晶胞、逐帧晶胞，或（静态模式未给向量时）首帧晶胞
//! 3. 在吸收原子中等间隔选取 `samples_per_frame` 个中心
//! 4. 并行提取近邻壳层并写出输入文件
//!
//! ## 依赖关系
//! - 使用 `cli/process.rs` 定义的参数
//! - 使用 `geometry/`, `parsers/feff_inp.rs`, `parsers/lammps_dump.rs`, `batch/layout.rs`

use crate::batch::layout::sample_dir;
use crate::cli::process::ProcessArgs;
use crate::config::{Config, ExtractionConfig};
use crate::error::{MdExafsError, Result};
use crate::geometry::neighbors::FrameNeighbors;
use crate::geometry::pbc::LatticeMode;
use crate::models::frame::Trajectory;
use crate::models::path::{normalize_element, SampleId};
use crate::parsers::feff_inp::{load_header_template, to_feff_inp_string, write_feff_input};
use crate::parsers::open_trajectory;
use crate::utils::{output, progress};

use rayon::prelude::*;

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProcessSummary {
    pub frames: usize,
    pub decks: usize,
    /// 没有吸收原子的帧
    pub empty_frames: Vec<usize>,
}

/// 执行 process 命令
pub fn execute(args: ProcessArgs) -> Result<()> {
    output::print_header("Trajectory → FEFF Inputs");

    let config = Config::load(&args.config)?;
    let trajectory_config = config.trajectory()?;
    let mut extraction = config.extraction()?.clone();
    if let Some(dir) = args.output_dir {
        extraction.output_directory = dir;
    }
    let lattice_mode = config.lattice_mode()?;
    let header_path = config.solver.as_ref().and_then(|s| s.header_template.as_deref());
    let header = load_header_template(header_path)?;

    let spinner = progress::create_spinner(&format!(
        "Indexing {}",
        trajectory_config.path.display()
    ));
    let trajectory = open_trajectory(trajectory_config, &config.atom_types);
    spinner.finish_and_clear();
    let trajectory = trajectory?;

    output::print_field("trajectory", trajectory_config.path.display());
    let count = trajectory.frame_count();
    output::print_field(
        "frames in file",
        format!(
            "{} (frame ids {}..={})",
            count,
            trajectory.frame_id(0),
            trajectory.frame_id(count.saturating_sub(1))
        ),
    );
    output::print_field("frame range", extraction.frame_range);
    output::print_field("absorber", &extraction.absorber);
    output::print_field("cutoff", format!("{:.3} Å", extraction.cutoff));
    output::print_field(
        "lattice",
        match &lattice_mode {
            Some(LatticeMode::Dynamic) => "per-frame".to_string(),
            Some(LatticeMode::Static(lattice_box)) => {
                let (a, b, c, alpha, beta, gamma) = lattice_box.lattice().parameters();
                format!(
                    "static {:.3} {:.3} {:.3} Å, {:.1} {:.1} {:.1}°",
                    a, b, c, alpha, beta, gamma
                )
            }
            None => "static (first frame)".to_string(),
        },
    );
    println!();

    let summary = process_trajectory(trajectory.as_ref(), lattice_mode, &extraction, &header)?;

    for frame in &summary.empty_frames {
        output::print_warning(&format!(
            "Frame {} has no '{}' atoms",
            frame, extraction.absorber
        ));
    }
    if summary.frames == 0 {
        return Err(MdExafsError::InvalidConfig(format!(
            "extraction.frame_range {} selects no frames (frame ids {}..={})",
            extraction.frame_range,
            trajectory.frame_id(0),
            trajectory.frame_id(count.saturating_sub(1))
        )));
    }

    output::print_done(&format!(
        "Wrote {} input decks for {} frames under {}",
        summary.decks,
        summary.frames,
        extraction.output_directory.display()
    ));
    Ok(())
}

/// 在 n 个吸收原子中等间隔选取 k 个
pub fn select_centers(absorbers: &[usize], samples: Option<usize>) -> Vec<usize> {
    let n = absorbers.len();
    match samples {
        Some(k) if k < n => (0..k).map(|i| absorbers[i * n / k]).collect(),
        _ => absorbers.to_vec(),
    }
}

/// 确定整次运行的晶格模式
///
/// 静态模式未配置向量时，整条轨迹使用所选首帧的晶胞；没有选中任何帧时返回 `None`。
pub fn resolve_lattice_mode(
    configured: Option<LatticeMode>,
    trajectory: &dyn Trajectory,
    frames: &[usize],
) -> Result<Option<LatticeMode>> {
    match (configured, frames.first()) {
        (Some(mode), _) => Ok(Some(mode)),
        (None, Some(&first)) => {
            let frame = trajectory.frame(first)?;
            let lattice_box = frame
                .lattice
                .ok_or(MdExafsError::MissingLattice { frame: frame.index })?;
            Ok(Some(LatticeMode::Static(lattice_box)))
        }
        (None, None) => Ok(None),
    }
}

/// 处理整条轨迹
pub fn process_trajectory(
    trajectory: &dyn Trajectory,
    lattice_mode: Option<LatticeMode>,
    extraction: &ExtractionConfig,
    header: &str,
) -> Result<ProcessSummary> {
    extraction.validate()?;
    let absorber = normalize_element(&extraction.absorber);
    let frames = trajectory.select(&extraction.frame_range);

    let mut summary = ProcessSummary::default();

    let Some(mode) = resolve_lattice_mode(lattice_mode, trajectory, &frames)? else {
        return Ok(summary);
    };

    let pb = progress::create_progress_bar(frames.len() as u64, "Extracting shells");

    for position in frames {
        let frame = trajectory.frame(position)?;
        let lattice_box = mode.resolve(&frame)?;
        let finder = FrameNeighbors::new(
            &frame,
            lattice_box,
            extraction.cutoff,
            extraction.neighbor_method,
        )?;

        let centers = select_centers(&frame.indices_of(&absorber), extraction.samples_per_frame);
        if centers.is_empty() {
            summary.empty_frames.push(frame.index);
        }

        let written: usize = centers
            .par_iter()
            .map(|&center| -> Result<usize> {
                let shell = finder.shell(center)?;
                let deck = to_feff_inp_string(&shell, header)?;
                let dir = sample_dir(&extraction.output_directory, SampleId::new(frame.index, center));
                write_feff_input(&dir, &deck)?;
                Ok(1)
            })
            .collect::<Result<Vec<usize>>>()?
            .into_iter()
            .sum();

        summary.frames += 1;
        summary.decks += written;
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(summary)
}

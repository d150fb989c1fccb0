//! # rdf 命令实现
//!
//! 中心元素与近邻元素之间的 g(r)，以及峰窗口内的第一壳层分析
//! （直接统计与高斯拟合）。
//!
//! ## 依赖关系
//! - 使用 `cli/rdf.rs` 定义的参数
//! - 使用 `rdf/`, `geometry/`, `parsers/lammps_dump.rs`

use crate::cli::rdf::RdfArgs;
use crate::commands::process::resolve_lattice_mode;
use crate::config::{Config, RdfConfig};
use crate::error::{MdExafsError, Result};
use crate::geometry::pbc::LatticeMode;
use crate::models::frame::Trajectory;
use crate::parsers::open_trajectory;
use crate::rdf::export::{peak_table, report_path, to_csv, write_report};
use crate::rdf::{fit_gaussian, RdfAccumulator};
use crate::utils::plot::{plot_curve, Curve};
use crate::utils::{output, progress};

/// 执行 rdf 命令
pub fn execute(args: RdfArgs) -> Result<()> {
    output::print_header("Radial Distribution Function");

    let config = Config::load(&args.config)?;
    let trajectory_config = config.trajectory()?;
    let rdf_config = config.rdf()?;
    let trajectory = open_trajectory(trajectory_config, &config.atom_types)?;

    output::print_field("pair", format!("{}-{}", rdf_config.center, rdf_config.neighbor));
    output::print_field("frames", rdf_config.frame_range);
    output::print_field(
        "bins",
        format!("{} over (0, {:.3}] Å", rdf_config.bins, rdf_config.cutoff),
    );
    println!();

    let rdf = accumulate(trajectory.as_ref(), config.lattice_mode()?, rdf_config)?;
    if rdf.centers() == 0 {
        return Err(MdExafsError::InvalidConfig(format!(
            "no '{}' atoms found in the selected frames",
            rdf_config.center
        )));
    }

    let curve = rdf.curve();
    let window = (rdf_config.peak_window[0], rdf_config.peak_window[1]);
    let shell = rdf.shell_analysis();
    let fit = fit_gaussian(&curve, window, rdf.centers());
    if fit.is_none() {
        output::print_warning("Gaussian fit failed: peak window holds too few populated bins");
    }

    to_csv(&curve, &rdf_config.output)?;
    output::print_written("g(r)", &rdf_config.output);

    let table = peak_table(shell.as_ref(), fit.as_ref());
    let header = vec![
        format!("pair: {}-{}", rdf_config.center, rdf_config.neighbor),
        format!("frames: {} ({} used)", rdf_config.frame_range, rdf.frames()),
        format!("centers: {}", rdf.centers()),
        format!("peak window: [{:.3}, {:.3}] Å", window.0, window.1),
    ];
    let report = report_path(&rdf_config.output);
    write_report(&header, &table, &report)?;
    output::print_written("report", &report);

    println!("\n{}\n", table);

    if let Some(plot) = &args.plot {
        plot_curve(
            &Curve {
                x: &curve.r,
                y: &curve.g,
                title: format!("g(r) {}-{}", rdf_config.center, rdf_config.neighbor),
                x_desc: "r (Å)",
                y_desc: "g(r)",
                highlight: Some(window),
            },
            plot,
        )?;
        output::print_written("plot", plot);
    }

    output::print_done(&format!("RDF accumulated over {} frames", rdf.frames()));
    Ok(())
}

/// 按配置累加所选帧
pub fn accumulate(
    trajectory: &dyn Trajectory,
    lattice_mode: Option<LatticeMode>,
    config: &RdfConfig,
) -> Result<RdfAccumulator> {
    config.validate()?;
    let frames = trajectory.select(&config.frame_range);
    let mut rdf = RdfAccumulator::new(&config.center, &config.neighbor, config.cutoff, config.bins)?
        .with_window(config.peak_window[0], config.peak_window[1]);

    let Some(mode) = resolve_lattice_mode(lattice_mode, trajectory, &frames)? else {
        return Ok(rdf);
    };

    let pb = progress::create_progress_bar(frames.len() as u64, "Accumulating g(r)");
    for position in frames {
        let frame = trajectory.frame(position)?;
        rdf.add_frame(&frame, mode.resolve(&frame)?, config.neighbor_method)?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(rdf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameRange;
    use crate::geometry::neighbors::tests::fcc_frame;
    use crate::geometry::neighbors::NeighborMethod;
    use crate::models::frame::InMemoryTrajectory;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn config() -> RdfConfig {
        RdfConfig {
            center: "Au".to_string(),
            neighbor: "Au".to_string(),
            cutoff: 6.0,
            bins: 300,
            frame_range: FrameRange::new(0, 4, 1).unwrap(),
            peak_window: [2.6, 3.2],
            output: PathBuf::from("rdf.csv"),
            neighbor_method: NeighborMethod::Auto,
        }
    }

    #[test]
    fn test_fcc_gold_coordination() {
        let a = 4.08;
        let (frame, lattice_box) = fcc_frame(a, 3, "Au");
        let frame = frame.with_lattice(lattice_box);
        let frames = (0..3)
            .map(|i| {
                let mut f = frame.clone();
                f.index = i;
                f
            })
            .collect();
        let trajectory = InMemoryTrajectory::new(frames);

        let rdf = accumulate(&trajectory, None, &config()).unwrap();
        assert_eq!(rdf.frames(), 3);

        let shell = rdf.shell_analysis().unwrap();
        assert_relative_eq!(shell.coordination, 12.0);
        assert_relative_eq!(shell.mean_distance, a / 2f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_no_frames_selected() {
        let (frame, _) = fcc_frame(4.08, 3, "Au");
        let trajectory = InMemoryTrajectory::new(vec![frame]);
        let mut cfg = config();
        cfg.frame_range = FrameRange::new(5, 10, 1).unwrap();

        let rdf = accumulate(&trajectory, None, &cfg).unwrap();
        assert_eq!(rdf.frames(), 0);
        assert_eq!(rdf.centers(), 0);
    }
}

//! # 多路径平均引擎
//!
//! 按请求从原始结果目录或路径数据库取得散射路径，筛选后求平均 χ(k)。
//!
//! ## 算法
//! 1. 解析候选样本（目录扫描或数据库索引），按 (frame, atom) 排序
//! 2. 在 rayon 线程池中逐样本计算部分和（样本内按路径编号累加）
//! 3. 按样本顺序串行合并部分和
//!
//! 两种数据来源对同一样本产生相同的输入序列和相同的合并顺序，
//! 因此结果逐位一致。
//!
//! ## 平均方式
//! - `Weighted`: Σ deg·χ / Σ deg
//! - `PerAtomSum`: 样本内 Σχ，样本间等权平均
//! - `Total`（不分解路径）: 每个样本的 chi.dat 等权平均
//!
//! ## 依赖关系
//! - 被 `commands/average.rs` 调用
//! - 使用 `averaging/filter.rs`, `averaging/accumulator.rs`, `database/query.rs`,
//!   `parsers/feff_out.rs`, `batch/layout.rs`

use crate::averaging::accumulator::ChiAccumulator;
use crate::averaging::filter::{AveragingMode, PathFilter, PathSelection};
use crate::batch::layout::discover_samples;
use crate::config::FrameRange;
use crate::database::format::FailedPart;
use crate::database::query::PathDatabase;
use crate::error::{MdExafsError, Result};
use crate::models::path::{ChiData, SampleId, ScatteringPath};
use crate::parsers::feff_out::{read_sample_paths, read_sample_total, PATHS_FILE, TOTAL_CHI_FILE};
use crate::utils::progress;

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 平均请求
#[derive(Debug, Clone)]
pub struct AveragingRequest {
    pub input_dir: PathBuf,
    pub frame_range: FrameRange,
    pub selection: PathSelection,
    pub mode: AveragingMode,
    /// 并行线程数，0 = 全部 CPU
    pub num_processes: usize,
}

/// 散射路径来源
#[derive(Clone, Copy)]
pub enum PathSource<'a> {
    /// 逐样本解析原始求解器输出
    Raw,
    Database(&'a PathDatabase),
}

impl PathSource<'_> {
    pub fn describe(&self) -> String {
        match self {
            PathSource::Raw => "raw solver outputs".to_string(),
            PathSource::Database(db) => format!("path database {}", db.path().display()),
        }
    }
}

/// 平均谱
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedSpectrum {
    pub k: Vec<f64>,
    pub chi: Vec<f64>,
    /// 有贡献的样本数
    pub samples: usize,
    /// 有贡献的路径数（`Total` 模式下等于样本数）
    pub paths: usize,
    pub total_weight: f64,
}

/// 平均结果及统计
#[derive(Debug, Clone)]
pub struct AveragingReport {
    pub spectrum: AveragedSpectrum,
    /// 标签 → 参与平均的路径数
    pub label_counts: BTreeMap<String, usize>,
    /// 候选样本数（含失败）
    pub candidates: usize,
    /// 被跳过的样本及原因
    pub failures: Vec<(SampleId, String)>,
}

/// 单个样本的部分和
#[derive(Debug, Default)]
struct SamplePartial {
    acc: ChiAccumulator,
    paths: usize,
    label_counts: BTreeMap<String, usize>,
}

/// 执行平均
pub fn average(request: &AveragingRequest, source: PathSource<'_>) -> Result<AveragingReport> {
    let jobs = if request.num_processes == 0 {
        num_cpus::get()
    } else {
        request.num_processes
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| MdExafsError::Other(format!("Failed to start worker pool: {}", e)))?;

    let (candidates, results, mut failures) = pool.install(|| match source {
        PathSource::Raw => collect_raw(request),
        PathSource::Database(db) => collect_database(request, db),
    })?;

    let mut total = ChiAccumulator::new();
    let mut paths = 0;
    let mut samples = 0;
    let mut label_counts: BTreeMap<String, usize> = BTreeMap::new();

    for (id, result) in results {
        match result {
            Ok(partial) => {
                if partial.acc.is_empty() {
                    continue;
                }
                total.merge(partial.acc, &id.to_string())?;
                paths += partial.paths;
                samples += 1;
                for (label, n) in partial.label_counts {
                    *label_counts.entry(label).or_default() += n;
                }
            }
            // 网格不一致对整个平均是致命的，不论出现在样本内还是样本间
            Err(e @ MdExafsError::KGridMismatch { .. }) => return Err(e),
            Err(e) => failures.push((id, e.to_string())),
        }
    }
    failures.sort_by_key(|(id, _)| *id);

    let mean = total.mean().ok_or_else(|| match request.selection {
        PathSelection::Total => MdExafsError::NoInputFiles {
            path: request.input_dir.display().to_string(),
        },
        PathSelection::Paths(_) => MdExafsError::NoMatchingPaths,
    })?;

    Ok(AveragingReport {
        spectrum: AveragedSpectrum {
            k: mean.k,
            chi: mean.chi,
            samples,
            paths,
            total_weight: total.total_weight(),
        },
        label_counts,
        candidates,
        failures,
    })
}

type Collected = (
    usize,
    Vec<(SampleId, Result<SamplePartial>)>,
    Vec<(SampleId, String)>,
);

fn collect_raw(request: &AveragingRequest) -> Result<Collected> {
    let marker = match request.selection {
        PathSelection::Total => TOTAL_CHI_FILE,
        PathSelection::Paths(_) => PATHS_FILE,
    };
    let samples = discover_samples(&request.input_dir, Some(&request.frame_range), &[marker])?;
    if samples.is_empty() {
        return Err(MdExafsError::NoInputFiles {
            path: request.input_dir.display().to_string(),
        });
    }

    let pb = progress::create_progress_bar(samples.len() as u64, "Averaging samples");
    let results = samples
        .par_iter()
        .map(|(id, dir)| {
            let partial = match &request.selection {
                PathSelection::Total => read_sample_total(dir).and_then(|chi| total_partial(*id, &chi)),
                PathSelection::Paths(filter) => read_sample_paths(dir, *id)
                    .and_then(|paths| path_partial(&paths, filter, request.mode)),
            };
            pb.inc(1);
            (*id, partial)
        })
        .collect();
    pb.finish_and_clear();

    Ok((samples.len(), results, Vec::new()))
}

fn collect_database(request: &AveragingRequest, db: &PathDatabase) -> Result<Collected> {
    let range = &request.frame_range;

    match &request.selection {
        PathSelection::Total => {
            let totals = db.totals(range);
            let failures = db.failures(range, FailedPart::Total);
            if totals.is_empty() && failures.is_empty() {
                return Err(MdExafsError::NoInputFiles {
                    path: db.path().display().to_string(),
                });
            }

            let results = totals
                .par_iter()
                .map_init(
                    || db.reader(),
                    |reader, (id, block)| {
                        let partial = match reader {
                            Ok(reader) => reader
                                .read_chi(block)
                                .and_then(|chi| total_partial(*id, &chi)),
                            Err(e) => Err(MdExafsError::Other(e.to_string())),
                        };
                        (*id, partial)
                    },
                )
                .collect();

            Ok((totals.len() + failures.len(), results, failures))
        }
        PathSelection::Paths(filter) => {
            let candidates = db.samples_with_paths(range).len();
            let failures = db.failures(range, FailedPart::Paths);
            if candidates == 0 && failures.is_empty() {
                return Err(MdExafsError::NoInputFiles {
                    path: db.path().display().to_string(),
                });
            }

            let hits: Vec<_> = db.lookup(filter, range).into_iter().collect();
            let results = hits
                .par_iter()
                .map_init(
                    || db.reader(),
                    |reader, (id, entries)| {
                        let partial = match reader {
                            Ok(reader) => entries
                                .iter()
                                .map(|(label, entry)| reader.load_path(*id, label, entry))
                                .collect::<Result<Vec<ScatteringPath>>>()
                                .and_then(|paths| path_partial(&paths, filter, request.mode)),
                            Err(e) => Err(MdExafsError::Other(e.to_string())),
                        };
                        (*id, partial)
                    },
                )
                .collect();

            Ok((candidates + failures.len(), results, failures))
        }
    }
}

/// 样本总 χ(k)，权重 1
fn total_partial(id: SampleId, chi: &ChiData) -> Result<SamplePartial> {
    let mut partial = SamplePartial::default();
    partial.acc.add(chi, 1.0, &id.to_string())?;
    partial.paths = 1;
    Ok(partial)
}

/// 样本内按路径编号累加被选中的路径
fn path_partial(
    paths: &[ScatteringPath],
    filter: &PathFilter,
    mode: AveragingMode,
) -> Result<SamplePartial> {
    let mut partial = SamplePartial::default();
    let mut within = ChiAccumulator::new();

    for path in paths.iter().filter(|p| filter.accepts(&p.label, p.nleg, p.reff)) {
        let source = format!("{} path {}", path.sample, path.index);
        match mode {
            AveragingMode::Weighted => partial.acc.add(&path.chi, path.degeneracy, &source)?,
            AveragingMode::PerAtomSum => within.add(&path.chi, 1.0, &source)?,
        }
        partial.paths += 1;
        *partial.label_counts.entry(path.label.clone()).or_default() += 1;
    }

    if mode == AveragingMode::PerAtomSum && !within.is_empty() {
        partial.acc.add(&within.sum(), 1.0, "per-atom sum")?;
    }
    Ok(partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::averaging::filter::DistanceBound;
    use crate::batch::layout::sample_dir;
    use crate::database::builder::build_database;
    use crate::parsers::feff_out::chip_file_name;
    use crate::parsers::feff_out::tests::{chi_text, write_fake_sample};
    use approx::assert_relative_eq;
    use std::fs;
    use std::path::Path;

    fn fake_run(root: &Path) -> PathBuf {
        let raw = root.join("raw");
        for frame in [0, 20, 40, 60] {
            for atom in [2, 5, 11] {
                write_fake_sample(&raw, SampleId::new(frame, atom));
            }
        }
        raw
    }

    fn request(raw: &Path, selection: PathSelection, mode: AveragingMode) -> AveragingRequest {
        AveragingRequest {
            input_dir: raw.to_path_buf(),
            frame_range: FrameRange::new(0, 61, 20).unwrap(),
            selection,
            mode,
            num_processes: 3,
        }
    }

    fn paths(labels: &[&str], max: Option<DistanceBound>) -> PathSelection {
        let labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        PathSelection::Paths(PathFilter::new(&labels, max.as_ref()).unwrap())
    }

    /// 带距离下限与腿数的选择
    fn narrowed(labels: &[&str], min: f64, nleg: usize) -> PathSelection {
        let labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        let filter = PathFilter::new(&labels, None)
            .unwrap()
            .with_min_distance(Some(&DistanceBound::Scalar(min)))
            .unwrap()
            .with_nleg(Some(nleg))
            .unwrap();
        PathSelection::Paths(filter)
    }

    #[test]
    fn test_min_distance_and_nleg_narrow_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let req = request(&raw, narrowed(&["U-O", "U-O-O", "U-U"], 3.0, 2), AveragingMode::Weighted);
        let report = average(&req, PathSource::Raw).unwrap();

        // 只剩 U-U（nleg 2, reff 3.87）
        assert_eq!(report.spectrum.paths, 12);
        assert_eq!(report.label_counts.keys().collect::<Vec<_>>(), vec!["U-U"]);
        assert_relative_eq!(report.spectrum.total_weight, 12.0 * 12.0);
    }

    #[test]
    fn test_database_matches_raw_exactly() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let db_path = tmp.path().join("paths.db");
        build_database(&raw, &db_path, false, 2).unwrap();
        let db = PathDatabase::open(&db_path).unwrap();

        let selections = [
            paths(&["U-O", "U-O-O"], Some(DistanceBound::PerLabel(vec![2.5, 4.0]))),
            paths(&["U-O", "U-U"], None),
            narrowed(&["U-O", "U-O-O", "U-U"], 3.0, 2),
            PathSelection::Total,
        ];
        for selection in selections {
            for mode in [AveragingMode::Weighted, AveragingMode::PerAtomSum] {
                let req = request(&raw, selection.clone(), mode);
                let from_raw = average(&req, PathSource::Raw).unwrap();
                let from_db = average(&req, PathSource::Database(&db)).unwrap();
                assert_eq!(from_raw.spectrum, from_db.spectrum);
                assert_eq!(from_raw.label_counts, from_db.label_counts);
            }
        }
    }

    #[test]
    fn test_weighted_average_honors_degeneracy() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let req = request(&raw, paths(&["U-O", "U-U"], None), AveragingMode::Weighted);
        let report = average(&req, PathSource::Raw).unwrap();

        assert_eq!(report.spectrum.samples, 12);
        assert_eq!(report.spectrum.paths, 24);
        assert_relative_eq!(report.spectrum.total_weight, 12.0 * (8.0 + 12.0));
        assert_eq!(report.label_counts.get("U-O"), Some(&12));
        assert_eq!(report.label_counts.get("U-O-O"), None);

        // 逐样本手算
        let mut expected = vec![0.0; report.spectrum.k.len()];
        for frame in [0, 20, 40, 60] {
            for atom in [2, 5, 11] {
                let id = SampleId::new(frame, atom);
                let list = read_sample_paths(&sample_dir(&raw, id), id).unwrap();
                for p in list.iter().filter(|p| p.label != "U-O-O") {
                    for (e, c) in expected.iter_mut().zip(&p.chi.chi) {
                        *e += p.degeneracy * c;
                    }
                }
            }
        }
        for (got, e) in report.spectrum.chi.iter().zip(&expected) {
            assert_relative_eq!(*got, e / 240.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_per_atom_sum_is_equal_weight_over_samples() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let req = request(&raw, paths(&["U-O", "U-O-O", "U-U"], None), AveragingMode::PerAtomSum);
        let summed = average(&req, PathSource::Raw).unwrap();
        assert_relative_eq!(summed.spectrum.total_weight, 12.0);

        // 全部路径求和后等于 chi.dat 的等权平均（合成数据中 chi.dat 就是路径之和）
        let totals = average(
            &request(&raw, PathSelection::Total, AveragingMode::Weighted),
            PathSource::Raw,
        )
        .unwrap();
        for (a, b) in summed.spectrum.chi.iter().zip(&totals.spectrum.chi) {
            assert_relative_eq!(*a, *b, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_frame_range_selects_samples() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let mut req = request(&raw, PathSelection::Total, AveragingMode::Weighted);
        req.frame_range = FrameRange::new(20, 60, 20).unwrap();

        let report = average(&req, PathSource::Raw).unwrap();
        assert_eq!(report.spectrum.samples, 6);
        assert_eq!(report.candidates, 6);
    }

    #[test]
    fn test_broken_samples_are_reported_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let bad = sample_dir(&raw, SampleId::new(20, 5));
        fs::write(bad.join(PATHS_FILE), "not a path list\n").unwrap();

        let req = request(&raw, paths(&["U-O"], None), AveragingMode::Weighted);
        let report = average(&req, PathSource::Raw).unwrap();
        assert_eq!(report.spectrum.samples, 11);
        assert_eq!(report.candidates, 12);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, SampleId::new(20, 5));
    }

    #[test]
    fn test_no_matching_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let req = request(&raw, paths(&["U-O"], Some(DistanceBound::Scalar(1.0))), AveragingMode::Weighted);
        assert!(matches!(
            average(&req, PathSource::Raw),
            Err(MdExafsError::NoMatchingPaths)
        ));
    }

    #[test]
    fn test_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let req = request(tmp.path(), PathSelection::Total, AveragingMode::Weighted);
        assert!(matches!(
            average(&req, PathSource::Raw),
            Err(MdExafsError::NoInputFiles { .. })
        ));
    }

    #[test]
    fn test_mismatched_grid_within_sample_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let odd = sample_dir(&raw, SampleId::new(0, 5));
        fs::write(
            odd.join(chip_file_name(3)),
            chi_text(&[(0.0, 0.1), (0.05, 0.2)]),
        )
        .unwrap();

        for mode in [AveragingMode::Weighted, AveragingMode::PerAtomSum] {
            let req = request(&raw, paths(&["U-O", "U-U"], None), mode);
            assert!(matches!(
                average(&req, PathSource::Raw),
                Err(MdExafsError::KGridMismatch { .. })
            ));
        }

        // 不涉及该路径的请求不受影响
        let req = request(&raw, paths(&["U-O"], None), AveragingMode::Weighted);
        assert_eq!(average(&req, PathSource::Raw).unwrap().spectrum.samples, 12);
    }

    #[test]
    fn test_mismatched_grids_are_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = fake_run(tmp.path());
        let odd = sample_dir(&raw, SampleId::new(40, 2));
        fs::write(odd.join(TOTAL_CHI_FILE), "0.0 0.1\n0.1 0.2\n").unwrap();

        let req = request(&raw, PathSelection::Total, AveragingMode::Weighted);
        assert!(matches!(
            average(&req, PathSource::Raw),
            Err(MdExafsError::KGridMismatch { .. })
        ));
    }
}

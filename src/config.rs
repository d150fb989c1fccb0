//! # 配置文件
//!
//! 使用 `serde` + `toml` 读取层级化配置。各节在解析时都是可选的，
//! 每个命令只要求自己需要的节，缺失时报告 `MissingConfigSection`。
//!
//! ## 示例
//! ```toml
//! [trajectory]
//! path = "dump.lammpstrj"
//!
//! [lattice]
//! dynamic = false
//! vectors = [[10.94, 0.0, 0.0], [0.0, 10.94, 0.0], [0.0, 0.0, 10.94]]
//! pbc = [true, true, true]
//!
//! [atom_types]
//! 1 = "U"
//! 2 = "O"
//!
//! [extraction]
//! absorber = "U"
//! frame_range = [0, 1, 1]
//! cutoff = 5.0
//! samples_per_frame = 10
//! output_directory = "feff_inputs"
//!
//! [averaging]
//! input_directory = "feff_inputs"
//! frame_range = [0, 1]
//! output_file = "chi_avg.dat"
//!
//! [averaging.multipath]
//! paths = ["U-O", "U-O-O"]
//! max_distance = [2.5, 4.0]
//! ```
//!
//! 相对路径以配置文件所在目录为基准。
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `geometry/pbc.rs`, `averaging/filter.rs`

use crate::averaging::filter::{AveragingMode, DistanceBound};
use crate::error::{MdExafsError, Result};
use crate::geometry::neighbors::NeighborMethod;
use crate::geometry::pbc::{LatticeBox, LatticeMode};
use crate::models::structure::Lattice;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────
// 帧范围
// ─────────────────────────────────────────────────────────────

/// 半开区间 [start, end)，步长 step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<usize>")]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl FrameRange {
    pub fn new(start: usize, end: usize, step: usize) -> Result<Self> {
        if step == 0 {
            return Err(MdExafsError::InvalidRange(format!(
                "[{}, {}, {}]: step must be at least 1",
                start, end, step
            )));
        }
        if end <= start {
            return Err(MdExafsError::InvalidRange(format!(
                "[{}, {}, {}]: end must be greater than start",
                start, end, step
            )));
        }
        Ok(FrameRange { start, end, step })
    }

    /// 帧号是否在范围内
    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start && frame < self.end && (frame - self.start) % self.step == 0
    }
}

impl TryFrom<Vec<usize>> for FrameRange {
    type Error = String;

    fn try_from(values: Vec<usize>) -> std::result::Result<Self, Self::Error> {
        let (start, end, step) = match values.as_slice() {
            [start, end] => (*start, *end, 1),
            [start, end, step] => (*start, *end, *step),
            _ => {
                return Err(format!(
                    "frame_range must be [start, end] or [start, end, step], got {} values",
                    values.len()
                ))
            }
        };
        FrameRange::new(start, end, step).map_err(|e| e.to_string())
    }
}

impl std::fmt::Display for FrameRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}) step {}", self.start, self.end, self.step)
    }
}

// ─────────────────────────────────────────────────────────────
// 配置节
// ─────────────────────────────────────────────────────────────

/// 轨迹文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrajectoryFormat {
    #[default]
    LammpsDump,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrajectoryConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: TrajectoryFormat,
}

fn all_periodic() -> [bool; 3] {
    [true; 3]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatticeConfig {
    /// 逐帧读取晶胞
    #[serde(default)]
    pub dynamic: bool,

    /// 静态晶胞向量（行向量 a, b, c）
    pub vectors: Option<[[f64; 3]; 3]>,

    /// 静态晶胞参数 `[a, b, c, alpha, beta, gamma]`，未给出向量时使用
    pub parameters: Option<[f64; 6]>,

    #[serde(default = "all_periodic")]
    pub pbc: [bool; 3],
}

impl LatticeConfig {
    /// 解析晶格模式；静态模式未给出向量时返回 `None`，由首帧晶胞补齐
    pub fn mode(&self) -> Result<Option<LatticeMode>> {
        if self.dynamic {
            return Ok(Some(LatticeMode::Dynamic));
        }
        let lattice = match (self.vectors, self.parameters) {
            (Some(_), Some(_)) => {
                return Err(MdExafsError::InvalidConfig(
                    "lattice.vectors and lattice.parameters are mutually exclusive".to_string(),
                ))
            }
            (Some(vectors), None) => Lattice::from_vectors(vectors),
            (None, Some([a, b, c, alpha, beta, gamma])) => {
                Lattice::from_parameters(a, b, c, alpha, beta, gamma)
            }
            (None, None) => return Ok(None),
        };
        Ok(Some(LatticeMode::Static(LatticeBox::new(lattice, self.pbc)?)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// 吸收原子元素
    pub absorber: String,
    pub frame_range: FrameRange,
    pub cutoff: f64,
    /// 每帧采样的中心原子数；缺省为全部吸收原子
    pub samples_per_frame: Option<usize>,
    pub output_directory: PathBuf,
    #[serde(default)]
    pub neighbor_method: NeighborMethod,
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.absorber.trim().is_empty() {
            return Err(MdExafsError::InvalidConfig(
                "extraction.absorber must not be empty".to_string(),
            ));
        }
        validate_cutoff("extraction.cutoff", self.cutoff)?;
        if self.samples_per_frame == Some(0) {
            return Err(MdExafsError::InvalidConfig(
                "extraction.samples_per_frame must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[solver]`：命令行未给出时 run 使用的缺省值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolverConfig {
    pub executable: Option<PathBuf>,
    /// FEFF 输入头模板
    pub header_template: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub workers: Option<usize>,
    /// 传给求解器的额外参数
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultipathConfig {
    pub paths: Vec<String>,
    pub max_distance: Option<DistanceBound>,
    pub min_distance: Option<DistanceBound>,
    /// 只保留该腿数的路径
    pub nleg: Option<usize>,
    #[serde(default)]
    pub num_processes: usize,
    #[serde(default)]
    pub mode: AveragingMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub build: bool,
    #[serde(default)]
    pub rebuild: bool,
    #[serde(rename = "use", default)]
    pub use_database: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AveragingConfig {
    pub input_directory: PathBuf,
    pub frame_range: FrameRange,
    pub output_file: PathBuf,
    pub multipath: Option<MultipathConfig>,
    pub database: Option<DatabaseConfig>,
}

impl AveragingConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(multipath) = &self.multipath {
            if multipath.paths.is_empty() {
                return Err(MdExafsError::InvalidConfig(
                    "averaging.multipath.paths must list at least one path label".to_string(),
                ));
            }
            if let Some(max_distance) = &multipath.max_distance {
                max_distance.validate(multipath.paths.len())?;
            }
            if let Some(min_distance) = &multipath.min_distance {
                min_distance.validate(multipath.paths.len())?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RdfConfig {
    pub center: String,
    pub neighbor: String,
    pub cutoff: f64,
    pub bins: usize,
    pub frame_range: FrameRange,
    pub peak_window: [f64; 2],
    pub output: PathBuf,
    #[serde(default)]
    pub neighbor_method: NeighborMethod,
}

impl RdfConfig {
    pub fn validate(&self) -> Result<()> {
        validate_cutoff("rdf.cutoff", self.cutoff)?;
        if self.bins == 0 {
            return Err(MdExafsError::InvalidConfig(
                "rdf.bins must be at least 1".to_string(),
            ));
        }
        let [lo, hi] = self.peak_window;
        if !(lo >= 0.0 && lo < hi && hi <= self.cutoff) {
            return Err(MdExafsError::InvalidConfig(format!(
                "rdf.peak_window [{}, {}] must satisfy 0 <= min < max <= cutoff ({})",
                lo, hi, self.cutoff
            )));
        }
        Ok(())
    }
}

fn validate_cutoff(name: &str, cutoff: f64) -> Result<()> {
    if !(cutoff > 0.0 && cutoff.is_finite()) {
        return Err(MdExafsError::InvalidConfig(format!(
            "{} must be a positive number, got {}",
            name, cutoff
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────
// 顶层配置
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub trajectory: Option<TrajectoryConfig>,
    pub lattice: Option<LatticeConfig>,
    /// LAMMPS 原子类型 → 元素符号
    #[serde(default)]
    pub atom_types: BTreeMap<String, String>,
    pub extraction: Option<ExtractionConfig>,
    pub solver: Option<SolverConfig>,
    pub averaging: Option<AveragingConfig>,
    pub rdf: Option<RdfConfig>,
}

impl Config {
    /// 读取并解析配置文件
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MdExafsError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| MdExafsError::read(path, e))?;
        let mut config = Self::from_toml(&content).map_err(|source| MdExafsError::ConfigParse {
            path: path.display().to_string(),
            source,
        })?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// 从字符串解析（不做路径解析）
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 把相对路径改为相对 base 目录
    fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        if let Some(t) = &mut self.trajectory {
            fix(&mut t.path);
        }
        if let Some(e) = &mut self.extraction {
            fix(&mut e.output_directory);
        }
        if let Some(s) = &mut self.solver {
            if let Some(h) = &mut s.header_template {
                fix(h);
            }
            // 裸命令名按 PATH 查找，带目录的相对路径按配置文件目录解析
            if let Some(exe) = &mut s.executable {
                if exe.components().count() > 1 {
                    fix(exe);
                }
            }
        }
        if let Some(a) = &mut self.averaging {
            fix(&mut a.input_directory);
            fix(&mut a.output_file);
            if let Some(db) = &mut a.database {
                fix(&mut db.path);
            }
        }
        if let Some(r) = &mut self.rdf {
            fix(&mut r.output);
        }
    }

    pub fn trajectory(&self) -> Result<&TrajectoryConfig> {
        self.trajectory.as_ref().ok_or_else(|| missing("trajectory"))
    }

    pub fn extraction(&self) -> Result<&ExtractionConfig> {
        let extraction = self.extraction.as_ref().ok_or_else(|| missing("extraction"))?;
        extraction.validate()?;
        Ok(extraction)
    }

    /// `[solver]` 段；缺省时全部取空值
    pub fn solver(&self) -> SolverConfig {
        self.solver.clone().unwrap_or_default()
    }

    pub fn averaging(&self) -> Result<&AveragingConfig> {
        let averaging = self.averaging.as_ref().ok_or_else(|| missing("averaging"))?;
        averaging.validate()?;
        Ok(averaging)
    }

    pub fn rdf(&self) -> Result<&RdfConfig> {
        let rdf = self.rdf.as_ref().ok_or_else(|| missing("rdf"))?;
        rdf.validate()?;
        Ok(rdf)
    }

    /// 晶格模式；未配置 [lattice] 时按静态、首帧晶胞处理
    pub fn lattice_mode(&self) -> Result<Option<LatticeMode>> {
        match &self.lattice {
            Some(lattice) => lattice.mode(),
            None => Ok(None),
        }
    }
}

fn missing(section: &str) -> MdExafsError {
    MdExafsError::MissingConfigSection {
        section: section.to_string(),
    }
}

//! # 统一错误处理模块
//!
//! 定义 md-exafs 的所有错误类型，使用 `thiserror` 派生。
//!
//! 错误按来源分组：配置错误、几何错误在处理开始前或处理中立即终止命令；
//! 单样本错误（求解器失败、超时、结果文件损坏）由调用方记录到批处理汇总中；
//! 数据库错误除非显式 `--rebuild`，否则同样是致命的。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// md-exafs 统一错误类型
#[derive(Error, Debug)]
pub enum MdExafsError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 配置错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse configuration file: {path}\nReason: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Configuration section [{section}] is required for this command")]
    MissingConfigSection { section: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("distance list has {distances} values but {labels} path labels were requested")]
    DistanceListMismatch { labels: usize, distances: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid range format: {0}")]
    InvalidRange(String),

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────
    // 几何错误
    // ─────────────────────────────────────────────────────────────
    #[error("Degenerate lattice: cell volume {volume:.3e} Å³ is effectively zero")]
    DegenerateLattice { volume: f64 },

    #[error(
        "Cutoff {cutoff:.3} Å exceeds half the smallest periodic cell width ({limit:.3} Å); \
         minimum-image neighbor counts would be wrong"
    )]
    CutoffTooLarge { cutoff: f64, limit: f64 },

    #[error("Frame {frame} carries no lattice but dynamic-cell mode is enabled")]
    MissingLattice { frame: usize },

    #[error("Atom index {index} out of range for frame {frame} ({count} atoms)")]
    AtomIndexOutOfRange {
        frame: usize,
        index: usize,
        count: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // 外部命令错误
    // ─────────────────────────────────────────────────────────────
    #[error("External command '{command}' not found in PATH")]
    CommandNotFound { command: String },

    #[error("External command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Solver timed out after {seconds} s in {path}")]
    SolverTimeout { path: String, seconds: u64 },

    // ─────────────────────────────────────────────────────────────
    // 平均计算错误
    // ─────────────────────────────────────────────────────────────
    #[error("k-grid mismatch in {path}: {reason}")]
    KGridMismatch { path: String, reason: String },

    #[error("No input files found under: {path}")]
    NoInputFiles { path: String },

    #[error("No scattering paths matched the requested selection")]
    NoMatchingPaths,

    // ─────────────────────────────────────────────────────────────
    // 数据库错误
    // ─────────────────────────────────────────────────────────────
    #[error("Path database not found: {path} (build it with --build-database)")]
    DatabaseNotFound { path: String },

    #[error("Path database is incomplete (interrupted build): {path}\nRe-run with --rebuild")]
    DatabaseIncomplete { path: String },

    #[error("Path database is being written by another process: {path}")]
    DatabaseLocked { path: String },

    #[error("Path database is corrupt: {path}\nReason: {reason}")]
    DatabaseCorrupt { path: String, reason: String },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // CSV 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

impl MdExafsError {
    /// 构造读文件错误
    pub fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        MdExafsError::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造写文件错误
    pub fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        MdExafsError::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造解析错误
    pub fn parse(format: &str, path: &std::path::Path, reason: impl Into<String>) -> Self {
        MdExafsError::ParseError {
            format: format.to_string(),
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, MdExafsError>;

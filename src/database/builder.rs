//! # 路径数据库构建
//!
//! 扫描结果根目录下全部样本，把每条散射路径的 χ(k) 写入数据块并建立索引。
//!
//! ## 流程
//! 1. 在 `<db>.lock` 上取得独占锁，保证同一时刻只有一个写入者
//! 2. 已完成的数据库在未要求 `rebuild` 时直接复用；被中断的数据库报错
//! 3. 分块并行解析样本，按 (frame, atom) 顺序串行写入
//! 4. 写入 JSON 索引后改写文件头为完成状态
//!
//! ## 依赖关系
//! - 被 `commands/average.rs` 调用
//! - 使用 `parsers/feff_out.rs`, `batch/layout.rs`, `database/format.rs`

use crate::batch::layout::discover_samples;
use crate::database::format::{
    read_header, BlockRef, BuildState, DatabaseIndex, EntryMeta, FailedPart, FailureRecord, Header,
    SampleRecord, HEADER_LEN,
};
use crate::error::{MdExafsError, Result};
use crate::models::path::{ChiData, SampleId, ScatteringPath};
use crate::parsers::feff_out::{read_sample_paths, read_sample_total, PATHS_FILE, TOTAL_CHI_FILE};
use crate::utils::progress;

use fd_lock::RwLock;
use rayon::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// 每个并行批次包含的样本数 = 线程数 × 该系数
const CHUNK_FACTOR: usize = 16;

/// 构建结果统计
#[derive(Debug, Default)]
pub struct BuildReport {
    /// 写入的样本数
    pub samples: usize,
    /// 写入的路径条目数
    pub entries: usize,
    /// 写入的总 χ(k) 数
    pub totals: usize,
    /// 完全无法解析而跳过的样本数
    pub skipped: usize,
    pub failures: Vec<FailureRecord>,
}

#[derive(Debug)]
pub enum BuildOutcome {
    Built(BuildReport),
    /// 已有完整数据库，未重建
    Reused,
}

/// 打开 `<db>.lock`；写入者在其上持有独占的建议锁
///
/// 锁由内核在进程退出时释放，残留的锁文件本身不代表有写入者。
fn open_lock_file(database: &Path) -> Result<RwLock<File>> {
    let path = lock_path(database);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| MdExafsError::write(&path, e))?;
    Ok(RwLock::new(file))
}

fn locked(database: &Path, e: std::io::Error) -> MdExafsError {
    if e.kind() == std::io::ErrorKind::WouldBlock {
        MdExafsError::DatabaseLocked {
            path: database.display().to_string(),
        }
    } else {
        MdExafsError::write(&lock_path(database), e)
    }
}

/// `<db>.lock`
pub fn lock_path(database: &Path) -> PathBuf {
    let mut name = database
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    database.with_file_name(name)
}

/// 顺序追加 χ 数据块
struct BlockWriter {
    writer: BufWriter<File>,
    offset: u64,
    path: PathBuf,
}

impl BlockWriter {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| MdExafsError::write(path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&Header::building().to_bytes())
            .map_err(|e| MdExafsError::write(path, e))?;
        Ok(BlockWriter {
            writer,
            offset: HEADER_LEN,
            path: path.to_path_buf(),
        })
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<u64> {
        let start = self.offset;
        self.writer
            .write_all(bytes)
            .map_err(|e| MdExafsError::write(&self.path, e))?;
        self.offset += bytes.len() as u64;
        Ok(start)
    }

    fn write_chi(&mut self, index: &mut DatabaseIndex, chi: &ChiData) -> Result<BlockRef> {
        let grid = index.intern_grid(&chi.k);
        let bytes: Vec<u8> = chi.chi.iter().flat_map(|v| v.to_le_bytes()).collect();
        let offset = self.write_bytes(&bytes)?;
        Ok(BlockRef {
            grid,
            offset,
            len: chi.chi.len(),
        })
    }

    /// 写入索引并将文件头标记为完成
    fn finish(mut self, index: &DatabaseIndex) -> Result<()> {
        let json = serde_json::to_vec(index)?;
        let index_offset = self.write_bytes(&json)?;

        let path = self.path;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| MdExafsError::write(&path, e.into_error()))?;

        let header = Header {
            state: BuildState::Complete,
            index_offset,
            index_len: json.len() as u64,
            ..Header::building()
        };
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&header.to_bytes()))
            .and_then(|_| file.sync_all())
            .map_err(|e| MdExafsError::write(&path, e))
    }
}

struct ParsedSample {
    id: SampleId,
    paths: Option<Result<Vec<ScatteringPath>>>,
    total: Option<Result<ChiData>>,
}

fn parse_sample(id: SampleId, dir: &Path) -> ParsedSample {
    let paths = dir
        .join(PATHS_FILE)
        .is_file()
        .then(|| read_sample_paths(dir, id));
    let total = dir
        .join(TOTAL_CHI_FILE)
        .is_file()
        .then(|| read_sample_total(dir));
    ParsedSample { id, paths, total }
}

/// 构建路径数据库
pub fn build_database(
    raw_root: &Path,
    database: &Path,
    rebuild: bool,
    num_processes: usize,
) -> Result<BuildOutcome> {
    let mut lock = open_lock_file(database)?;
    let _guard = lock.try_write().map_err(|e| locked(database, e))?;

    if database.exists() {
        if !rebuild {
            return match read_header(database)?.state {
                BuildState::Complete => Ok(BuildOutcome::Reused),
                BuildState::Building => Err(MdExafsError::DatabaseIncomplete {
                    path: database.display().to_string(),
                }),
            };
        }
        fs::remove_file(database).map_err(|e| MdExafsError::write(database, e))?;
    }

    let samples = discover_samples(raw_root, None, &[PATHS_FILE, TOTAL_CHI_FILE])?;
    if samples.is_empty() {
        return Err(MdExafsError::NoInputFiles {
            path: raw_root.display().to_string(),
        });
    }

    let jobs = if num_processes == 0 {
        num_cpus::get()
    } else {
        num_processes
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| MdExafsError::Other(format!("Failed to start worker pool: {}", e)))?;

    let mut index = DatabaseIndex {
        source_root: raw_root.display().to_string(),
        ..DatabaseIndex::default()
    };
    let mut report = BuildReport::default();
    let mut writer = BlockWriter::create(database)?;

    let pb = progress::create_progress_bar(samples.len() as u64, "Indexing samples");

    for chunk in samples.chunks(jobs * CHUNK_FACTOR) {
        let parsed: Vec<ParsedSample> = pool.install(|| {
            chunk
                .par_iter()
                .map(|(id, dir)| parse_sample(*id, dir))
                .collect()
        });

        for sample in parsed {
            write_sample(&mut writer, &mut index, &mut report, sample)?;
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    writer.finish(&index)?;

    report.failures = index.failures.clone();
    Ok(BuildOutcome::Built(report))
}

fn write_sample(
    writer: &mut BlockWriter,
    index: &mut DatabaseIndex,
    report: &mut BuildReport,
    sample: ParsedSample,
) -> Result<()> {
    let ParsedSample { id, paths, total } = sample;
    let mut record = SampleRecord {
        atom: id.atom,
        paths: None,
        total: None,
    };

    match paths {
        Some(Ok(paths)) => {
            for path in &paths {
                let chi = writer.write_chi(index, &path.chi)?;
                index
                    .labels
                    .entry(path.label.clone())
                    .or_default()
                    .entry(id.frame)
                    .or_default()
                    .push(EntryMeta {
                        atom: id.atom,
                        path_index: path.index,
                        nleg: path.nleg,
                        degeneracy: path.degeneracy,
                        reff: path.reff,
                        chi,
                    });
            }
            report.entries += paths.len();
            record.paths = Some(paths.len());
        }
        Some(Err(e)) => index.failures.push(FailureRecord {
            frame: id.frame,
            atom: id.atom,
            part: FailedPart::Paths,
            reason: e.to_string(),
        }),
        None => {}
    }

    match total {
        Some(Ok(chi)) => {
            record.total = Some(writer.write_chi(index, &chi)?);
            report.totals += 1;
        }
        Some(Err(e)) => index.failures.push(FailureRecord {
            frame: id.frame,
            atom: id.atom,
            part: FailedPart::Total,
            reason: e.to_string(),
        }),
        None => {}
    }

    if record.paths.is_none() && record.total.is_none() {
        report.skipped += 1;
        return Ok(());
    }

    index.samples.entry(id.frame).or_default().push(record);
    report.samples += 1;
    Ok(())
}

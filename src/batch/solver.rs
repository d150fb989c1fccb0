//! # 求解器调用
//!
//! 每个样本目录运行一次外部散射路径求解器（默认 FEFF）。求解器在样本目录中
//! 读取 `feff.inp`，写出 `paths.dat`、`chipNNNN.dat` 与 `chi.dat`。
//!
//! `Solver` trait 把进程边界抽象出来：本地进程池与测试中的假求解器
//! 共享同一接口。
//!
//! ## 依赖关系
//! - 被 `batch/runner.rs`, `commands/run.rs` 使用
//! - 使用 `parsers/feff_out.rs` 的文件名常量
//! - 使用 `glob` 清理旧的逐路径结果

use crate::error::{MdExafsError, Result};
use crate::parsers::feff_out::{PATHS_FILE, TOTAL_CHI_FILE};

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// 求解器输出日志
pub const LOG_FILE: &str = "solver.log";

/// 轮询子进程状态的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 日志末尾附在错误信息中的行数
const LOG_TAIL_LINES: usize = 5;

/// 单样本求解器
pub trait Solver: Sync {
    /// 在样本目录中运行一次
    fn run(&self, sample_dir: &Path) -> Result<()>;
}

/// 本地外部进程
#[derive(Debug, Clone)]
pub struct LocalSolver {
    executable: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl LocalSolver {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        LocalSolver {
            executable: executable.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_args<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        self.args = args.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn with_timeout(mut self, seconds: Option<u64>) -> Self {
        self.timeout = seconds.map(Duration::from_secs);
        self
    }

    fn command_name(&self) -> String {
        self.executable.display().to_string()
    }

    fn log_tail(log_path: &Path) -> String {
        let text = fs::read_to_string(log_path).unwrap_or_default();
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(LOG_TAIL_LINES);
        lines[start..].join("\n")
    }
}

impl Solver for LocalSolver {
    fn run(&self, sample_dir: &Path) -> Result<()> {
        let log_path = sample_dir.join(LOG_FILE);
        let stdout = File::create(&log_path).map_err(|e| MdExafsError::write(&log_path, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| MdExafsError::write(&log_path, e))?;

        let mut child = Command::new(&self.executable)
            .args(&self.args)
            .current_dir(sample_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => MdExafsError::CommandNotFound {
                    command: self.command_name(),
                },
                _ => MdExafsError::CommandFailed {
                    command: self.command_name(),
                    stderr: e.to_string(),
                },
            })?;

        let started = Instant::now();
        let status = loop {
            let polled = child.try_wait().map_err(|e| MdExafsError::CommandFailed {
                command: self.command_name(),
                stderr: e.to_string(),
            })?;
            if let Some(status) = polled {
                break status;
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(MdExafsError::SolverTimeout {
                        path: sample_dir.display().to_string(),
                        seconds: limit.as_secs(),
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            return Err(MdExafsError::CommandFailed {
                command: format!("{} (in {}, {})", self.command_name(), sample_dir.display(), status),
                stderr: Self::log_tail(&log_path),
            });
        }

        if !is_complete(sample_dir) {
            return Err(MdExafsError::CommandFailed {
                command: format!("{} (in {})", self.command_name(), sample_dir.display()),
                stderr: format!(
                    "solver exited cleanly but did not write both {} and {}",
                    TOTAL_CHI_FILE, PATHS_FILE
                ),
            });
        }
        Ok(())
    }
}

/// 样本是否已有完整结果
pub fn is_complete(sample_dir: &Path) -> bool {
    sample_dir.join(TOTAL_CHI_FILE).is_file() && sample_dir.join(PATHS_FILE).is_file()
}

/// 删除旧结果，避免重算后残留上一次的逐路径文件
pub fn clear_results(sample_dir: &Path) -> Result<usize> {
    let mut removed = 0;

    for name in [TOTAL_CHI_FILE, PATHS_FILE, LOG_FILE] {
        let path = sample_dir.join(name);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| MdExafsError::write(&path, e))?;
            removed += 1;
        }
    }

    let dir = glob::Pattern::escape(&sample_dir.to_string_lossy());
    let pattern = Path::new(&dir).join("chip[0-9][0-9][0-9][0-9].dat");
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern)
        .map_err(|e| MdExafsError::InvalidArgument(format!("bad glob pattern '{}': {}", pattern, e)))?;
    for path in entries.flatten() {
        fs::remove_file(&path).map_err(|e| MdExafsError::write(&path, e))?;
        removed += 1;
    }

    Ok(removed)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 不启动进程的求解器：按目录名决定成功或失败
    pub(crate) struct FakeSolver {
        pub calls: AtomicUsize,
        pub fail_when: fn(&Path) -> bool,
        pub seen: Mutex<Vec<PathBuf>>,
    }

    impl FakeSolver {
        pub fn new(fail_when: fn(&Path) -> bool) -> Self {
            FakeSolver {
                calls: AtomicUsize::new(0),
                fail_when,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Solver for FakeSolver {
        fn run(&self, sample_dir: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(sample_dir.to_path_buf());
            if (self.fail_when)(sample_dir) {
                return Err(MdExafsError::CommandFailed {
                    command: "fake".to_string(),
                    stderr: "boom".to_string(),
                });
            }
            fs::write(sample_dir.join(PATHS_FILE), "fake\n").unwrap();
            fs::write(sample_dir.join(TOTAL_CHI_FILE), "0.0 0.0\n").unwrap();
            Ok(())
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_local_solver_success_writes_log() {
        let tmp = tempfile::tempdir().unwrap();
        let solver = LocalSolver::new("sh")
            .with_args(&["-c", "echo running; echo '1.0 0.5' > chi.dat; touch paths.dat"]);
        solver.run(tmp.path()).unwrap();
        assert!(is_complete(tmp.path()));

        let log = fs::read_to_string(tmp.path().join(LOG_FILE)).unwrap();
        assert!(log.contains("running"));
        assert!(tmp.path().join(TOTAL_CHI_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_local_solver_failure_carries_log_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let solver = LocalSolver::new("sh").with_args(&["-c", "echo 'fatal: bad potential' >&2; exit 3"]);
        match solver.run(tmp.path()) {
            Err(MdExafsError::CommandFailed { stderr, .. }) => {
                assert!(stderr.contains("bad potential"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_local_solver_missing_output() {
        let tmp = tempfile::tempdir().unwrap();
        let solver = LocalSolver::new("sh").with_args(&["-c", "true"]);
        assert!(matches!(solver.run(tmp.path()), Err(MdExafsError::CommandFailed { .. })));

        // 只有 chi.dat 不算完成，否则下次运行会重算
        let solver = LocalSolver::new("sh").with_args(&["-c", "echo '1.0 0.5' > chi.dat"]);
        assert!(matches!(solver.run(tmp.path()), Err(MdExafsError::CommandFailed { .. })));
        assert!(!is_complete(tmp.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_local_solver_timeout_kills_child() {
        let tmp = tempfile::tempdir().unwrap();
        let solver = LocalSolver::new("sh")
            .with_args(&["-c", "sleep 30"])
            .with_timeout(Some(1));
        let started = Instant::now();
        assert!(matches!(
            solver.run(tmp.path()),
            Err(MdExafsError::SolverTimeout { seconds: 1, .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_executable() {
        let tmp = tempfile::tempdir().unwrap();
        let solver = LocalSolver::new("md-exafs-no-such-solver");
        assert!(matches!(
            solver.run(tmp.path()),
            Err(MdExafsError::CommandNotFound { .. })
        ));
    }

    #[test]
    fn test_clear_results_removes_stale_path_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        for name in ["chi.dat", "paths.dat", "chip0001.dat", "chip0017.dat", "feff.inp"] {
            fs::write(dir.join(name), "x").unwrap();
        }
        assert!(is_complete(dir));

        assert_eq!(clear_results(dir).unwrap(), 4);
        assert!(!is_complete(dir));
        assert!(dir.join("feff.inp").exists());
        assert!(!dir.join("chip0017.dat").exists());
    }

    #[test]
    fn test_clear_results_in_bracketed_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run[1]").join("frame_0").join("atom_3");
        fs::create_dir_all(&dir).unwrap();
        for name in ["chi.dat", "paths.dat", "chip0001.dat", "chip0002.dat"] {
            fs::write(dir.join(name), "x").unwrap();
        }

        assert_eq!(clear_results(&dir).unwrap(), 4);
        assert!(!dir.join("chip0001.dat").exists());
        assert!(!dir.join("chip0002.dat").exists());
    }
}

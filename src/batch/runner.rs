//! # 批量执行器
//!
//! 固定数量的工作线程从共享队列领取样本并运行求解器。
//!
//! ## 功能
//! - rayon 线程池中启动 N 个工作线程，动态负载均衡
//! - 进度条显示
//! - 错误收集与汇总报告（单样本失败不终止整批）
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 调用
//! - 使用 `batch/queue.rs`, `batch/solver.rs`
//! - 使用 `utils/progress.rs` 创建进度条

use crate::batch::queue::WorkQueue;
use crate::batch::solver::{self, Solver};
use crate::error::{MdExafsError, Result};
use crate::models::path::SampleId;
use crate::utils::{output, progress};

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// 单个样本处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult {
    /// 处理成功
    Success,
    /// 跳过（结果已存在）
    Skipped,
    /// 处理失败
    Failed(String, String), // (样本, 错误信息)
}

/// 批量处理结果统计
#[derive(Debug, Default)]
pub struct BatchResult {
    /// 成功数量
    pub success: usize,
    /// 跳过数量
    pub skipped: usize,
    /// 失败数量
    pub failed: usize,
    /// 失败详情
    pub failures: Vec<(String, String)>,
}

impl BatchResult {
    /// 合并处理结果
    pub fn merge(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Success => self.success += 1,
            ProcessResult::Skipped => self.skipped += 1,
            ProcessResult::Failed(id, err) => {
                self.failed += 1;
                self.failures.push((id, err));
            }
        }
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }

    /// 有样本但没有一个成功或已完成
    pub fn all_failed(&self) -> bool {
        self.total() > 0 && self.success + self.skipped == 0
    }
}

/// 批量执行器
pub struct BatchRunner {
    /// 工作线程数
    workers: usize,
}

impl BatchRunner {
    /// 创建新的批量执行器；0 表示使用全部 CPU
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 工作线程循环取队列直到为空
    pub fn run<T, F>(&self, queue: &WorkQueue<T>, processor: F) -> Result<BatchResult>
    where
        T: Send,
        F: Fn(T) -> ProcessResult + Sync,
    {
        let pb = progress::create_progress_bar(queue.total() as u64, "Solving");

        let success_count = AtomicUsize::new(0);
        let skipped_count = AtomicUsize::new(0);
        let failed_count = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(queue.total()));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| MdExafsError::Other(format!("Failed to start worker pool: {}", e)))?;

        pool.scope(|scope| {
            for _ in 0..self.workers {
                scope.spawn(|_| {
                    while let Some(item) = queue.pop() {
                        let result = processor(item);

                        match &result {
                            ProcessResult::Success => {
                                success_count.fetch_add(1, Ordering::Relaxed);
                            }
                            ProcessResult::Skipped => {
                                skipped_count.fetch_add(1, Ordering::Relaxed);
                            }
                            ProcessResult::Failed(id, err) => {
                                failed_count.fetch_add(1, Ordering::Relaxed);
                                let first = err.lines().next().unwrap_or_default();
                                pb.suspend(|| output::print_error(&format!("{}: {}", id, first)));
                            }
                        }

                        pb.set_message(format!(
                            "ok {} / skip {} / fail {}",
                            success_count.load(Ordering::Relaxed),
                            skipped_count.load(Ordering::Relaxed),
                            failed_count.load(Ordering::Relaxed)
                        ));
                        pb.inc(1);

                        match results.lock() {
                            Ok(mut guard) => guard.push(result),
                            Err(poisoned) => poisoned.into_inner().push(result),
                        }
                    }
                });
            }
        });

        pb.finish_and_clear();

        let results = match results.into_inner() {
            Ok(results) => results,
            Err(poisoned) => poisoned.into_inner(),
        };

        // 汇总结果
        let mut batch_result = BatchResult::default();
        for result in results {
            batch_result.merge(result);
        }
        batch_result.failures.sort();

        Ok(batch_result)
    }
}

/// 对一组样本目录运行求解器
///
/// 未指定 `overwrite` 时，已有完整结果的样本直接跳过；
/// 指定时先清除旧结果再重算。
pub fn solve_samples<S: Solver + ?Sized>(
    runner: &BatchRunner,
    samples: Vec<(SampleId, PathBuf)>,
    solver: &S,
    overwrite: bool,
) -> Result<BatchResult> {
    let queue = WorkQueue::new(samples);

    runner.run(&queue, |(id, dir)| {
        let id = id.to_string();
        if !overwrite && solver::is_complete(&dir) {
            return ProcessResult::Skipped;
        }
        if overwrite {
            if let Err(e) = solver::clear_results(&dir) {
                return ProcessResult::Failed(id, e.to_string());
            }
        }
        match solver.run(&dir) {
            Ok(()) => ProcessResult::Success,
            Err(e) => ProcessResult::Failed(id, e.to_string()),
        }
    })
}

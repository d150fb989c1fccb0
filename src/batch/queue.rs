//! # 共享工作队列
//!
//! 求解器工作线程从同一个队列中取样本，先完成的线程继续领取，
//! 慢样本不会拖住其他线程。队列作为显式对象传入执行器。
//!
//! ## 依赖关系
//! - 被 `batch/runner.rs` 使用

use std::collections::VecDeque;
use std::sync::Mutex;

/// 多线程共享的先进先出队列
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    total: usize,
}

impl<T> WorkQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let items: VecDeque<T> = items.into_iter().collect();
        let total = items.len();
        WorkQueue {
            items: Mutex::new(items),
            total,
        }
    }

    /// 取出下一项；队列为空时返回 `None`
    pub fn pop(&self) -> Option<T> {
        // 持锁线程 panic 后队列内容仍然有效
        let mut items = match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        items.pop_front()
    }

    /// 入队时的总数
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new(vec![1, 2, 3]);
        assert_eq!(queue.total(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_each_item_taken_once() {
        let queue = WorkQueue::new(0..1000usize);
        let sum = AtomicUsize::new(0);
        let taken = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while let Some(i) = queue.pop() {
                        sum.fetch_add(i, Ordering::Relaxed);
                        taken.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(taken.load(Ordering::Relaxed), 1000);
        assert_eq!(sum.load(Ordering::Relaxed), 999 * 1000 / 2);
    }
}

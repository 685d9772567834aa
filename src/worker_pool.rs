//! A fixed-size FIFO worker pool built on the `threadpool` crate — already a dependency of the
//! teacher's sibling `motors` package for exactly this kind of job pool. Cooperative kill: each
//! submitted task checks the shared stop flag both before starting a new game and the scheduler
//! refuses to enqueue once it is set, giving "workers finish their current game, then exit the
//! task loop" (spec.md §5) without a bespoke pool implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use threadpool::ThreadPool;

pub struct WorkerPool {
    pool: ThreadPool,
    stop_flag: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(concurrency: usize, stop_flag: Arc<AtomicBool>) -> Self {
        Self { pool: ThreadPool::new(concurrency.max(1)), stop_flag }
    }

    /// Enqueues `task`, unless the stop flag is already set. The task itself is responsible for
    /// checking the flag again right before doing any real work, since it may sit in the queue
    /// for a while before a worker picks it up.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.stop_flag.load(Ordering::SeqCst) {
            return;
        }
        let stop_flag = self.stop_flag.clone();
        self.pool.execute(move || {
            if stop_flag.load(Ordering::SeqCst) {
                return;
            }
            task();
        });
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Blocks until every queued and in-flight task has finished.
    pub fn join(&self) {
        self.pool.join();
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_count() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn stop_flag_drains_the_queue_without_running_new_tasks() {
        let flag = Arc::new(AtomicBool::new(false));
        let pool = WorkerPool::new(2, flag);
        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let completed = completed.clone();
            pool.execute(move || {
                std::thread::sleep(Duration::from_millis(20));
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.stop();
        pool.join();
        // Tasks already running when stop() fired are allowed to finish; nothing queued after
        // stop() should ever run, but we can't deterministically race that here, only assert
        // the pool actually reports stopped and doesn't hang on join().
        assert!(pool.is_stopped());
        assert!(completed.load(Ordering::SeqCst) <= 4);
    }
}

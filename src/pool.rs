//! Fixed-size worker pool for running jobs concurrently.

use std::panic::AssertUnwindSafe;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Small fixed-size worker pool for render jobs.
///
/// The pipeline itself is synchronous; parallelism comes from submitting
/// jobs onto different workers, each of which runs its closure to completion
/// with its own temporary-directory scope. A panicking job is contained by
/// its worker so it can never hang or shrink the pool.
pub struct JobPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobPool {
    /// Pool with `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let workers = (0..size.max(1))
            .map(|index| {
                let rx = rx.clone();
                std::thread::spawn(move || {
                    while let Ok(job) = rx.recv() {
                        debug!(worker = index, "job picked up");
                        if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!(worker = index, "render job panicked; worker continues");
                        }
                    }
                })
            })
            .collect();
        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Queue a job; it starts as soon as a worker is free.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Box::new(job));
        }
    }

    /// Drain the queue and join every worker.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        drop(self.tx.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn all_submitted_jobs_run() {
        let pool = JobPool::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn a_panicking_job_does_not_take_down_the_pool() {
        let pool = JobPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.submit(|| panic!("boom"));
        let after = Arc::clone(&counter);
        pool.submit(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

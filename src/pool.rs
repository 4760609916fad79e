//! Fixed worker pool shared by the CPU and GPU-staging backends.
//!
//! Workers drain a FIFO of boxed closures from a crossbeam channel. Dropping
//! the pool closes the channel; workers finish whatever is already queued
//! and exit, and the drop joins them, so no job runs after destruction
//! returns.

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct WorkerPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `count` workers (clamped to at least one) named `{name}-{i}`.
    pub fn new(name: &str, count: usize) -> Self {
        let count = count.max(1);
        let (jobs, feed) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..count)
            .map(|i| {
                let feed: Receiver<Job> = feed.clone();
                std::thread::Builder::new()
                    .name(format!("{name}-{i}"))
                    .spawn(move || {
                        tracing::debug!("worker {} starting", i);
                        while let Ok(job) = feed.recv() {
                            job();
                        }
                        tracing::debug!("worker {} shutting down", i);
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self {
            jobs: Some(jobs),
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues a job. Silently drops the job if the pool is shutting down;
    /// that only happens from `Drop`, after which no submits are possible.
    pub fn execute(&self, job: Job) {
        if let Some(jobs) = &self.jobs {
            let _ = jobs.send(job);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Disconnect the channel so workers exit once the queue is drained.
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

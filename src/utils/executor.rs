//! Worker pool for camera subsystem callbacks
//!
//! Device and session callbacks are posted here instead of running on the
//! orchestration runtime. Jobs run in FIFO order across a fixed set of
//! worker threads.

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{JoinHandle, ThreadId};

/// Number of workers serving camera callbacks
pub const CALLBACK_WORKERS: usize = 2;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size callback worker pool
pub struct CallbackExecutor {
    name: String,
    tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
}

impl CallbackExecutor {
    /// Create a pool with [`CALLBACK_WORKERS`] threads
    pub fn new(name: &str) -> std::io::Result<Self> {
        Self::with_workers(name, CALLBACK_WORKERS)
    }

    /// Create a pool with a specific number of threads
    pub fn with_workers(name: &str, count: usize) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(count);

        for index in 0..count.max(1) {
            let rx = rx.clone();
            let thread_name = format!("{name}-{index}");
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    for job in rx.iter() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!("Callback panicked on {}", thread_name);
                        }
                    }
                })?;
            workers.push(handle);
        }

        let worker_ids = workers.iter().map(|w| w.thread().id()).collect();

        tracing::debug!("Started {} callback workers for {}", workers.len(), name);

        Ok(Self {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            worker_ids,
        })
    }

    /// Queue a job. Returns `false` once the pool has shut down.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Whether the pool still accepts jobs
    pub fn is_running(&self) -> bool {
        self.tx.lock().is_some()
    }

    /// Stop accepting jobs, let queued jobs finish and join the workers.
    ///
    /// When called from one of the pool's own workers that worker is
    /// detached instead of joined.
    pub fn shutdown(&self) {
        if self.tx.lock().take().is_none() {
            return;
        }

        let current = std::thread::current().id();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::warn!("Callback worker for {} exited abnormally", self.name);
            }
        }

        tracing::debug!("Callback workers for {} stopped", self.name);
    }

    /// Whether the calling thread is one of this pool's workers
    pub fn is_worker_thread(&self) -> bool {
        self.worker_ids.contains(&std::thread::current().id())
    }
}

impl Drop for CallbackExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Fixed-size worker pool with typed task handles.
//!
//! Workers drain a shared FIFO channel of boxed jobs. [`TaskPool::submit`]
//! returns a [`TaskHandle<T>`] whose result arrives on a bounded(1) reply
//! channel. [`TaskPool::wait_all`] blocks until the queue is empty and no job
//! is running. Dropping the pool closes the queue and joins every worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors surfaced by the pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The task panicked, or the pool shut down before it ran.
    #[error("task panicked or was dropped before completing")]
    TaskPanicked,
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

// ---------------------------------------------------------------------------
// Outstanding-work counter
// ---------------------------------------------------------------------------

/// Count of submitted jobs that have not finished, plus a condvar that fires
/// when it reaches zero.
#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn increment(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let _idle = self
            .idle
            .wait_while(count, |c| *c > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Decrements the pending count even if the job unwinds.
struct CompletionGuard<'a>(&'a Pending);

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Handle to the result of one submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    reply: Receiver<T>,
    ready: Option<T>,
}

impl<T> TaskHandle<T> {
    /// Whether the result is available without blocking.
    pub fn is_ready(&mut self) -> bool {
        if self.ready.is_some() {
            return true;
        }
        match self.reply.try_recv() {
            Ok(value) => {
                self.ready = Some(value);
                true
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }

    /// Block until the task finishes and take its result.
    pub fn wait(self) -> Result<T, PoolError> {
        match self.ready {
            Some(value) => Ok(value),
            None => self.reply.recv().map_err(|_| PoolError::TaskPanicked),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskPool
// ---------------------------------------------------------------------------

/// A fixed pool of OS worker threads draining one FIFO queue.
#[derive(Debug)]
pub struct TaskPool {
    queue: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Pending>,
}

impl TaskPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Result<Self, PoolError> {
        let size = size.max(1);
        let (queue, jobs) = crossbeam_channel::unbounded::<Job>();
        let pending = Arc::new(Pending::default());

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let jobs = jobs.clone();
            let pending = Arc::clone(&pending);
            let handle = thread::Builder::new()
                .name(format!("fluxgrid-worker-{i}"))
                .spawn(move || worker_loop(i, jobs, pending))
                .map_err(PoolError::ThreadSpawn)?;
            workers.push(handle);
        }
        log::trace!("task pool started with {size} workers");

        Ok(Self {
            queue: Some(queue),
            workers,
            pending,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue `task` and return a handle to its result.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move || {
            // The handle may already be dropped; the result is then discarded.
            let _ = reply_tx.send(task());
        });

        self.pending.increment();
        let sent = self.queue.as_ref().is_some_and(|q| q.send(job).is_ok());
        if !sent {
            // Queue closed: the reply sender was dropped with the job, so the
            // handle reports TaskPanicked.
            self.pending.decrement();
        }

        TaskHandle {
            reply: reply_rx,
            ready: None,
        }
    }

    /// Block until every submitted task has finished.
    pub fn wait_all(&self) {
        self.pending.wait_idle();
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Closing the queue lets workers fall out of their recv loop once
        // the remaining jobs are drained.
        self.queue.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        log::trace!("task pool stopped");
    }
}

fn worker_loop(index: usize, jobs: Receiver<Job>, pending: Arc<Pending>) {
    while let Ok(job) = jobs.recv() {
        let _guard = CompletionGuard(&pending);
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::warn!("task on worker {index} panicked");
        }
    }
}

#![forbid(unsafe_code)]

//! Execution of page-fetch tasks off the owner thread.
//!
//! The coalescer packages each page fetch as a [`FetchJob`] and hands it to a
//! [`TaskSpawner`]. Jobs report back through the coalescer's settlement
//! channel, never by touching the cache directly, so the spawner only decides
//! *where* and *when* a job runs.
//!
//! - [`ThreadSpawner`] runs every job on its own named OS thread. Concurrency
//!   is bounded only by the number of distinct pages in one range request.
//! - [`DeferredSpawner`] queues jobs until the host runs them. Single-threaded
//!   hosts drive it from their event loop; tests use it to choose settlement
//!   order precisely.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// One page fetch, ready to run.
pub struct FetchJob {
    offset: usize,
    generation: u64,
    task: Box<dyn FnOnce() + Send>,
}

impl FetchJob {
    pub fn new(offset: usize, generation: u64, task: impl FnOnce() + Send + 'static) -> Self {
        Self {
            offset,
            generation,
            task: Box::new(task),
        }
    }

    /// Page offset this job fetches.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Cache generation captured at dispatch.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Run the fetch to completion on the current thread.
    pub fn run(self) {
        (self.task)();
    }
}

impl std::fmt::Debug for FetchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchJob")
            .field("offset", &self.offset)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Runs fetch jobs.
pub trait TaskSpawner: Send + Sync {
    /// Start `job`. An error means the job was dropped without running.
    fn spawn(&self, job: FetchJob) -> io::Result<()>;
}

impl<T: TaskSpawner + ?Sized> TaskSpawner for Arc<T> {
    fn spawn(&self, job: FetchJob) -> io::Result<()> {
        (**self).spawn(job)
    }
}

/// One OS thread per job.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, job: FetchJob) -> io::Result<()> {
        std::thread::Builder::new()
            .name(format!("qgrid-fetch-{}", job.offset()))
            .spawn(move || job.run())
            .map(|_handle| ())
    }
}

/// Queues jobs until the host runs them.
///
/// Cloning yields another handle to the same queue: hand one clone to the
/// coalescer and keep one to drive execution.
#[derive(Debug, Clone, Default)]
pub struct DeferredSpawner {
    queue: Arc<Mutex<VecDeque<FetchJob>>>,
}

impl DeferredSpawner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<FetchJob>> {
        // Jobs run outside the lock.
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Offsets of queued jobs, in dispatch order.
    #[must_use]
    pub fn queued_offsets(&self) -> Vec<usize> {
        self.lock().iter().map(FetchJob::offset).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run the oldest queued job. Returns its offset.
    pub fn run_next(&self) -> Option<usize> {
        let job = self.lock().pop_front()?;
        let offset = job.offset();
        job.run();
        Some(offset)
    }

    /// Run the oldest queued job for `offset`. Returns whether one ran.
    pub fn run_offset(&self, offset: usize) -> bool {
        let job = {
            let mut queue = self.lock();
            let Some(position) = queue.iter().position(|job| job.offset() == offset) else {
                return false;
            };
            queue.remove(position)
        };
        match job {
            Some(job) => {
                job.run();
                true
            }
            None => false,
        }
    }

    /// Run every queued job (including any queued while running). Returns
    /// how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next().is_some() {
            ran += 1;
        }
        ran
    }

    /// Drop every queued job without running it. Returns how many.
    pub fn discard_all(&self) -> usize {
        let mut queue = self.lock();
        let count = queue.len();
        queue.clear();
        count
    }
}

impl TaskSpawner for DeferredSpawner {
    fn spawn(&self, job: FetchJob) -> io::Result<()> {
        self.lock().push_back(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn counting_job(offset: usize, counter: &Arc<AtomicUsize>) -> FetchJob {
        let counter = Arc::clone(counter);
        FetchJob::new(offset, 0, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn deferred_runs_in_dispatch_order() {
        let spawner = DeferredSpawner::new();
        let counter = Arc::new(AtomicUsize::new(0));
        spawner.spawn(counting_job(0, &counter)).unwrap();
        spawner.spawn(counting_job(50, &counter)).unwrap();

        assert_eq!(spawner.queued_offsets(), vec![0, 50]);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(spawner.run_next(), Some(0));
        assert_eq!(spawner.run_next(), Some(50));
        assert_eq!(spawner.run_next(), None);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deferred_run_offset_picks_specific_job() {
        let spawner = DeferredSpawner::new();
        let counter = Arc::new(AtomicUsize::new(0));
        spawner.spawn(counting_job(0, &counter)).unwrap();
        spawner.spawn(counting_job(50, &counter)).unwrap();

        assert!(spawner.run_offset(50));
        assert!(!spawner.run_offset(50));
        assert_eq!(spawner.queued_offsets(), vec![0]);
    }

    #[test]
    fn deferred_clones_share_queue() {
        let spawner = DeferredSpawner::new();
        let handle = spawner.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        spawner.spawn(counting_job(100, &counter)).unwrap();

        assert_eq!(handle.len(), 1);
        assert_eq!(handle.run_all(), 1);
        assert!(spawner.is_empty());
    }

    #[test]
    fn deferred_discard_drops_without_running() {
        let spawner = DeferredSpawner::new();
        let counter = Arc::new(AtomicUsize::new(0));
        spawner.spawn(counting_job(0, &counter)).unwrap();
        spawner.spawn(counting_job(50, &counter)).unwrap();

        assert_eq!(spawner.discard_all(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn thread_spawner_runs_job() {
        let (tx, rx) = mpsc::channel();
        ThreadSpawner
            .spawn(FetchJob::new(150, 3, move || {
                let name = std::thread::current().name().map(str::to_owned);
                tx.send(name).unwrap();
            }))
            .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("qgrid-fetch-150"));
    }

    #[test]
    fn job_debug_hides_closure() {
        let job = FetchJob::new(50, 2, || {});
        let debug = format!("{job:?}");
        assert!(debug.contains("offset: 50"));
        assert!(debug.contains("generation: 2"));
    }
}

//! # Work Queue
//!
//! Fixed pool of worker threads fed by a bounded channel, plus a
//! mutex-guarded queue of completions drained on the main thread.
//!
//! ## Backpressure
//!
//! - The submission channel is bounded: a full queue rejects the job with
//!   [`QueueError::Full`] instead of blocking the main loop. Callers keep
//!   their "not yet requested" state and try again on a later tick.
//! - Keyed submissions coalesce: while a key is in flight (submitted but
//!   not yet delivered) a second submission with the same key is rejected
//!   with [`QueueError::Duplicate`].
//!
//! ## Delivery
//!
//! Completions run in FIFO order of worker completion. There is no
//! cancellation; a callback for work nobody wants any more still runs and
//! must check relevance itself.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use thiserror::Error;

/// A main-thread callback bound to the result it will receive.
pub type Completion<C> = Box<dyn FnOnce(&mut C) + Send>;

type Job = Box<dyn FnOnce() + Send>;

/// Errors returned when a job cannot be accepted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The bounded submission queue is full.
    #[error("work queue full")]
    Full,

    /// A job with the same key is already in flight.
    #[error("job with this key already in flight")]
    Duplicate,

    /// The worker pool has shut down.
    #[error("work queue closed")]
    Closed,
}

/// Result type for queue submissions.
pub type QueueResult<T> = Result<T, QueueError>;

/// Worker pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkQueueConfig {
    /// Number of worker threads (at least 1).
    pub workers: usize,
    /// Maximum number of submitted jobs waiting for a worker.
    pub capacity: usize,
}

impl WorkQueueConfig {
    /// Default bound on queued jobs.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Config with an explicit worker count.
    #[must_use]
    pub const fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            capacity: Self::DEFAULT_CAPACITY,
        }
    }
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        // Leave one core for the main loop.
        let cores = thread::available_parallelism().map_or(2, std::num::NonZeroUsize::get);
        Self::with_workers(cores.saturating_sub(1).max(1))
    }
}

struct Finished<C, K> {
    key: Option<K>,
    run: Completion<C>,
}

struct Shared<C, K> {
    completed: Mutex<VecDeque<Finished<C, K>>>,
    keys: Mutex<HashSet<K>>,
    in_flight: AtomicUsize,
}

impl<C, K: Eq + Hash> Shared<C, K> {
    /// Moves a job from in flight to ready in one step under the
    /// completed lock, so `pending` never sees it twice.
    fn push(&self, finished: Finished<C, K>) {
        let mut completed = self.completed.lock();
        completed.push_back(finished);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    fn abandon(&self, key: Option<K>) {
        if let Some(key) = key {
            self.keys.lock().remove(&key);
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Background work pump delivering results to a main-thread context `C`.
///
/// `K` identifies keyed jobs for duplicate coalescing.
///
/// # Example
///
/// ```rust,ignore
/// let queue: WorkQueue<Vec<u64>> = WorkQueue::new(WorkQueueConfig::with_workers(2));
/// queue.submit(|| 6 * 7, |answer, out: &mut Vec<u64>| out.push(answer))?;
///
/// // Once per tick:
/// let mut results = Vec::new();
/// queue.drain(&mut results);
/// ```
pub struct WorkQueue<C, K = u64> {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared<C, K>>,
}

impl<C, K> WorkQueue<C, K>
where
    C: 'static,
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Spawns the worker pool.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn a worker thread.
    #[must_use]
    pub fn new(config: WorkQueueConfig) -> Self {
        let (sender, receiver) = bounded::<Job>(config.capacity.max(1));
        let worker_count = config.workers.max(1);

        let workers = (0..worker_count)
            .map(|index| {
                let receiver: Receiver<Job> = receiver.clone();
                thread::Builder::new()
                    .name(format!("strata-worker-{index}"))
                    .spawn(move || {
                        for job in &receiver {
                            job();
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        tracing::debug!(workers = worker_count, capacity = config.capacity, "work queue started");

        Self {
            sender: Some(sender),
            workers,
            shared: Arc::new(Shared {
                completed: Mutex::new(VecDeque::new()),
                keys: Mutex::new(HashSet::new()),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Runs `work` on a worker and `on_main(result, ctx)` on the next drain.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] when the submission queue is at capacity,
    /// [`QueueError::Closed`] after shutdown.
    pub fn submit<T, W, F>(&self, work: W, on_main: F) -> QueueResult<()>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        F: FnOnce(T, &mut C) + Send + 'static,
    {
        self.enqueue(None, work, on_main)
    }

    /// Like [`submit`](Self::submit), but rejects the job while another job
    /// with the same key is still undelivered.
    ///
    /// # Errors
    ///
    /// [`QueueError::Duplicate`] if `key` is in flight, otherwise as
    /// [`submit`](Self::submit).
    pub fn submit_keyed<T, W, F>(&self, key: K, work: W, on_main: F) -> QueueResult<()>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        F: FnOnce(T, &mut C) + Send + 'static,
    {
        if !self.shared.keys.lock().insert(key.clone()) {
            return Err(QueueError::Duplicate);
        }
        self.enqueue(Some(key), work, on_main)
    }

    fn enqueue<T, W, F>(&self, key: Option<K>, work: W, on_main: F) -> QueueResult<()>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        F: FnOnce(T, &mut C) + Send + 'static,
    {
        let Some(sender) = self.sender.as_ref() else {
            self.release(key.as_ref());
            return Err(QueueError::Closed);
        };

        let shared = Arc::clone(&self.shared);
        let job_key = key.clone();
        let job: Job = Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(value) => shared.push(Finished {
                    key: job_key,
                    run: Box::new(move |ctx: &mut C| on_main(value, ctx)),
                }),
                Err(_) => {
                    tracing::warn!("background job panicked; result dropped");
                    shared.abandon(job_key);
                }
            }
        });

        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                self.release(key.as_ref());
                match err {
                    TrySendError::Full(_) => Err(QueueError::Full),
                    TrySendError::Disconnected(_) => Err(QueueError::Closed),
                }
            }
        }
    }

    fn release(&self, key: Option<&K>) {
        if let Some(key) = key {
            self.shared.keys.lock().remove(key);
        }
    }

    /// Takes the completions that are ready right now, in FIFO order.
    ///
    /// Keys of the returned completions are released. Use this when the
    /// queue lives inside the context the callbacks need.
    #[must_use]
    pub fn take_completed(&self) -> Vec<Completion<C>> {
        let snapshot = std::mem::take(&mut *self.shared.completed.lock());
        if snapshot.is_empty() {
            return Vec::new();
        }

        let mut keys = self.shared.keys.lock();
        snapshot
            .into_iter()
            .map(|finished| {
                if let Some(key) = &finished.key {
                    keys.remove(key);
                }
                finished.run
            })
            .collect()
    }

    /// Runs every completion that is ready right now against `ctx`.
    ///
    /// Returns the number of callbacks invoked.
    pub fn drain(&self, ctx: &mut C) -> usize {
        let completed = self.take_completed();
        let count = completed.len();
        for run in completed {
            run(ctx);
        }
        count
    }

    /// Drains repeatedly until nothing is in flight or `timeout` elapses.
    ///
    /// Blocking; meant for tools, tests and loading screens, not the
    /// interactive loop. Returns the number of callbacks invoked.
    pub fn flush(&self, ctx: &mut C, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut delivered = self.drain(ctx);
        while self.in_flight() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
            delivered += self.drain(ctx);
        }
        delivered + self.drain(ctx)
    }

    /// Jobs submitted but not yet finished by a worker.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Finished jobs waiting for the next drain.
    #[must_use]
    pub fn ready(&self) -> usize {
        self.shared.completed.lock().len()
    }

    /// Jobs submitted and not yet taken by a drain.
    #[must_use]
    pub fn pending(&self) -> usize {
        let completed = self.shared.completed.lock();
        self.in_flight() + completed.len()
    }

    /// Whether a keyed job is submitted and not yet delivered.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.shared.keys.lock().contains(key)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl<C, K> Drop for WorkQueue<C, K> {
    fn drop(&mut self) {
        // Closing the channel lets workers finish queued jobs and exit.
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("worker thread exited with a panic");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn test_callbacks_run_on_draining_thread() {
        let queue: WorkQueue<Vec<thread::ThreadId>> = WorkQueue::new(WorkQueueConfig::with_workers(2));
        queue
            .submit(|| thread::current().id(), |worker, seen: &mut Vec<_>| {
                seen.push(worker);
                seen.push(thread::current().id());
            })
            .unwrap();

        let mut seen = Vec::new();
        queue.flush(&mut seen, WAIT);

        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], thread::current().id(), "work must run off-thread");
        assert_eq!(seen[1], thread::current().id(), "callback must run on the drain thread");
    }

    #[test]
    fn test_hundred_jobs_delivered_exactly_once() {
        let queue: WorkQueue<Vec<(u64, u64)>> = WorkQueue::new(WorkQueueConfig {
            workers: 4,
            capacity: 128,
        });

        for i in 0..100u64 {
            queue
                .submit(move || i * i + 7, move |value, out: &mut Vec<(u64, u64)>| out.push((i, value)))
                .unwrap();
        }

        let mut out = Vec::new();
        let mut ticks = 0;
        let deadline = Instant::now() + WAIT;
        while out.len() < 100 && Instant::now() < deadline {
            queue.drain(&mut out);
            ticks += 1;
            thread::sleep(Duration::from_millis(1));
        }
        queue.drain(&mut out);

        println!("delivered {} results over {ticks} ticks", out.len());
        assert_eq!(out.len(), 100);
        out.sort_unstable();
        for (i, (index, value)) in out.iter().enumerate() {
            assert_eq!(*index, i as u64);
            assert_eq!(*value, index * index + 7);
        }
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(queue.ready(), 0);
    }

    #[test]
    fn test_pending_counts_each_job_once() {
        let queue: WorkQueue<Vec<u32>> = WorkQueue::new(WorkQueueConfig {
            workers: 4,
            capacity: 256,
        });
        for i in 0..200u32 {
            queue.submit(move || i, |v, out: &mut Vec<u32>| out.push(v)).unwrap();
        }

        // Nothing is submitted from here on: the count may only fall.
        let mut out = Vec::new();
        let mut last = queue.pending();
        assert!(last <= 200);
        let deadline = Instant::now() + WAIT;
        while last > 0 && Instant::now() < deadline {
            let now = queue.pending();
            assert!(now <= last, "pending rose from {last} to {now}");
            last = now;
            queue.drain(&mut out);
        }
        queue.drain(&mut out);
        assert_eq!(out.len(), 200);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_drain_processes_snapshot_only() {
        let queue: WorkQueue<Vec<u32>> = WorkQueue::new(WorkQueueConfig::with_workers(1));
        queue.submit(|| 1, |v, out: &mut Vec<u32>| out.push(v)).unwrap();

        let mut out = Vec::new();
        queue.flush(&mut out, WAIT);
        assert_eq!(out, vec![1]);

        // Nothing new was submitted, so a further drain is a no-op.
        assert_eq!(queue.drain(&mut out), 0);
    }

    #[test]
    fn test_keyed_duplicates_coalesce_until_delivered() {
        let queue: WorkQueue<Vec<u32>, &'static str> = WorkQueue::new(WorkQueueConfig::with_workers(1));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        queue
            .submit_keyed("chunk", move || {
                release_rx.recv().ok();
                1
            }, |v, out: &mut Vec<u32>| out.push(v))
            .unwrap();

        assert!(queue.is_pending(&"chunk"));
        assert_eq!(
            queue.submit_keyed("chunk", || 2, |v, out: &mut Vec<u32>| out.push(v)),
            Err(QueueError::Duplicate)
        );

        release_tx.send(()).unwrap();
        let mut out = Vec::new();
        queue.flush(&mut out, WAIT);
        assert_eq!(out, vec![1]);
        assert!(!queue.is_pending(&"chunk"));

        // Key is free again after delivery.
        queue.submit_keyed("chunk", || 3, |v, out: &mut Vec<u32>| out.push(v)).unwrap();
        queue.flush(&mut out, WAIT);
        assert_eq!(out, vec![1, 3]);
    }

    #[test]
    fn test_full_queue_rejects_without_blocking() {
        let queue: WorkQueue<Vec<u32>> = WorkQueue::new(WorkQueueConfig {
            workers: 1,
            capacity: 1,
        });
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Occupy the single worker.
        queue
            .submit(move || {
                started_tx.send(()).ok();
                release_rx.recv().ok();
                0
            }, |v, out: &mut Vec<u32>| out.push(v))
            .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();

        // Fill the single channel slot.
        queue.submit(|| 1, |v, out: &mut Vec<u32>| out.push(v)).unwrap();
        assert_eq!(
            queue.submit(|| 2, |v, out: &mut Vec<u32>| out.push(v)),
            Err(QueueError::Full)
        );

        release_tx.send(()).unwrap();
        let mut out = Vec::new();
        queue.flush(&mut out, WAIT);
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn test_panicking_job_is_dropped_and_key_released() {
        let queue: WorkQueue<Vec<u32>, u8> = WorkQueue::new(WorkQueueConfig::with_workers(1));
        queue
            .submit_keyed(9, || -> u32 { panic!("generation failed") }, |v, out: &mut Vec<u32>| out.push(v))
            .unwrap();

        let mut out = Vec::new();
        queue.flush(&mut out, WAIT);

        assert!(out.is_empty());
        assert_eq!(queue.in_flight(), 0);
        assert!(!queue.is_pending(&9));
    }
}

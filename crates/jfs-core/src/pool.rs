//! Bounded worker pool with lazy growth and linger-based shrink.
//!
//! Each worker owns one piece of per-thread state (for the database layer,
//! a private SQLite connection) for its whole lifetime. Jobs are closures
//! that borrow that state mutably and run in FIFO submission order.
//!
//! Worker lifecycle:
//! - **Idle-Waiting**: no job queued. Workers at or below `min_threads` wait
//!   indefinitely; workers above it wait at most `linger`.
//! - **Executing**: oldest job dequeued, worker listed as active.
//! - **Shrinking-Exit**: linger elapsed while above `min_threads`.
//! - **Destroying-Exit**: `shutdown` was requested; observed at every wait point.
//!
//! Growth happens only on `submit` (no idle worker and fewer than
//! `max_threads` alive). Shrink happens only on linger timeout.

use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use jfs_config::PoolConfig;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::PoolError;

/// A unit of work executed against a worker's private state.
pub type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Builds the private state of a newly spawned worker.
pub type WorkerFactory<S> = Arc<dyn Fn() -> Result<S, PoolError> + Send + Sync + 'static>;

/// Thread attributes applied to every worker of a pool.
#[derive(Debug, Clone)]
pub struct WorkerAttrs {
    /// Pool name; worker threads are named `<name>-<seq>`.
    pub name: String,
    /// Optional stack size in bytes.
    pub stack_size: Option<usize>,
}

impl WorkerAttrs {
    pub fn named(name: impl Into<String>) -> Self {
        WorkerAttrs {
            name: name.into(),
            stack_size: None,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &PoolConfig) -> Self {
        WorkerAttrs {
            name: name.into(),
            stack_size: config.stack_size,
        }
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Live worker threads.
    pub threads: usize,
    /// Workers waiting for a job.
    pub idle: usize,
    /// Workers executing a job.
    pub active: usize,
    /// Jobs waiting in the queue.
    pub queued: usize,
    pub min_threads: usize,
    pub max_threads: usize,
}

struct PoolState<S> {
    queue: VecDeque<Job<S>>,
    active: HashSet<ThreadId>,
    nthreads: usize,
    idle: usize,
    waiting_for_drain: bool,
    destroying: bool,
    handles: Vec<JoinHandle<()>>,
}

struct Shared<S> {
    state: Mutex<PoolState<S>>,
    /// Signals idle workers that a job was queued or the pool is shutting down.
    work_cv: Condvar,
    /// Signals `wait_for_drain` callers.
    drain_cv: Condvar,
    /// Signals `shutdown` that the active set shrank or a worker exited.
    exit_cv: Condvar,
    min_threads: usize,
    max_threads: usize,
    linger: Duration,
    attrs: WorkerAttrs,
    factory: WorkerFactory<S>,
    spawned: AtomicU64,
}

enum WorkerExit {
    Destroying,
    Lingered,
}

/// A bounded pool of worker threads pulling jobs from a FIFO queue.
pub struct ThreadPool<S: Send + 'static> {
    shared: Arc<Shared<S>>,
}

impl<S: Send + 'static> ThreadPool<S> {
    /// Create a pool. No worker is started until the first `submit`.
    pub fn new<F>(config: &PoolConfig, attrs: WorkerAttrs, factory: F) -> Result<Self, PoolError>
    where
        F: Fn() -> Result<S, PoolError> + Send + Sync + 'static,
    {
        if config.max_threads < 1 || config.min_threads > config.max_threads {
            return Err(PoolError::InvalidBounds {
                min: config.min_threads,
                max: config.max_threads,
            });
        }

        debug!(
            pool = %attrs.name,
            min = config.min_threads,
            max = config.max_threads,
            linger_ms = config.linger.as_duration().as_millis() as u64,
            "created worker pool"
        );

        Ok(ThreadPool {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    active: HashSet::new(),
                    nthreads: 0,
                    idle: 0,
                    waiting_for_drain: false,
                    destroying: false,
                    handles: Vec::new(),
                }),
                work_cv: Condvar::new(),
                drain_cv: Condvar::new(),
                exit_cv: Condvar::new(),
                min_threads: config.min_threads,
                max_threads: config.max_threads,
                linger: config.linger.as_duration(),
                attrs,
                factory: Arc::new(factory),
                spawned: AtomicU64::new(0),
            }),
        })
    }

    /// Pool name as given in its `WorkerAttrs`.
    pub fn name(&self) -> &str {
        &self.shared.attrs.name
    }

    /// Append a job to the queue tail.
    ///
    /// Wakes one idle worker if one is free to take it, otherwise spawns a
    /// worker when below `max_threads`, otherwise leaves the job for a busy
    /// worker. On error the queue is left unchanged.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let shared = &self.shared;
        let mut guard = shared.state.lock();
        if guard.destroying {
            return Err(PoolError::ShuttingDown(shared.attrs.name.clone()));
        }

        // An idle worker that has not yet dequeued counts against jobs already queued.
        if guard.idle <= guard.queue.len() && guard.nthreads < shared.max_threads {
            // Reserve the slot so concurrent submitters respect max_threads.
            guard.nthreads += 1;
            if let Err(e) = MutexGuard::unlocked(&mut guard, || shared.spawn_worker()) {
                guard.nthreads -= 1;
                if guard.destroying {
                    shared.exit_cv.notify_all();
                }
                return Err(e);
            }
            if guard.destroying {
                return Err(PoolError::ShuttingDown(shared.attrs.name.clone()));
            }
        }

        guard.queue.push_back(Box::new(job));
        if guard.idle > 0 {
            shared.work_cv.notify_one();
        }
        Ok(())
    }

    /// Block until the queue is empty and no worker is executing a job.
    ///
    /// Any number of callers may wait at once; all are released together.
    pub fn wait_for_drain(&self) {
        let shared = &self.shared;
        let mut guard = shared.state.lock();
        while !(guard.queue.is_empty() && guard.active.is_empty()) {
            if guard.destroying && guard.nthreads == 0 {
                break;
            }
            guard.waiting_for_drain = true;
            shared.drain_cv.wait(&mut guard);
        }
    }

    /// Stop the pool.
    ///
    /// Running jobs finish, queued jobs are dropped without running, and every
    /// worker thread is joined before this returns. Idempotent. Must not be
    /// called from inside a job of the same pool.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let mut guard = shared.state.lock();
        if !guard.destroying {
            info!(
                pool = %shared.attrs.name,
                threads = guard.nthreads,
                active = guard.active.len(),
                queued = guard.queue.len(),
                "shutting down worker pool"
            );
        }
        guard.destroying = true;
        shared.work_cv.notify_all();

        while !guard.active.is_empty() {
            shared.exit_cv.wait(&mut guard);
        }
        while guard.nthreads > 0 {
            shared.exit_cv.wait(&mut guard);
        }

        let discarded: Vec<Job<S>> = guard.queue.drain(..).collect();
        let handles = std::mem::take(&mut guard.handles);
        guard.waiting_for_drain = false;
        shared.drain_cv.notify_all();
        drop(guard);

        if !discarded.is_empty() {
            warn!(
                pool = %shared.attrs.name,
                count = discarded.len(),
                "discarding queued jobs at shutdown"
            );
        }
        drop(discarded);

        for handle in handles {
            if handle.join().is_err() {
                error!(pool = %shared.attrs.name, "worker thread panicked during exit");
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        let guard = self.shared.state.lock();
        PoolStats {
            threads: guard.nthreads,
            idle: guard.idle,
            active: guard.active.len(),
            queued: guard.queue.len(),
            min_threads: self.shared.min_threads,
            max_threads: self.shared.max_threads,
        }
    }
}

impl<S: Send + 'static> Drop for ThreadPool<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: Send + 'static> Shared<S> {
    /// Start one worker. The caller has already counted it in `nthreads`.
    fn spawn_worker(self: &Arc<Self>) -> Result<(), PoolError> {
        let worker_state = (self.factory)()?;
        let seq = self.spawned.fetch_add(1, Ordering::Relaxed) + 1;

        let mut builder = thread::Builder::new().name(format!("{}-{}", self.attrs.name, seq));
        if let Some(size) = self.attrs.stack_size {
            builder = builder.stack_size(size);
        }

        let shared = Arc::clone(self);
        // The worker needs this lock to exit, so its handle is registered
        // before `shutdown` can see the pool empty.
        let mut guard = self.state.lock();
        let handle = builder
            .spawn(move || worker_main(shared, worker_state))
            .map_err(PoolError::Spawn)?;
        guard.handles.retain(|h| !h.is_finished());
        guard.handles.push(handle);
        Ok(())
    }

    fn notify_if_drained(&self, state: &mut PoolState<S>) {
        if state.queue.is_empty() && state.active.is_empty() {
            state.waiting_for_drain = false;
            self.drain_cv.notify_all();
        }
    }

    fn worker_exit(self: &Arc<Self>, exit: WorkerExit) {
        let mut guard = self.state.lock();
        // A lingering worker gave up its slot when it decided to leave.
        if let WorkerExit::Destroying = exit {
            guard.nthreads -= 1;
        }

        if guard.destroying {
            self.exit_cv.notify_all();
            return;
        }

        if let WorkerExit::Lingered = exit {
            debug!(pool = %self.attrs.name, threads = guard.nthreads, "idle worker exited after linger");
        }

        // Work that arrived while this worker was leaving still needs a thread.
        if !guard.queue.is_empty() && guard.nthreads < self.max_threads {
            guard.nthreads += 1;
            if let Err(e) = MutexGuard::unlocked(&mut guard, || self.spawn_worker()) {
                warn!(pool = %self.attrs.name, error = %e, "failed to spawn replacement worker");
                guard.nthreads -= 1;
                if guard.destroying {
                    self.exit_cv.notify_all();
                }
            }
        }
    }
}

fn worker_main<S: Send + 'static>(shared: Arc<Shared<S>>, mut worker_state: S) {
    let me = thread::current().id();
    debug!(pool = %shared.attrs.name, "worker started");

    let exit = {
        let mut guard = shared.state.lock();
        loop {
            let mut timed_out = false;
            guard.idle += 1;
            if guard.waiting_for_drain {
                shared.notify_if_drained(&mut guard);
            }

            let deadline = Instant::now() + shared.linger;
            while guard.queue.is_empty() && !guard.destroying {
                if guard.nthreads <= shared.min_threads {
                    shared.work_cv.wait(&mut guard);
                } else if shared.work_cv.wait_until(&mut guard, deadline).timed_out() {
                    timed_out = true;
                    break;
                }
            }
            guard.idle -= 1;

            if guard.destroying {
                break WorkerExit::Destroying;
            }

            if let Some(job) = guard.queue.pop_front() {
                guard.active.insert(me);
                MutexGuard::unlocked(&mut guard, || {
                    run_job(&shared.attrs.name, job, &mut worker_state)
                });
                guard.active.remove(&me);
                if guard.destroying {
                    shared.exit_cv.notify_all();
                }
                continue;
            }

            if timed_out && guard.nthreads > shared.min_threads {
                guard.nthreads -= 1;
                break WorkerExit::Lingered;
            }
        }
    };

    drop(worker_state);
    shared.worker_exit(exit);
}

fn run_job<S>(pool: &str, job: Job<S>, worker_state: &mut S) {
    if panic::catch_unwind(AssertUnwindSafe(|| job(worker_state))).is_err() {
        error!(pool = %pool, "job panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn pool_config(min: usize, max: usize, linger: Duration) -> PoolConfig {
        PoolConfig::new(min, max, linger)
    }

    fn unit_pool(min: usize, max: usize, linger: Duration) -> ThreadPool<()> {
        ThreadPool::new(&pool_config(min, max, linger), WorkerAttrs::named("test"), || Ok(()))
            .unwrap()
    }

    /// Blocks jobs until `open` is called.
    #[derive(Clone)]
    struct Gate(Arc<(Mutex<bool>, Condvar)>);

    impl Gate {
        fn new() -> Self {
            Gate(Arc::new((Mutex::new(false), Condvar::new())))
        }

        fn wait(&self) {
            let (lock, cv) = &*self.0;
            let mut open = lock.lock();
            while !*open {
                cv.wait(&mut open);
            }
        }

        fn open(&self) {
            let (lock, cv) = &*self.0;
            *lock.lock() = true;
            cv.notify_all();
        }
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_rejects_invalid_bounds() {
        let err = ThreadPool::<()>::new(
            &pool_config(3, 2, Duration::from_secs(1)),
            WorkerAttrs::named("bad"),
            || Ok(()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PoolError::InvalidBounds { min: 3, max: 2 }));

        let err = ThreadPool::<()>::new(
            &pool_config(0, 0, Duration::from_secs(1)),
            WorkerAttrs::named("bad"),
            || Ok(()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PoolError::InvalidBounds { min: 0, max: 0 }));
    }

    #[test]
    fn test_workers_start_lazily() {
        let pool = unit_pool(2, 4, Duration::from_secs(1));
        assert_eq!(pool.stats().threads, 0);

        let (tx, rx) = mpsc::channel();
        pool.submit(move |_| tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
        assert!(pool.stats().threads >= 1);
    }

    /// Opens the gate when dropped so a failed assertion cannot leave a job
    /// blocked while the pool shuts down.
    struct OpenOnDrop(Gate);

    impl Drop for OpenOnDrop {
        fn drop(&mut self) {
            self.0.open();
        }
    }

    #[test]
    fn test_fifo_order_single_worker() {
        let pool = unit_pool(1, 1, Duration::from_secs(1));
        let gate = Gate::new();
        let _release = OpenOnDrop(gate.clone());
        let order = Arc::new(Mutex::new(Vec::new()));
        let (started_tx, started_rx) = mpsc::channel();

        let g = gate.clone();
        pool.submit(move |_| {
            started_tx.send(()).unwrap();
            g.wait();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        for i in 0..20 {
            let order = Arc::clone(&order);
            pool.submit(move |_| order.lock().push(i)).unwrap();
        }
        assert_eq!(pool.stats().queued, 20);

        gate.open();
        pool.wait_for_drain();
        assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_worker_state_is_private_and_persistent() {
        let created = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&created);
        let pool: ThreadPool<Vec<usize>> = ThreadPool::new(
            &pool_config(1, 1, Duration::from_secs(5)),
            WorkerAttrs::named("stateful"),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            },
        )
        .unwrap();

        for i in 0..5 {
            pool.submit(move |seen: &mut Vec<usize>| seen.push(i)).unwrap();
        }
        let (tx, rx) = mpsc::channel();
        pool.submit(move |seen: &mut Vec<usize>| tx.send(seen.clone()).unwrap())
            .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_grows_to_max_and_no_further() {
        let pool = unit_pool(0, 3, Duration::from_secs(5));
        let gate = Gate::new();
        let _release = OpenOnDrop(gate.clone());

        for _ in 0..10 {
            let g = gate.clone();
            pool.submit(move |_| g.wait()).unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || pool.stats().active == 3));
        let stats = pool.stats();
        assert_eq!(stats.threads, 3);
        assert_eq!(stats.queued, 7);

        gate.open();
        pool.wait_for_drain();
        assert!(pool.stats().threads <= 3);
    }

    #[test]
    fn test_linger_shrinks_to_min() {
        let pool = unit_pool(1, 4, Duration::from_millis(50));
        let gate = Gate::new();
        let _release = OpenOnDrop(gate.clone());

        for _ in 0..4 {
            let g = gate.clone();
            pool.submit(move |_| g.wait()).unwrap();
        }
        assert!(wait_until(Duration::from_secs(5), || pool.stats().active == 4));

        gate.open();
        pool.wait_for_drain();
        assert!(wait_until(Duration::from_secs(5), || pool.stats().threads == 1));

        // The surviving worker still serves new work.
        let (tx, rx) = mpsc::channel();
        pool.submit(move |_| tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_wait_for_drain_releases_all_waiters() {
        let pool = Arc::new(unit_pool(2, 2, Duration::from_secs(1)));
        let gate = Gate::new();
        let _release = OpenOnDrop(gate.clone());
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let g = gate.clone();
            let done = Arc::clone(&done);
            pool.submit(move |_| {
                g.wait();
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    pool.wait_for_drain();
                    done.load(Ordering::SeqCst)
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        gate.open();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), 6);
        }
    }

    #[test]
    fn test_wait_for_drain_on_idle_pool_returns() {
        let pool = unit_pool(1, 2, Duration::from_secs(1));
        pool.wait_for_drain();
        assert_eq!(pool.stats().threads, 0);
    }

    #[test]
    fn test_shutdown_discards_queued_and_finishes_active() {
        let pool = Arc::new(unit_pool(1, 1, Duration::from_secs(1)));
        let gate = Gate::new();
        let _release = OpenOnDrop(gate.clone());
        let (started_tx, started_rx) = mpsc::channel();
        let finished = Arc::new(AtomicUsize::new(0));
        let queued_ran = Arc::new(AtomicUsize::new(0));

        let g = gate.clone();
        let f = Arc::clone(&finished);
        pool.submit(move |_| {
            started_tx.send(()).unwrap();
            g.wait();
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for _ in 0..5 {
            let q = Arc::clone(&queued_ran);
            pool.submit(move |_| {
                q.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let p = Arc::clone(&pool);
        let shutdown = thread::spawn(move || p.shutdown());
        thread::sleep(Duration::from_millis(50));
        gate.open();
        shutdown.join().unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(queued_ran.load(Ordering::SeqCst), 0);
        let stats = pool.stats();
        assert_eq!(stats.threads, 0);
        assert_eq!(stats.queued, 0);
        assert!(matches!(
            pool.submit(|_| {}),
            Err(PoolError::ShuttingDown(name)) if name == "test"
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = unit_pool(2, 2, Duration::from_secs(1));
        pool.submit(|_| {}).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert_eq!(pool.stats().threads, 0);
    }

    #[test]
    fn test_dropped_jobs_are_released() {
        let pool = unit_pool(1, 1, Duration::from_secs(1));
        let gate = Gate::new();
        let _release = OpenOnDrop(gate.clone());
        let (started_tx, started_rx) = mpsc::channel();

        let g = gate.clone();
        pool.submit(move |_| {
            started_tx.send(()).unwrap();
            g.wait();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The queued job owns the sender; dropping it must disconnect the receiver.
        let (tx, rx) = mpsc::channel::<()>();
        pool.submit(move |_| tx.send(()).unwrap()).unwrap();

        gate.open();
        drop(pool);
        // Either the job ran before shutdown observed it, or it was dropped.
        let _ = rx.recv_timeout(Duration::from_secs(5));
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = unit_pool(1, 1, Duration::from_secs(1));
        pool.submit(|_| panic!("boom")).unwrap();

        let (tx, rx) = mpsc::channel();
        pool.submit(move |_| tx.send(1).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(pool.stats().threads, 1);
    }

    #[test]
    fn test_factory_failure_leaves_queue_unchanged() {
        let pool: ThreadPool<()> = ThreadPool::new(
            &pool_config(0, 2, Duration::from_secs(1)),
            WorkerAttrs::named("broken"),
            || Err(PoolError::WorkerInit("no connection".to_string())),
        )
        .unwrap();

        let err = pool.submit(|_| {}).unwrap_err();
        assert!(matches!(err, PoolError::WorkerInit(_)));
        let stats = pool.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.threads, 0);
    }

    #[test]
    fn test_worker_threads_are_named() {
        let pool = unit_pool(1, 1, Duration::from_secs(1));
        let (tx, rx) = mpsc::channel();
        pool.submit(move |_| {
            tx.send(thread::current().name().map(str::to_string)).unwrap()
        })
        .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("test-"));
    }
}

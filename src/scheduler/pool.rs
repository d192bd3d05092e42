//! Bounded worker pool for one nesting level.
//!
//! Workers pull context ids from a shared FIFO until it is empty, then exit.
//! Lock order is queue before liveness.
//! Each worker publishes the id it is working on in its liveness slot; the
//! slot disappears when the thread ends, panics included.
//!
//! The controller waits on the completion channel. When nothing arrives for
//! `progress_timeout` and no worker is alive, every unfinished id that is not
//! queued was lost with a crashed worker: it is restored from backup,
//! re-enqueued, and fresh workers are spawned.

use crate::parser::ContextId;
use crate::utils::error::{MergeError, SchedulerError};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Work done for one context id
///
/// `restore` must undo a partial `run` so the id can be run again.
pub trait ContextJob: Send + Sync + 'static {
    fn run(&self, id: &ContextId) -> Result<(), MergeError>;
    fn restore(&self, id: &ContextId) -> Result<(), MergeError>;
}

/// Pool limits
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_workers: usize,
    pub progress_timeout: Duration,

    /// Re-runs allowed per id
    pub retry_budget: u32,

    /// Optional wall-clock cap on retrying, measured from pool start
    pub retry_deadline: Option<Duration>,
}

/// Message a worker sends after each item
#[derive(Debug)]
pub struct Completion {
    pub id: ContextId,
    pub outcome: Result<(), MergeError>,
}

/// What happened while draining one level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelReport {
    pub completed: usize,
    pub retries: usize,
    pub workers_spawned: usize,
}

struct Shared {
    queue: Mutex<VecDeque<ContextId>>,

    /// worker number -> id in progress; an entry exists while the thread lives
    liveness: Mutex<BTreeMap<usize, Option<ContextId>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a worker never panics while holding a pool lock
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    /// Next id for `worker`; on an empty queue the worker retires while the
    /// queue lock is still held, so a concurrent `push` never counts it
    fn pop(&self, worker: usize) -> Option<ContextId> {
        let mut queue = lock(&self.queue);
        let mut liveness = lock(&self.liveness);
        match queue.pop_front() {
            Some(id) => {
                liveness.insert(worker, Some(id.clone()));
                Some(id)
            }
            None => {
                liveness.remove(&worker);
                None
            }
        }
    }

    fn set_idle(&self, worker: usize) {
        lock(&self.liveness).insert(worker, None);
    }

    fn live_workers(&self) -> usize {
        lock(&self.liveness).len()
    }

    fn queued(&self) -> BTreeSet<ContextId> {
        lock(&self.queue).iter().cloned().collect()
    }

    fn push(&self, id: ContextId) {
        lock(&self.queue).push_back(id);
    }
}

/// Removes the worker's liveness slot when its thread ends
struct LivenessGuard {
    shared: Arc<Shared>,
    worker: usize,
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        let abandoned = lock(&self.shared.liveness).remove(&self.worker).flatten();
        if let Some(id) = abandoned {
            warn!("Worker {} ended while working on context {}", self.worker, id);
        }
    }
}

fn worker_loop<J: ContextJob>(job: Arc<J>, shared: Arc<Shared>, worker: usize, tx: Sender<Completion>) {
    let _guard = LivenessGuard {
        shared: Arc::clone(&shared),
        worker,
    };
    while let Some(id) = shared.pop(worker) {
        let outcome = job.run(&id);
        if tx.send(Completion { id, outcome }).is_err() {
            // controller gave up on this level
            break;
        }
        shared.set_idle(worker);
    }
}

/// Controller state for one level
struct Controller<J: ContextJob> {
    job: Arc<J>,
    shared: Arc<Shared>,
    tx: Sender<Completion>,
    config: PoolConfig,
    started: Instant,
    next_worker: usize,
    attempts: HashMap<ContextId, u32>,
    report: LevelReport,
}

impl<J: ContextJob> Controller<J> {
    /// Spawn workers until `wanted` are alive, never more than the cap
    fn top_up(&mut self, wanted: usize) -> Result<(), SchedulerError> {
        let wanted = wanted.min(self.config.max_workers.max(1));
        let live = self.shared.live_workers();
        for _ in live..wanted {
            let worker = self.next_worker;
            self.next_worker += 1;
            // register before spawning so the slot is visible immediately
            lock(&self.shared.liveness).insert(worker, None);

            let job = Arc::clone(&self.job);
            let shared = Arc::clone(&self.shared);
            let tx = self.tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("merge-worker-{}", worker))
                .spawn(move || worker_loop(job, shared, worker, tx));
            if let Err(e) = spawned {
                lock(&self.shared.liveness).remove(&worker);
                return Err(SchedulerError::Io(e));
            }
            self.report.workers_spawned += 1;
        }
        Ok(())
    }

    /// Charge one retry to `id`; false once its budget or the deadline is gone
    fn charge_retry(&mut self, id: &ContextId) -> bool {
        let attempts = self.attempts.entry(id.clone()).or_insert(0);
        *attempts += 1;
        self.report.retries += 1;
        let within_deadline = self
            .config
            .retry_deadline
            .map_or(true, |deadline| self.started.elapsed() < deadline);
        *attempts <= self.config.retry_budget && within_deadline
    }

    fn requeue(&mut self, id: ContextId) {
        if let Err(e) = self.job.restore(&id) {
            warn!("Failed to restore context {} before retry: {}", id, e);
        }
        self.shared.push(id);
    }
}

/// Run `job` over every id of one level and return when all completed
///
/// **Public** - one call per nesting level; the caller provides the barrier
///
/// # Errors
/// * `SchedulerError::RetryBudgetExhausted` - an id failed or crashed more
///   often than allowed, or the retry deadline passed
/// * `SchedulerError::Io` - a worker thread could not be spawned
pub fn run_level<J: ContextJob>(
    job: Arc<J>,
    ids: &[ContextId],
    config: &PoolConfig,
) -> Result<LevelReport, SchedulerError> {
    let mut unfinished: BTreeSet<ContextId> = ids.iter().cloned().collect();
    if unfinished.is_empty() {
        return Ok(LevelReport::default());
    }
    let total = unfinished.len();

    let shared = Arc::new(Shared {
        queue: Mutex::new(unfinished.iter().cloned().collect()),
        liveness: Mutex::new(BTreeMap::new()),
    });
    let (tx, rx) = mpsc::channel::<Completion>();

    let mut controller = Controller {
        job,
        shared,
        tx,
        config: config.clone(),
        started: Instant::now(),
        next_worker: 0,
        attempts: HashMap::new(),
        report: LevelReport::default(),
    };
    controller.top_up(total)?;

    while !unfinished.is_empty() {
        match rx.recv_timeout(controller.config.progress_timeout) {
            Ok(Completion { id, outcome: Ok(()) }) => {
                if unfinished.remove(&id) {
                    controller.report.completed += 1;
                    info!(
                        "Merged context {} ({}/{})",
                        id,
                        controller.report.completed,
                        total
                    );
                } else {
                    debug!("Ignoring repeated completion of context {}", id);
                }
            }
            Ok(Completion { id, outcome: Err(e) }) => {
                warn!("Merging context {} failed: {}", id, e);
                if !unfinished.contains(&id) {
                    continue;
                }
                if !controller.charge_retry(&id) {
                    return Err(exhausted(&unfinished));
                }
                controller.requeue(id);
                let pending = controller.shared.queued().len();
                controller.top_up(pending)?;
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                if controller.shared.live_workers() > 0 {
                    debug!("No completion yet; workers still busy");
                    continue;
                }

                // every live worker is gone, so every sent completion is in the channel
                while let Ok(Completion { id, outcome }) = rx.try_recv() {
                    match outcome {
                        Ok(()) => {
                            if unfinished.remove(&id) {
                                controller.report.completed += 1;
                            }
                        }
                        Err(e) => warn!("Merging context {} failed: {}", id, e),
                    }
                }
                if unfinished.is_empty() {
                    break;
                }

                warn!(
                    "{}; re-enqueueing",
                    SchedulerError::WorkerLiveness {
                        pending: unfinished.len()
                    }
                );
                let queued = controller.shared.queued();
                let stalled: Vec<ContextId> = unfinished
                    .iter()
                    .filter(|id| !queued.contains(*id))
                    .cloned()
                    .collect();
                for id in stalled {
                    if !controller.charge_retry(&id) {
                        return Err(exhausted(&unfinished));
                    }
                    controller.requeue(id);
                }
                controller.top_up(unfinished.len())?;
            }
        }
    }

    debug!("Level finished: {:?}", controller.report);
    Ok(controller.report)
}

fn exhausted(unfinished: &BTreeSet<ContextId>) -> SchedulerError {
    SchedulerError::RetryBudgetExhausted {
        ids: unfinished.iter().map(|id| id.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        runs: Mutex<Vec<String>>,
        restores: AtomicUsize,
    }

    impl ContextJob for Counting {
        fn run(&self, id: &ContextId) -> Result<(), MergeError> {
            lock(&self.runs).push(id.to_string());
            Ok(())
        }

        fn restore(&self, _id: &ContextId) -> Result<(), MergeError> {
            self.restores.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFails;

    impl ContextJob for AlwaysFails {
        fn run(&self, id: &ContextId) -> Result<(), MergeError> {
            Err(MergeError::io(
                id.as_str(),
                std::io::Error::new(std::io::ErrorKind::Other, "boom"),
            ))
        }

        fn restore(&self, _id: &ContextId) -> Result<(), MergeError> {
            Ok(())
        }
    }

    fn config(max_workers: usize) -> PoolConfig {
        PoolConfig {
            max_workers,
            progress_timeout: Duration::from_millis(50),
            retry_budget: 2,
            retry_deadline: None,
        }
    }

    fn ids(n: usize) -> Vec<ContextId> {
        (1..=n)
            .map(|i| ContextId::from_file_name(&format!("0.{}", i)).unwrap())
            .collect()
    }

    #[test]
    fn test_every_id_runs_once() {
        let job = Arc::new(Counting::default());
        let report = run_level(Arc::clone(&job), &ids(10), &config(3)).unwrap();
        assert_eq!(report.completed, 10);
        assert_eq!(report.retries, 0);
        assert!(report.workers_spawned <= 3);
        let mut runs = lock(&job.runs).clone();
        runs.sort();
        runs.dedup();
        assert_eq!(runs.len(), 10);
    }

    #[test]
    fn test_never_more_workers_than_items() {
        let job = Arc::new(Counting::default());
        let report = run_level(job, &ids(2), &config(8)).unwrap();
        assert_eq!(report.workers_spawned, 2);
    }

    #[test]
    fn test_failing_job_exhausts_budget() {
        let err = run_level(Arc::new(AlwaysFails), &ids(1), &config(1)).unwrap_err();
        match err {
            SchedulerError::RetryBudgetExhausted { ids } => assert_eq!(ids, vec!["0.1"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Fails the first run of every id
    #[derive(Default)]
    struct FailsOnce {
        seen: Mutex<BTreeSet<String>>,
    }

    impl ContextJob for FailsOnce {
        fn run(&self, id: &ContextId) -> Result<(), MergeError> {
            if lock(&self.seen).insert(id.to_string()) {
                return Err(MergeError::io(
                    id.as_str(),
                    std::io::Error::new(std::io::ErrorKind::Other, "first try"),
                ));
            }
            Ok(())
        }

        fn restore(&self, _id: &ContextId) -> Result<(), MergeError> {
            Ok(())
        }
    }

    #[test]
    fn test_retry_does_not_wait_for_progress_timeout() {
        let config = PoolConfig {
            max_workers: 1,
            progress_timeout: Duration::from_secs(30),
            retry_budget: 2,
            retry_deadline: None,
        };
        for _ in 0..20 {
            let started = Instant::now();
            let report = run_level(Arc::new(FailsOnce::default()), &ids(1), &config).unwrap();
            assert_eq!(report.completed, 1);
            assert_eq!(report.retries, 1);
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }

    #[test]
    fn test_empty_level() {
        let report = run_level(Arc::new(Counting::default()), &[], &config(2)).unwrap();
        assert_eq!(report, LevelReport::default());
    }
}

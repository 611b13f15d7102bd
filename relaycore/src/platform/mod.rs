//! Platform services the rest of the engine depends on instead of touching
//! `std::thread`/`std::time` directly: a deferred/main/worker task scheduler,
//! timers, and clocks (§4.5, §5 "Concurrency & resource model").
//!
//! The scheduling model is single-threaded cooperative: everything submitted
//! through [`Platform`] runs on the thread that calls [`Platform::tick`],
//! except worker closures, which run on the pool and hop back via a channel
//! that `tick` drains.

pub mod clock;
pub mod timer;
pub mod worker;

use hashbrown::HashSet;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Instant;

pub use timer::TimerId;
use timer::TimerWheel;
use worker::WorkerPool;

/// Identifies a set of deferred/worker tasks that can be mass-canceled
/// together, e.g. all retransmit work belonging to one peer being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskGroup(pub u64);

type DeferredFn = Box<dyn FnOnce() + Send>;
type WorkerDoneFn = Box<dyn FnOnce(bool) + Send>;

struct DeferredTask {
    group: TaskGroup,
    run: DeferredFn,
}

/// The platform's single entry/exit point for work that must not run
/// reentrantly: deferred tasks queued mid-turn run on the *next* `tick`,
/// never inside the call that queued them.
pub struct Platform {
    epoch: Instant,
    deferred: Vec<DeferredTask>,
    cancelled_groups: HashSet<TaskGroup>,
    timers: TimerWheel,
    pool: WorkerPool,
    worker_done_tx: Sender<(TaskGroup, WorkerDoneFn, bool)>,
    worker_done_rx: Receiver<(TaskGroup, WorkerDoneFn, bool)>,
}

impl Platform {
    pub fn new(worker_count: usize) -> Platform {
        let (worker_done_tx, worker_done_rx) = channel();
        Platform {
            epoch: Instant::now(),
            deferred: Vec::new(),
            cancelled_groups: HashSet::new(),
            timers: TimerWheel::new(),
            pool: WorkerPool::new(worker_count),
            worker_done_tx,
            worker_done_rx,
        }
    }

    /// Enqueues `task` to run on the next [`tick`](Platform::tick), never
    /// reentrantly from within the current turn.
    pub fn submit_deferred<F>(&mut self, group: TaskGroup, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.deferred.push(DeferredTask { group, run: Box::new(task) });
    }

    /// In this single-threaded scheduling model there is only one main loop,
    /// so `submit_main` is identical to `submit_deferred`; the distinction
    /// exists for callers that would hop threads under a threaded platform.
    pub fn submit_main<F>(&mut self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_deferred(TaskGroup(0), task);
    }

    /// Runs `entry` on a worker thread; `done(canceled)` runs back on the
    /// main loop via the next `tick`, `canceled` true only if the owning
    /// group was canceled before `entry` finished.
    pub fn submit_worker<E, D>(&self, group: TaskGroup, entry: E, done: D)
    where
        E: FnOnce() + Send + 'static,
        D: FnOnce(bool) + Send + 'static,
    {
        let worker_done_tx = self.worker_done_tx.clone();
        let done: WorkerDoneFn = Box::new(done);
        self.pool.submit(move || {
            entry();
            let _ = worker_done_tx.send((group, done, false));
        });
    }

    /// Cancels pending deferred tasks in `group` immediately; worker tasks in
    /// `group` still run their `entry`, but their `done` callback is told
    /// `canceled = true` the next time it fires on `tick`. `on_done` fires
    /// once every already-enqueued task in the group has settled.
    pub fn cancel_task_group<F>(&mut self, group: TaskGroup, on_done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancelled_groups.insert(group);
        self.submit_deferred(TaskGroup(0), on_done);
    }

    pub fn timer_start(&mut self, deadline_ms: u64) -> TimerId {
        self.timers.start(deadline_ms)
    }

    pub fn timer_stop(&mut self, id: TimerId) {
        self.timers.stop(id);
    }

    pub fn hrtime(&self) -> u64 {
        clock::hrtime_ms(self.epoch)
    }

    pub fn now(&self) -> u64 {
        clock::now_ms()
    }

    /// Drains worker completions and due timers, then runs every deferred
    /// task queued before this call (tasks queued *during* this call wait for
    /// the next `tick`). Returns the timer ids that fired.
    pub fn tick(&mut self, now_ms: u64) -> Vec<TimerId> {
        while let Ok((group, done, _)) = self.worker_done_rx.try_recv() {
            let canceled = self.cancelled_groups.contains(&group);
            done(canceled);
        }

        let fired = self.timers.drain_expired(now_ms);

        let runnable: Vec<DeferredTask> = self.deferred.drain(..).collect();
        for task in runnable {
            if self.cancelled_groups.contains(&task.group) {
                continue;
            }
            (task.run)();
        }

        fired
    }
}

//! Provides the timers which drive the expiration sweeps of tables.
//!
//! A table never sleeps itself. Whenever it needs to check its entries again later, it asks its
//! [Scheduler] to run a one-shot task after a given delay and keeps the returned [TimerHandle]
//! around, so that a pending sweep can be withdrawn once a sooner one is required.
//!
//! Two implementations are provided:
//! * [TimerScheduler] uses **tokio** timers and is what is used in production.
//! * [ManualScheduler] only fires tasks when explicitly asked to. Combined with a mocked clock
//!   this makes expiration fully deterministic in tests.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::clock::Instant;

/// Delays beyond this are treated as "never" by the [ManualScheduler] (roughly 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Represents a task to be executed once its delay has elapsed.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Arms one-shot tasks which run after a given delay.
pub trait Scheduler: Send + Sync {
    /// Schedules the given task to be run once **delay** has elapsed.
    ///
    /// The returned handle can be used to cancel the task as long as it hasn't fired.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Permits to cancel a scheduled task.
///
/// Note that dropping a handle does not cancel the task.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TimerHandle {
    /// Creates a handle which invokes the given closure when cancelled.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        TimerHandle {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancels the task if it hasn't fired yet. Cancelling a task which already ran is a no-op.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Schedules tasks using tokio timers.
///
/// Each task is spawned as tokio task which sleeps for the requested delay and then hands the
/// actual work over to the blocking thread pool. As a sweep acquires locks and runs user
/// callbacks, it must not stall the timer driver or any other async task.
///
/// # Examples
/// ```
/// # use cachetable::scheduler::TimerScheduler;
/// # use cachetable::table::Table;
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// #[tokio::main]
/// async fn main() {
///     let scheduler = Arc::new(TimerScheduler::current().unwrap());
///     let table = Table::new("sessions", scheduler);
///
///     table.add("alice", Duration::from_millis(20), "token");
///     tokio::time::sleep(Duration::from_millis(200)).await;
///     assert_eq!(table.exists(&"alice"), false);
/// }
/// ```
pub struct TimerScheduler {
    runtime: Handle,
}

impl TimerScheduler {
    /// Creates a scheduler which spawns its timers in the given runtime.
    pub fn new(runtime: Handle) -> Self {
        TimerScheduler { runtime }
    }

    /// Creates a scheduler for the tokio runtime the caller is running in.
    ///
    /// # Errors
    /// Fails if this is invoked outside of a tokio runtime.
    pub fn current() -> anyhow::Result<Self> {
        let runtime = Handle::try_current()
            .context("A timer scheduler can only be created within a tokio runtime!")?;

        Ok(TimerScheduler::new(runtime))
    }
}

impl Scheduler for TimerScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Once the work has been handed over, aborting this timer no longer has any effect,
            // therefore an in-flight sweep always completes...
            let _ = tokio::task::spawn_blocking(task);
        });

        let abort = timer.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}

/// Keeps all pending tasks until they are explicitly fired via [ManualScheduler::run_due].
///
/// Deadlines are computed using [clock::Instant](crate::clock::Instant), therefore, within tests
/// which mock the clock, time only passes when the test says so.
///
/// # Examples
/// ```
/// # use cachetable::scheduler::{ManualScheduler, Scheduler};
/// # use std::sync::atomic::{AtomicBool, Ordering};
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// let scheduler = ManualScheduler::new();
/// let fired = Arc::new(AtomicBool::new(false));
///
/// let flag = fired.clone();
/// let _ = scheduler.schedule(Duration::ZERO, Box::new(move || flag.store(true, Ordering::SeqCst)));
/// assert_eq!(scheduler.pending(), 1);
///
/// assert_eq!(scheduler.run_due(), 1);
/// assert_eq!(fired.load(Ordering::SeqCst), true);
/// assert_eq!(scheduler.pending(), 0);
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    // Keyed by deadline and then by id, so that tasks with equal deadlines fire in the order in
    // which they were scheduled.
    tasks: BTreeMap<(Instant, u64), Task>,
}

impl ManualScheduler {
    /// Creates a new scheduler without any pending tasks.
    pub fn new() -> Self {
        ManualScheduler::default()
    }

    /// Returns the number of tasks which are scheduled but haven't fired yet.
    pub fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Returns the deadline of the task which is due next.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state
            .lock()
            .tasks
            .keys()
            .next()
            .map(|(deadline, _)| *deadline)
    }

    /// Runs all tasks whose deadline has passed and returns how many were executed.
    ///
    /// Tasks are run one by one without holding any lock, so that they can schedule new tasks.
    /// A task scheduled by a running task with a deadline which has already passed is run by
    /// the same invocation.
    pub fn run_due(&self) -> usize {
        let mut executed = 0;
        while let Some(task) = self.pop_due(Instant::now()) {
            task();
            executed += 1;
        }

        executed
    }

    fn pop_due(&self, now: Instant) -> Option<Task> {
        let mut state = self.state.lock();
        let next = state
            .tasks
            .keys()
            .next()
            .copied()
            .filter(|(deadline, _)| *deadline <= now)?;

        state.tasks.remove(&next)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        let slot = (Instant::now() + delay.min(FAR_FUTURE), id);
        let _ = state.tasks.insert(slot, task);

        let pending = self.state.clone();
        TimerHandle::new(move || {
            let _ = pending.lock().tasks.remove(&slot);
        })
    }
}

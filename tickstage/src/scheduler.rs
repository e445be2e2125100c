//! Repeating-task schedulers that drive game ticks.
//!
//! A game asks its scheduler for exactly two things: start a repeating
//! task at a fixed period, and cancel it. [`TokioScheduler`] runs tasks on
//! the current `LocalSet`; [`ManualScheduler`] runs them only when told
//! to, which makes tick sequences deterministic in tests and lets a host
//! with its own loop drive games directly.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A repeating task body.
pub type TickTask = Box<dyn FnMut()>;

/// Handle to a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Host scheduler collaborator.
pub trait Scheduler {
    /// Runs `task` every `period` until cancelled. The first run happens
    /// one period after scheduling.
    fn schedule_repeating(&self, period: Duration, task: TickTask) -> TaskId;

    /// Stops a task. Returns `false` if it was not scheduled. Once this
    /// returns, the task body is not invoked again.
    fn cancel(&self, task: TaskId) -> bool;
}

// ============================================================================
// Tokio
// ============================================================================

/// Runs tasks as `spawn_local` interval loops.
///
/// Must be used from within a [`tokio::task::LocalSet`]; game state is
/// `!Send`, so tick tasks cannot move between worker threads.
#[derive(Default)]
pub struct TokioScheduler {
    next_id: Cell<u64>,
    tasks: RefCell<HashMap<TaskId, CancellationToken>>,
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("tasks", &self.tasks.borrow().len())
            .finish_non_exhaustive()
    }
}

impl TokioScheduler {
    /// A scheduler with no tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl Scheduler for TokioScheduler {
    /// # Panics
    ///
    /// Panics when called outside a `LocalSet`.
    fn schedule_repeating(&self, period: Duration, mut task: TickTask) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let period = period.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        self.tasks.borrow_mut().insert(id, cancel.clone());

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::task::spawn_local(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!(%id, "tick task cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        // A task may cancel itself from inside its body.
                        if cancel.is_cancelled() {
                            break;
                        }
                        task();
                    }
                }
            }
        });
        id
    }

    fn cancel(&self, task: TaskId) -> bool {
        let token = self.tasks.borrow_mut().remove(&task);
        token.map(|t| t.cancel()).is_some()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, token) in self.tasks.get_mut().drain() {
            token.cancel();
        }
    }
}

// ============================================================================
// Manual
// ============================================================================

type SharedTask = Rc<RefCell<TickTask>>;

/// Runs tasks only on [`ManualScheduler::run_once`].
///
/// Periods are recorded but not enforced: every live task runs once per
/// call.
#[derive(Default)]
pub struct ManualScheduler {
    next_id: Cell<u64>,
    tasks: RefCell<IndexMap<TaskId, (Duration, SharedTask)>>,
    runs: Cell<u64>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("tasks", &self.tasks.borrow().len())
            .field("runs", &self.runs.get())
            .finish_non_exhaustive()
    }
}

impl ManualScheduler {
    /// A scheduler with no tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every live task once, in scheduling order. Returns how many
    /// ran.
    ///
    /// Works on a snapshot: tasks scheduled during the pass wait for the
    /// next one, and tasks cancelled during the pass are skipped.
    pub fn run_once(&self) -> usize {
        let snapshot: Vec<(TaskId, SharedTask)> = self
            .tasks
            .borrow()
            .iter()
            .map(|(id, (_, task))| (*id, Rc::clone(task)))
            .collect();

        let mut ran = 0;
        for (id, task) in snapshot {
            if !self.tasks.borrow().contains_key(&id) {
                continue;
            }
            // A task that re-enters the scheduler does not run itself twice.
            if let Ok(mut body) = task.try_borrow_mut() {
                body();
                ran += 1;
            }
        }
        self.runs.set(self.runs.get() + 1);
        ran
    }

    /// Calls [`Self::run_once`] `times` times.
    pub fn run(&self, times: usize) {
        for _ in 0..times {
            self.run_once();
        }
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Period a task was scheduled with.
    #[must_use]
    pub fn period_of(&self, task: TaskId) -> Option<Duration> {
        self.tasks.borrow().get(&task).map(|(period, _)| *period)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, period: Duration, task: TickTask) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.tasks
            .borrow_mut()
            .insert(id, (period, Rc::new(RefCell::new(task))));
        id
    }

    fn cancel(&self, task: TaskId) -> bool {
        // Drop the body after the borrow ends; it may own game handles.
        let removed = self.tasks.borrow_mut().shift_remove(&task);
        removed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_task(counter: &Rc<Cell<u32>>) -> TickTask {
        let counter = Rc::clone(counter);
        Box::new(move || counter.set(counter.get() + 1))
    }

    #[test]
    fn manual_runs_each_task_once_per_pass() {
        let scheduler = ManualScheduler::new();
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));
        let ta = scheduler.schedule_repeating(Duration::from_millis(50), counting_task(&a));
        scheduler.schedule_repeating(Duration::from_millis(10), counting_task(&b));

        assert_eq!(scheduler.run_once(), 2);
        scheduler.run(2);
        assert_eq!((a.get(), b.get()), (3, 3));
        assert_eq!(scheduler.period_of(ta), Some(Duration::from_millis(50)));

        assert!(scheduler.cancel(ta));
        assert!(!scheduler.cancel(ta));
        scheduler.run_once();
        assert_eq!((a.get(), b.get()), (3, 4));
        assert_eq!(scheduler.task_count(), 1);
    }

    #[test]
    fn manual_task_cancelled_mid_pass_is_skipped() {
        let scheduler = Rc::new(ManualScheduler::new());
        let victim_runs = Rc::new(Cell::new(0));
        let victim_id = Rc::new(Cell::new(None));

        let sched = Rc::clone(&scheduler);
        let target = Rc::clone(&victim_id);
        scheduler.schedule_repeating(
            Duration::from_millis(50),
            Box::new(move || {
                if let Some(id) = target.get() {
                    sched.cancel(id);
                }
            }),
        );
        let id = scheduler.schedule_repeating(Duration::from_millis(50), counting_task(&victim_runs));
        victim_id.set(Some(id));

        assert_eq!(scheduler.run_once(), 1);
        assert_eq!(victim_runs.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_ticks_every_period_until_cancelled() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let scheduler = TokioScheduler::new();
                let count = Rc::new(Cell::new(0));
                let id = scheduler.schedule_repeating(Duration::from_millis(50), counting_task(&count));
                assert_eq!(scheduler.task_count(), 1);

                for _ in 0..3 {
                    tokio::time::advance(Duration::from_millis(50)).await;
                    for _ in 0..10 {
                        tokio::task::yield_now().await;
                    }
                }
                assert_eq!(count.get(), 3);

                assert!(scheduler.cancel(id));
                tokio::time::advance(Duration::from_millis(200)).await;
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                }
                assert_eq!(count.get(), 3);
                assert_eq!(scheduler.task_count(), 0);
            })
            .await;
    }
}

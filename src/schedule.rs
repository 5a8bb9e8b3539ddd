//! Cooperative task queue.
//!
//! Models the deferred half of a UI event loop: one-shot tasks, periodic
//! checks driven by explicit ticks, and single-flight coalescing keyed by
//! template identity so repeated update requests within one tick collapse
//! into a single pass. Everything runs synchronously when the owner calls
//! [`Scheduler::tick`] or [`Scheduler::run_until_idle`]; there are no
//! threads and no timers.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use tracing::{error, trace};

use crate::id::MarkerId;

/// Handle for cancelling a periodic task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

type Job = Box<dyn FnOnce()>;

struct PeriodicTask {
    id: TaskId,
    interval: u64,
    due: u64,
    // None while the callback is being executed
    job: Option<Box<dyn FnMut() -> bool>>,
}

#[derive(Default)]
struct SchedState {
    queue: VecDeque<Job>,
    periodic: Vec<PeriodicTask>,
    tick: u64,
    next_task: u64,
    inflight: HashSet<MarkerId>,
}

/// Shared handle to the task queue
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a one-shot task for the next drain.
    pub fn schedule(&self, job: impl FnOnce() + 'static) {
        self.state.borrow_mut().queue.push_back(Box::new(job));
    }

    /// Enqueue a one-shot task unless one with the same key is already
    /// queued. Returns whether the task was accepted.
    ///
    /// This is the coalescing vehicle for template updates: however many
    /// times an update is requested before the queue drains, the pass runs
    /// once.
    pub fn request(&self, key: MarkerId, job: impl FnOnce() + 'static) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.inflight.insert(key.clone()) {
            trace!(key = %key, "update request coalesced");
            return false;
        }
        let shared = self.clone();
        state.queue.push_back(Box::new(move || {
            shared.state.borrow_mut().inflight.remove(&key);
            job();
        }));
        true
    }

    /// Register a periodic task, run every `interval` ticks until the
    /// callback returns `false` or the task is cancelled.
    pub fn every(&self, interval: u64, job: impl FnMut() -> bool + 'static) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = TaskId(state.next_task);
        state.next_task += 1;
        let due = state.tick + interval.max(1);
        state.periodic.push(PeriodicTask {
            id,
            interval: interval.max(1),
            due,
            job: Some(Box::new(job)),
        });
        id
    }

    /// Cancel a periodic task. Unknown IDs are ignored.
    pub fn cancel(&self, id: TaskId) {
        self.state.borrow_mut().periodic.retain(|t| t.id != id);
    }

    /// Advance one tick: run periodic tasks that have come due, then drain
    /// the one-shot queue.
    pub fn tick(&self) {
        let now = {
            let mut state = self.state.borrow_mut();
            state.tick += 1;
            state.tick
        };

        let due: Vec<TaskId> = self
            .state
            .borrow()
            .periodic
            .iter()
            .filter(|t| t.due <= now)
            .map(|t| t.id)
            .collect();

        for id in due {
            // Take the callback out so it can re-enter the scheduler freely.
            let job = {
                let mut state = self.state.borrow_mut();
                match state.periodic.iter_mut().find(|t| t.id == id) {
                    Some(task) => {
                        task.due = now + task.interval;
                        task.job.take()
                    }
                    None => None,
                }
            };
            let Some(mut job) = job else { continue };
            let keep = job();
            let mut state = self.state.borrow_mut();
            if keep {
                if let Some(task) = state.periodic.iter_mut().find(|t| t.id == id) {
                    task.job = Some(job);
                }
            } else {
                state.periodic.retain(|t| t.id != id);
            }
        }

        self.run_until_idle();
    }

    /// Drain the one-shot queue, including tasks enqueued while draining.
    pub fn run_until_idle(&self) {
        loop {
            let job = self.state.borrow_mut().queue.pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }

    /// Number of queued one-shot tasks
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Scheduler")
            .field("tick", &state.tick)
            .field("queued", &state.queue.len())
            .field("periodic", &state.periodic.len())
            .finish()
    }
}

/// Log-and-drop wrapper for deferred work with no caller to propagate to
pub(crate) fn report_deferred<E: std::fmt::Display>(result: Result<(), E>) {
    if let Err(err) = result {
        error!(%err, "deferred update failed");
    }
}

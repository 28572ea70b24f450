//! Event loop implementation.
//!
//! This module provides the main event loop that coordinates task, timer and
//! microtask execution following the JavaScript event loop model.

use crate::task_queue::{MicroTask, MicrotaskQueue, SchedulerRef, Task, TaskQueue};
use core_types::JsError;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use tracing::{trace, warn};

/// Configuration for the event loop.
#[derive(Debug, Clone, Default)]
pub struct EventLoopConfig {
    /// Maximum microtasks run in one checkpoint (None = unlimited).
    ///
    /// Circular thenables never stop producing microtasks; a limit turns that
    /// into an error instead of a hang.
    pub microtask_limit: Option<usize>,
}

impl EventLoopConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that stops a checkpoint after `limit` microtasks.
    pub fn bounded(limit: usize) -> Self {
        Self {
            microtask_limit: Some(limit),
        }
    }
}

struct Timer {
    due: u64,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest timer first.
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

/// The JavaScript event loop.
///
/// Each iteration (turn) of the loop:
/// 1. Takes the oldest task from the task queue and executes it
/// 2. Drains all microtasks in the microtask queue
/// 3. When no task is ready, advances the virtual clock to the next timer
/// 4. Repeats
///
/// Time is virtual: `set_timeout` never sleeps, timers simply fire in order
/// of due time, ties broken by registration order.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, MicroTask, Task};
///
/// let mut event_loop = EventLoop::new();
///
/// event_loop.enqueue_task(Task::new(|| {}));
/// event_loop.enqueue_microtask(MicroTask::new(|| {}));
/// event_loop.run_until_done().unwrap();
/// assert!(event_loop.is_microtask_queue_empty());
/// ```
pub struct EventLoop {
    config: EventLoopConfig,
    task_queue: TaskQueue,
    microtask_queue: MicrotaskQueue,
    timers: BinaryHeap<Timer>,
    now: u64,
    next_timer_seq: u64,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &self.config)
            .field("tasks", &self.task_queue.len())
            .field("microtasks", &self.microtask_queue.len())
            .field("timers", &self.timers.len())
            .field("now", &self.now)
            .finish()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates a new EventLoop with empty queues.
    pub fn new() -> Self {
        Self::with_config(EventLoopConfig::default())
    }

    /// Creates a new EventLoop with the given configuration.
    pub fn with_config(config: EventLoopConfig) -> Self {
        Self {
            config,
            task_queue: TaskQueue::new(),
            microtask_queue: MicrotaskQueue::new(),
            timers: BinaryHeap::new(),
            now: 0,
            next_timer_seq: 0,
        }
    }

    /// Returns the scheduler promises should defer onto.
    ///
    /// Every handle returned feeds this loop's microtask queue.
    pub fn scheduler(&self) -> SchedulerRef {
        Rc::new(self.microtask_queue.clone())
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Runs the event loop until all tasks, timers and microtasks are processed.
    ///
    /// # Returns
    ///
    /// `Ok(())` once every queue is empty, or an error if a microtask
    /// checkpoint exceeded the configured limit.
    pub fn run_until_done(&mut self) -> Result<(), JsError> {
        loop {
            if let Some(task) = self.task_queue.dequeue() {
                task.run();
            } else if self.microtask_queue.is_empty() {
                // Only an idle loop lets virtual time advance.
                match self.timers.pop() {
                    Some(timer) => {
                        self.now = self.now.max(timer.due);
                        trace!(now = self.now, "timer fired");
                        timer.task.run();
                    }
                    None => return Ok(()),
                }
            }

            self.run_all_microtasks()?;
        }
    }

    /// Adds a task to the task queue.
    ///
    /// The task will be executed in the next available iteration of the event loop.
    pub fn enqueue_task(&mut self, task: Task) {
        self.task_queue.enqueue(task);
    }

    /// Adds a microtask to the microtask queue.
    ///
    /// The microtask will be executed after the current task completes.
    pub fn enqueue_microtask(&self, microtask: MicroTask) {
        self.microtask_queue.enqueue(microtask);
    }

    /// Schedules `task` to run once `delay_ms` of virtual time has elapsed.
    ///
    /// Due times saturate at `u64::MAX`.
    pub fn set_timeout(&mut self, delay_ms: u64, task: Task) {
        let seq = self.next_timer_seq;
        self.next_timer_seq += 1;
        self.timers.push(Timer {
            due: self.now.saturating_add(delay_ms),
            seq,
            task,
        });
    }

    /// Returns true if the task queue is empty.
    pub fn is_task_queue_empty(&self) -> bool {
        self.task_queue.is_empty()
    }

    /// Returns true if the microtask queue is empty.
    pub fn is_microtask_queue_empty(&self) -> bool {
        self.microtask_queue.is_empty()
    }

    /// Returns true if no timers are pending.
    pub fn is_timer_queue_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Runs all microtasks in the queue until empty.
    ///
    /// This drains the microtask queue completely. New microtasks added during
    /// execution will also be processed before this method returns.
    pub fn run_all_microtasks(&mut self) -> Result<(), JsError> {
        let mut ran = 0usize;
        while !self.microtask_queue.is_empty() {
            if let Some(limit) = self.config.microtask_limit {
                if ran >= limit {
                    warn!(
                        limit,
                        pending = self.microtask_queue.len(),
                        "microtask limit reached"
                    );
                    return Err(JsError::internal(format!(
                        "microtask limit of {} exceeded",
                        limit
                    )));
                }
            }
            if let Some(microtask) = self.microtask_queue.dequeue() {
                microtask.run();
                ran += 1;
            }
        }
        Ok(())
    }

    /// Runs all tasks in the queue (without processing microtasks between them).
    ///
    /// This is primarily for testing purposes.
    pub fn run_all_tasks(&mut self) {
        while let Some(task) = self.task_queue.dequeue() {
            task.run();
        }
    }

    /// Processes one complete cycle: one task followed by all microtasks.
    ///
    /// This represents one iteration of the event loop.
    pub fn process_one_cycle(&mut self) -> Result<(), JsError> {
        if let Some(task) = self.task_queue.dequeue() {
            task.run();
        }

        self.run_all_microtasks()
    }
}

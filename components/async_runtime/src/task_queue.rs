//! Task and microtask queue management.
//!
//! This module provides the task and microtask queues used by the event loop,
//! and the [`Scheduler`] seam through which promises defer their reactions.
//! Tasks are executed one at a time, with all microtasks draining after each task.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A task to be executed by the event loop.
///
/// Tasks represent work to be done in a later iteration of the event loop,
/// such as timer callbacks.
pub struct Task {
    callback: Box<dyn FnOnce()>,
}

impl Task {
    /// Creates a new Task from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the task runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the task.
    pub fn run(self) {
        (self.callback)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task {{ ... }}")
    }
}

/// A microtask to be executed by the event loop.
///
/// Microtasks are executed after each task. Promise reactions and thenable
/// resolution jobs are microtasks.
pub struct MicroTask {
    callback: Box<dyn FnOnce()>,
}

impl MicroTask {
    /// Creates a new MicroTask from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the microtask runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the microtask.
    pub fn run(self) {
        (self.callback)()
    }
}

impl std::fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MicroTask {{ ... }}")
    }
}

/// Defers a microtask until the current synchronous execution completes.
///
/// Implementations must run deferred microtasks in the order they were
/// deferred and never run one from inside `defer` itself.
pub trait Scheduler {
    /// Queues `microtask` for later execution.
    fn defer(&self, microtask: MicroTask);
}

/// Shared handle to the scheduler a promise defers onto.
pub type SchedulerRef = Rc<dyn Scheduler>;

/// A queue for tasks.
///
/// Tasks are processed in FIFO order, one at a time.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: VecDeque<Task>,
}

impl TaskQueue {
    /// Creates a new empty TaskQueue.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Adds a task to the end of the queue.
    pub fn enqueue(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    /// Removes and returns the next task from the queue.
    pub fn dequeue(&mut self) -> Option<Task> {
        self.queue.pop_front()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of tasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// A queue for microtasks.
///
/// The queue is a shared handle: clones push into and pop from the same
/// FIFO, so promises can hold a handle while the event loop drains it.
/// No borrow is held while a dequeued microtask runs, so a running
/// microtask may enqueue more.
#[derive(Debug, Clone, Default)]
pub struct MicrotaskQueue {
    queue: Rc<RefCell<VecDeque<MicroTask>>>,
}

impl MicrotaskQueue {
    /// Creates a new empty MicrotaskQueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a microtask to the end of the queue.
    pub fn enqueue(&self, microtask: MicroTask) {
        self.queue.borrow_mut().push_back(microtask);
    }

    /// Removes and returns the next microtask from the queue.
    pub fn dequeue(&self) -> Option<MicroTask> {
        self.queue.borrow_mut().pop_front()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Returns the number of microtasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl Scheduler for MicrotaskQueue {
    fn defer(&self, microtask: MicroTask) {
        self.enqueue(microtask);
    }
}

//! Async runtime for JavaScript execution.
//!
//! This crate provides the async runtime components for a JavaScript engine:
//! - Event loop with task, timer and microtask queues
//! - Promise implementation following the Promise/A+ specification
//! - Promise combinators (`all`, `race`, `resolve`, `reject`, `deferred`)
//!
//! # Overview
//!
//! - [`EventLoop`] - Main event loop coordinating task execution
//! - [`Scheduler`] - The seam promises defer their reactions through
//! - [`Promise`] - Promise/A+ compliant implementation
//!
//! # Examples
//!
//! ## Event Loop Usage
//!
//! ```
//! use async_runtime::{EventLoop, Task};
//!
//! let mut event_loop = EventLoop::new();
//! event_loop.enqueue_task(Task::new(|| {}));
//! event_loop.run_until_done().unwrap();
//! ```
//!
//! ## Promise Usage
//!
//! ```
//! use async_runtime::{EventLoop, Promise, PromiseState};
//! use core_types::{Function, Value};
//!
//! let mut event_loop = EventLoop::new();
//! let scheduler = event_loop.scheduler();
//!
//! let recovered = Promise::reject(&scheduler, Value::from("e")).catch(Some(Function::new(
//!     |_, args| Ok(Value::from(format!("{}!", Function::arg(&args, 0)))),
//! )));
//!
//! event_loop.run_until_done().unwrap();
//! assert_eq!(recovered.state(), PromiseState::Fulfilled);
//! assert_eq!(recovered.result(), Some(Value::from("e!")));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod combinator;
pub mod event_loop;
pub mod promise;
pub mod task_queue;

// Re-export main types at crate root
pub use combinator::Deferred;
pub use event_loop::{EventLoop, EventLoopConfig};
pub use promise::{Promise, PromiseState, Reject, Resolve};
pub use task_queue::{MicroTask, MicrotaskQueue, Scheduler, SchedulerRef, Task, TaskQueue};
